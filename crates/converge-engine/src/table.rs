//! Materialized row state and conflict-resolved application of row ops.
//!
//! Every row keeps the newest insert stamp, the newest delete stamp, and a
//! stamped value per cell. Visibility is derived from those maxima only, so
//! applying the same set of ops in any order yields the same state:
//!
//! - a row is visible iff it was inserted and its newest insert beats its
//!   newest delete;
//! - a cell is visible iff its row is visible and the cell was written after
//!   the newest delete.

use std::collections::BTreeMap;

use converge_types::{KeyValue, MergeOp, RowOp, Value};

use crate::policy::{ConflictPolicy, Stamp};

#[derive(Debug, Clone)]
struct Cell {
    val: Value,
    stamp: Stamp,
}

#[derive(Debug, Clone, Default)]
struct Row {
    inserted: Option<Stamp>,
    deleted: Option<Stamp>,
    cells: BTreeMap<String, Cell>,
}

impl Row {
    fn is_visible<P: ConflictPolicy + ?Sized>(&self, policy: &P) -> bool {
        match (&self.inserted, &self.deleted) {
            (Some(_), None) => true,
            (Some(ins), Some(del)) => policy.prefers(ins, del),
            (None, _) => false,
        }
    }

    fn visible_cells<P: ConflictPolicy + ?Sized>(&self, policy: &P) -> BTreeMap<&str, &Value> {
        if !self.is_visible(policy) {
            return BTreeMap::new();
        }
        self.cells
            .iter()
            .filter(|(_, cell)| {
                self.deleted
                    .as_ref()
                    .is_none_or(|del| policy.prefers(&cell.stamp, del))
            })
            .map(|(col, cell)| (col.as_str(), &cell.val))
            .collect()
    }

    fn write_cell<P: ConflictPolicy + ?Sized>(
        &mut self,
        policy: &P,
        col: &str,
        val: &Value,
        stamp: &Stamp,
    ) {
        match self.cells.get_mut(col) {
            Some(cell) if !policy.prefers(stamp, &cell.stamp) => {}
            Some(cell) => {
                cell.val = val.clone();
                cell.stamp = stamp.clone();
            }
            None => {
                self.cells.insert(
                    col.to_owned(),
                    Cell {
                        val: val.clone(),
                        stamp: stamp.clone(),
                    },
                );
            }
        }
    }
}

/// All tables of one document.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    tables: BTreeMap<String, BTreeMap<String, Row>>,
}

impl Tables {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
        }
    }

    /// Apply one op stamped `stamp`, returning the visible changes.
    pub fn apply<P: ConflictPolicy + ?Sized>(
        &mut self,
        policy: &P,
        op: &RowOp,
        stamp: &Stamp,
    ) -> Vec<MergeOp> {
        let tbl = op.table();
        let row_id = op.row_id();
        let row = self
            .tables
            .entry(tbl.to_owned())
            .or_default()
            .entry(row_id.to_owned())
            .or_default();

        let was_visible = row.is_visible(policy);
        let before = owned_cells(&row.visible_cells(policy));

        match op {
            RowOp::Insert { values, .. } => {
                row.inserted = policy.newest(row.inserted.as_ref(), Some(stamp)).cloned();
                for kv in values {
                    row.write_cell(policy, &kv.key, &kv.val, stamp);
                }
            }
            RowOp::Update { col, val, .. } => row.write_cell(policy, col, val, stamp),
            RowOp::Delete { .. } => {
                row.deleted = policy.newest(row.deleted.as_ref(), Some(stamp)).cloned();
            }
        }

        let is_visible = row.is_visible(policy);
        let after = owned_cells(&row.visible_cells(policy));

        match (was_visible, is_visible) {
            (false, true) => vec![MergeOp::InsertRow {
                tbl: tbl.to_owned(),
                row_id: row_id.to_owned(),
                values: after
                    .into_iter()
                    .map(|(key, val)| KeyValue { key, val })
                    .collect(),
            }],
            (true, false) => vec![MergeOp::DeleteRow {
                tbl: tbl.to_owned(),
                row_id: row_id.to_owned(),
            }],
            (true, true) => cell_changes(tbl, row_id, &before, after),
            (false, false) => Vec::new(),
        }
    }

    /// Visible value of one cell.
    pub fn cell<P: ConflictPolicy + ?Sized>(
        &self,
        policy: &P,
        tbl: &str,
        row_id: &str,
        col: &str,
    ) -> Option<Value> {
        let row = self.tables.get(tbl)?.get(row_id)?;
        row.visible_cells(policy).get(col).map(|val| (*val).clone())
    }

    /// Visible cells of a row, or `None` if the row is not visible.
    pub fn row<P: ConflictPolicy + ?Sized>(
        &self,
        policy: &P,
        tbl: &str,
        row_id: &str,
    ) -> Option<Vec<KeyValue>> {
        let row = self.tables.get(tbl)?.get(row_id)?;
        if !row.is_visible(policy) {
            return None;
        }
        Some(
            row.visible_cells(policy)
                .into_iter()
                .map(|(key, val)| KeyValue::new(key, val.clone()))
                .collect(),
        )
    }

    /// Ids of the visible rows of a table, in key order.
    pub fn row_ids<P: ConflictPolicy + ?Sized>(&self, policy: &P, tbl: &str) -> Vec<String> {
        self.tables
            .get(tbl)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, row)| row.is_visible(policy))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn owned_cells(cells: &BTreeMap<&str, &Value>) -> BTreeMap<String, Value> {
    cells
        .iter()
        .map(|(col, val)| ((*col).to_owned(), (*val).clone()))
        .collect()
}

fn cell_changes(
    tbl: &str,
    row_id: &str,
    before: &BTreeMap<String, Value>,
    after: BTreeMap<String, Value>,
) -> Vec<MergeOp> {
    let mut ops = Vec::new();
    for col in before.keys() {
        if !after.contains_key(col) {
            ops.push(MergeOp::SetCell {
                tbl: tbl.to_owned(),
                row_id: row_id.to_owned(),
                col: col.clone(),
                val: Value::Null,
            });
        }
    }
    for (col, val) in after {
        let changed = before.get(&col).is_none_or(|old| !old.same_as(&val));
        if changed {
            ops.push(MergeOp::SetCell {
                tbl: tbl.to_owned(),
                row_id: row_id.to_owned(),
                col,
                val,
            });
        }
    }
    ops
}
