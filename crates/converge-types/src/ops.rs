//! Row-level mutations and their materialized effects.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::value::{KeyValue, Value};

/// One logical row-level mutation authored by a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum RowOp {
    /// Create (or revive) a row with initial cells.
    Insert {
        /// Table name.
        tbl: String,
        /// Row key.
        row_id: String,
        /// Initial cell values.
        values: Vec<KeyValue>,
    },
    /// Set a single cell.
    Update {
        /// Table name.
        tbl: String,
        /// Row key.
        row_id: String,
        /// Column name.
        col: String,
        /// New value.
        val: Value,
    },
    /// Remove a row.
    Delete {
        /// Table name.
        tbl: String,
        /// Row key.
        row_id: String,
    },
}

impl RowOp {
    /// Table this op targets.
    pub fn table(&self) -> &str {
        match self {
            Self::Insert { tbl, .. } | Self::Update { tbl, .. } | Self::Delete { tbl, .. } => tbl,
        }
    }

    /// Row this op targets.
    pub fn row_id(&self) -> &str {
        match self {
            Self::Insert { row_id, .. }
            | Self::Update { row_id, .. }
            | Self::Delete { row_id, .. } => row_id,
        }
    }
}

/// The conflict-resolved effect of applying one or more [`RowOp`]s.
///
/// Only emitted for state that actually changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum MergeOp {
    /// A visible cell took a new value.
    SetCell {
        /// Table name.
        tbl: String,
        /// Row key.
        row_id: String,
        /// Column name.
        col: String,
        /// Resolved value.
        val: Value,
    },
    /// A row became visible.
    InsertRow {
        /// Table name.
        tbl: String,
        /// Row key.
        row_id: String,
        /// Visible cells of the row after resolution.
        values: Vec<KeyValue>,
    },
    /// A visible row was removed.
    DeleteRow {
        /// Table name.
        tbl: String,
        /// Row key.
        row_id: String,
    },
}
