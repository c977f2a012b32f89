//! Splitting runs into records that fit the store.
//!
//! A run is cut into pieces of at most `chunk_size` ops. The first piece
//! keeps the run's deps; every later piece depends only on the last counter
//! of the piece before it. A piece whose JSON is still too large is halved
//! the same way until it fits.

use converge_types::EventRun;

use crate::error::LogError;

/// Ops `[start, end)` of `run` as a standalone run.
fn slice(run: &EventRun, start: usize, end: usize) -> Option<EventRun> {
    Some(EventRun {
        peer: run.peer.clone(),
        counter_start: run.counter_at(start)?,
        lamport_start: run.lamport_at(start)?,
        deps: run.deps_at(start),
        ops: run.ops.get(start..end)?.to_vec(),
    })
}

/// Cut `run` into pieces of at most `chunk_size` ops.
pub fn split_run(run: &EventRun, chunk_size: usize) -> Vec<EventRun> {
    let size = chunk_size.max(1);
    if run.ops.len() <= size {
        return vec![run.clone()];
    }
    (0..run.ops.len())
        .step_by(size)
        .filter_map(|start| slice(run, start, start.saturating_add(size).min(run.ops.len())))
        .collect()
}

/// Serialize `run` into records no larger than `max_value_bytes`.
///
/// Returns the pieces in counter order with their JSON.
pub fn fit_run(
    run: &EventRun,
    max_value_bytes: usize,
) -> Result<Vec<(EventRun, String)>, LogError> {
    let json = serde_json::to_string(run)?;
    if json.len() <= max_value_bytes {
        return Ok(vec![(run.clone(), json)]);
    }
    let len = run.ops.len();
    if len <= 1 {
        return Err(LogError::ValueTooLarge {
            size: json.len(),
            max: max_value_bytes,
        });
    }
    let mid = len / 2;
    let mut pieces = Vec::new();
    for (start, end) in [(0, mid), (mid, len)] {
        let Some(half) = slice(run, start, end) else {
            return Err(LogError::IndexOverflow);
        };
        pieces.extend(fit_run(&half, max_value_bytes)?);
    }
    Ok(pieces)
}

/// Chunk and size-fit every run, returning the records to store in order.
pub fn to_records(
    runs: &[EventRun],
    chunk_size: usize,
    max_value_bytes: usize,
) -> Result<Vec<String>, LogError> {
    let mut records = Vec::new();
    for run in runs {
        for piece in split_run(run, chunk_size) {
            records.extend(
                fit_run(&piece, max_value_bytes)?
                    .into_iter()
                    .map(|(_, json)| json),
            );
        }
    }
    Ok(records)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;
    use converge_engine::{Document, DocumentEngine};
    use converge_types::{EventId, KeyValue, RowOp, Value, VersionVector};

    fn long_run(ops: usize) -> EventRun {
        let mut doc = Document::new("p");
        doc.insert("t", "r", vec![KeyValue::new("n", 0)]).unwrap();
        for i in 1..ops {
            let col = format!("c{}", i % 7);
            doc.update("t", "r", &col, Value::Int(i32::try_from(i).unwrap()))
                .unwrap();
        }
        let mut runs = doc.get_pending(&VersionVector::new());
        assert_eq!(runs.len(), 1);
        runs.remove(0)
    }

    #[test]
    fn split_chains_each_piece_on_the_previous() {
        let run = long_run(120);
        let pieces = split_run(&run, 50);
        assert_eq!(pieces.len(), 3);
        assert_eq!(
            pieces.iter().map(|p| p.counter_start).collect::<Vec<_>>(),
            vec![1, 51, 101]
        );
        assert_eq!(pieces[1].deps, vec![EventId::new("p", 50)]);
        assert_eq!(pieces[2].deps, vec![EventId::new("p", 100)]);
        assert_eq!(pieces[2].ops.len(), 20);
        assert_eq!(pieces[2].lamport_start, run.lamport_start + 100);
    }

    #[test]
    fn replaying_pieces_matches_the_whole_run() {
        let run = long_run(120);

        let mut whole = Document::new("x");
        whole.merge_remote(std::slice::from_ref(&run)).unwrap();

        let mut pieced = Document::new("y");
        for piece in split_run(&run, 50) {
            pieced.merge_remote(&[piece]).unwrap();
        }

        assert_eq!(whole.row("t", "r"), pieced.row("t", "r"));
        assert_eq!(whole.sync_state(), pieced.sync_state());
    }

    #[test]
    fn oversized_pieces_are_halved() {
        let run = long_run(8);
        let whole = serde_json::to_string(&run).unwrap().len();
        let pieces = fit_run(&run, whole / 2).unwrap();
        assert!(pieces.len() >= 2);
        assert!(pieces.iter().all(|(_, json)| json.len() <= whole / 2));
        let total: usize = pieces.iter().map(|(p, _)| p.ops.len()).sum();
        assert_eq!(total, 8);
        assert_eq!(
            pieces[1].0.deps,
            vec![EventId::new("p", pieces[1].0.counter_start - 1)]
        );
    }

    #[test]
    fn single_op_that_cannot_fit_is_an_error() {
        let run = EventRun {
            peer: "p".to_owned(),
            counter_start: 1,
            lamport_start: 1,
            deps: vec![],
            ops: vec![RowOp::Update {
                tbl: "t".to_owned(),
                row_id: "r".to_owned(),
                col: "blob".to_owned(),
                val: Value::from("x".repeat(200)),
            }],
        };
        assert!(matches!(
            fit_run(&run, 64),
            Err(LogError::ValueTooLarge { max: 64, .. })
        ));
    }
}
