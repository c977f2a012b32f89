//! Request and response bodies of the push/pull protocol.

use converge_types::{EventId, EventRun, VersionVector};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::SyncError;

/// `POST /api/push` body: runs the sender has and the receiver may not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PushRequest {
    /// Runs to merge and persist.
    pub events: Vec<EventRun>,
}

impl PushRequest {
    /// Parse and validate a raw JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] if `events` is missing or not an
    /// array, or if any run is malformed.
    pub fn from_json(body: &serde_json::Value) -> Result<Self, SyncError> {
        let Some(events) = body.get("events").filter(|e| e.is_array()) else {
            return Err(SyncError::Validation("events must be an array".to_owned()));
        };
        let events: Vec<EventRun> = serde_json::from_value(events.clone())
            .map_err(|e| SyncError::Validation(format!("malformed event run: {e}")))?;
        let request = Self { events };
        request.validate()?;
        Ok(request)
    }

    /// Check every run's structure.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] naming the first bad run.
    pub fn validate(&self) -> Result<(), SyncError> {
        for run in &self.events {
            run.validate()
                .map_err(|e| SyncError::Validation(e.to_string()))?;
        }
        Ok(())
    }

    /// Total ops across all runs.
    pub fn op_count(&self) -> usize {
        self.events.iter().map(EventRun::len).sum()
    }
}

/// `POST /api/push` success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PushResponse {
    /// Always `true` on success.
    pub ok: bool,
    /// Number of merge ops the push produced on the receiver.
    pub merge_ops: usize,
}

/// `POST /api/pull` body: what the requester already has.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PullRequest {
    /// Highest counter known per peer; absent peers count as 0.
    #[serde(default)]
    pub known_peers: VersionVector,
}

/// `POST /api/pull` success body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PullResponse {
    /// Runs the requester is missing.
    pub events: Vec<EventRun>,
    /// Responder's latest event id per peer.
    pub server_frontier: Vec<EventId>,
}
