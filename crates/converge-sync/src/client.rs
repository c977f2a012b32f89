//! HTTP client for a sync server.
//!
//! Talks to `{base_url}/api/push`, `/api/pull` and `/api/state`. Error
//! responses carry `{"error": ..., "status": ...}`; the message is surfaced
//! in [`ClientError::Status`].

use converge_engine::DocumentEngine;
use converge_types::{EventId, SyncState};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ClientError;
use crate::protocol::{PullRequest, PullResponse, PushRequest, PushResponse};
use crate::replica::Replica;

/// Summary of one [`SyncClient::sync`] round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Ops pushed from the outbox.
    pub pushed_ops: usize,
    /// Merge ops the push produced on the server.
    pub server_merge_ops: usize,
    /// Merge ops the pull produced locally.
    pub local_merge_ops: usize,
    /// Server heads still not covered locally.
    pub diverged: Vec<EventId>,
}

/// Push/pull client bound to one server.
#[derive(Debug, Clone)]
pub struct SyncClient {
    client: reqwest::Client,
    base_url: String,
}

impl SyncClient {
    /// Client for the server at `base_url` (e.g. `http://127.0.0.1:8080`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    /// Send runs to the server.
    pub async fn push(&self, request: &PushRequest) -> Result<PushResponse, ClientError> {
        self.post("push", request).await
    }

    /// Fetch the runs the server has beyond `request.known_peers`.
    pub async fn pull(&self, request: &PullRequest) -> Result<PullResponse, ClientError> {
        self.post("pull", request).await
    }

    /// Fetch the server's sync position.
    pub async fn state(&self) -> Result<SyncState, ClientError> {
        let response = self
            .client
            .get(format!("{}/api/state", self.base_url))
            .send()
            .await?;
        decode(response).await
    }

    /// Push the replica's outbox, then pull what it is missing.
    pub async fn sync<E: DocumentEngine>(
        &self,
        replica: &mut Replica<E>,
    ) -> Result<SyncReport, ClientError> {
        let mut report = SyncReport::default();

        let push = replica.push_request();
        if !push.events.is_empty() {
            let response = self.push(&push).await?;
            replica.ack_push(&push);
            report.pushed_ops = push.op_count();
            report.server_merge_ops = response.merge_ops;
        }

        let pulled = self.pull(&replica.pull_request()).await?;
        let outcome = replica.apply_pull(&pulled)?;
        report.local_merge_ops = outcome.merge_ops.len();
        report.diverged = outcome.diverged;

        debug!(
            pushed_ops = report.pushed_ops,
            pulled_runs = pulled.events.len(),
            local_merge_ops = report.local_merge_ops,
            "Sync round complete"
        );
        Ok(report)
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self
            .client
            .post(format!("{}/api/{path}", self.base_url))
            .json(body)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_owned());
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|json| json.get("error")?.as_str().map(str::to_owned))
            .unwrap_or(body);
        return Err(ClientError::Status {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.json().await?)
}
