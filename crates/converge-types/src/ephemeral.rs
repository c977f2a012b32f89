//! Ephemeral last-writer-wins entries.
//!
//! Ephemeral state (presence, cursors, inputs) is not causal and not
//! persisted. Each `(namespace, key)` holds one [`EphemeralEntry`]; a newer
//! timestamp wins, and equal timestamps are settled by the lexically higher
//! peer id.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::value::Value;

/// One ephemeral register value as stored in a namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EphemeralEntry {
    /// Key within the namespace.
    pub key: String,
    /// Current value.
    pub val: Value,
    /// Writer's timestamp in milliseconds.
    #[ts(type = "number")]
    pub timestamp: u64,
    /// Writing peer.
    pub peer: String,
}

impl EphemeralEntry {
    /// Whether `self` beats `current` under last-writer-wins.
    ///
    /// Strictly newer timestamps win; equal timestamps go to the lexically
    /// higher peer; everything else keeps `current`.
    pub fn supersedes(&self, current: &Self) -> bool {
        match self.timestamp.cmp(&current.timestamp) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.peer > current.peer,
        }
    }

    /// Attach a namespace, producing the flat wire form.
    pub fn into_remote(self, ns: impl Into<String>) -> EphemeralRemoteEntry {
        EphemeralRemoteEntry {
            ns: ns.into(),
            key: self.key,
            val: self.val,
            timestamp: self.timestamp,
            peer: self.peer,
        }
    }
}

/// An ephemeral entry tagged with its namespace, as exchanged between
/// replicas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EphemeralRemoteEntry {
    /// Namespace.
    pub ns: String,
    /// Key within the namespace.
    pub key: String,
    /// Value.
    pub val: Value,
    /// Writer's timestamp in milliseconds.
    #[ts(type = "number")]
    pub timestamp: u64,
    /// Writing peer.
    pub peer: String,
}

impl EphemeralRemoteEntry {
    /// Split into namespace and namespaced entry.
    pub fn into_parts(self) -> (String, EphemeralEntry) {
        (
            self.ns,
            EphemeralEntry {
                key: self.key,
                val: self.val,
                timestamp: self.timestamp,
                peer: self.peer,
            },
        )
    }
}

/// Nested `{ns: {key: entry}}` map used by the dissemination protocol.
pub type NsEntries = BTreeMap<String, BTreeMap<String, EphemeralEntry>>;

/// Flatten nested entries into the remote-entry list form.
///
/// The map key wins over the entry's own `key` field when they disagree.
pub fn flatten_entries(entries: NsEntries) -> Vec<EphemeralRemoteEntry> {
    entries
        .into_iter()
        .flat_map(|(ns, keyed)| {
            keyed.into_iter().map(move |(key, entry)| EphemeralRemoteEntry {
                ns: ns.clone(),
                key,
                val: entry.val,
                timestamp: entry.timestamp,
                peer: entry.peer,
            })
        })
        .collect()
}

/// Group a remote-entry list into nested form.
pub fn nest_entries(entries: impl IntoIterator<Item = EphemeralRemoteEntry>) -> NsEntries {
    let mut nested = NsEntries::new();
    for remote in entries {
        let (ns, entry) = remote.into_parts();
        nested
            .entry(ns)
            .or_default()
            .insert(entry.key.clone(), entry);
    }
    nested
}
