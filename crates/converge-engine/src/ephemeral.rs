//! Per-namespace last-writer-wins registers for transient state.

use std::collections::BTreeMap;

use converge_types::{EphemeralEntry, EphemeralRemoteEntry, NsEntries, Value};

/// Ephemeral key space of one replica or one relay room.
#[derive(Debug, Clone, Default)]
pub struct EphemeralStore {
    namespaces: NsEntries,
}

impl EphemeralStore {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self {
            namespaces: BTreeMap::new(),
        }
    }

    /// Write a local value unconditionally and return the stored entry.
    pub fn set(
        &mut self,
        ns: &str,
        key: &str,
        val: Value,
        timestamp: u64,
        peer: &str,
    ) -> EphemeralEntry {
        let entry = EphemeralEntry {
            key: key.to_owned(),
            val,
            timestamp,
            peer: peer.to_owned(),
        };
        self.namespaces
            .entry(ns.to_owned())
            .or_default()
            .insert(key.to_owned(), entry.clone());
        entry
    }

    /// Current entry for `(ns, key)`.
    pub fn get(&self, ns: &str, key: &str) -> Option<&EphemeralEntry> {
        self.namespaces.get(ns)?.get(key)
    }

    /// Every entry of a namespace, keyed by key.
    pub fn get_all(&self, ns: &str) -> BTreeMap<String, EphemeralEntry> {
        self.namespaces.get(ns).cloned().unwrap_or_default()
    }

    /// Merge one remote entry; returns whether local state changed.
    pub fn merge_one(&mut self, ns: &str, incoming: EphemeralEntry) -> bool {
        let keyed = self.namespaces.entry(ns.to_owned()).or_default();
        match keyed.get(&incoming.key) {
            Some(current) if !incoming.supersedes(current) => false,
            _ => {
                keyed.insert(incoming.key.clone(), incoming);
                true
            }
        }
    }

    /// Merge flat remote entries, returning only those that won.
    pub fn merge(
        &mut self,
        entries: impl IntoIterator<Item = EphemeralRemoteEntry>,
    ) -> Vec<EphemeralRemoteEntry> {
        let mut changed = Vec::new();
        for remote in entries {
            let (ns, entry) = remote.into_parts();
            if self.merge_one(&ns, entry.clone()) {
                changed.push(entry.into_remote(ns));
            }
        }
        changed
    }

    /// Merge nested entries, returning the nested diff of winners.
    pub fn merge_nested(&mut self, entries: NsEntries) -> NsEntries {
        let mut diff = NsEntries::new();
        for (ns, keyed) in entries {
            for (key, mut entry) in keyed {
                entry.key.clone_from(&key);
                if self.merge_one(&ns, entry.clone()) {
                    diff.entry(ns.clone()).or_default().insert(key, entry);
                }
            }
        }
        diff
    }

    /// Current values of the namespaces named in `namespaces`.
    ///
    /// Empty or unknown namespaces are omitted.
    pub fn snapshot<S: AsRef<str>>(&self, namespaces: &[S]) -> NsEntries {
        namespaces
            .iter()
            .filter_map(|ns| {
                let keyed = self.namespaces.get(ns.as_ref())?;
                (!keyed.is_empty()).then(|| (ns.as_ref().to_owned(), keyed.clone()))
            })
            .collect()
    }

    /// Current values for every `(ns, key)` mentioned in `keys`.
    pub fn current_of(&self, keys: &NsEntries) -> NsEntries {
        let mut current = NsEntries::new();
        for (ns, keyed) in keys {
            for key in keyed.keys() {
                if let Some(entry) = self.get(ns, key) {
                    current
                        .entry(ns.clone())
                        .or_default()
                        .insert(key.clone(), entry.clone());
                }
            }
        }
        current
    }
}
