//! Key layout of the persisted log.
//!
//! | Pattern | Value | Description |
//! |---------|-------|-------------|
//! | `{ns}:event:{index:010}` | JSON `EventRun` | One stored record |
//! | `{ns}:meta:count` | Integer | Next free record index |
//! | `{ns}:meta:lease` | String | Owner of the append lease |

/// Builds the keys of one log namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogKeys {
    namespace: String,
}

impl LogKeys {
    /// Keys under `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Key of the record at `index`, zero-padded so keys sort by index.
    pub fn record(&self, index: u64) -> String {
        format!("{}:event:{index:010}", self.namespace)
    }

    /// Key of the count cursor.
    pub fn count(&self) -> String {
        format!("{}:meta:count", self.namespace)
    }

    /// Key of the append lease.
    pub fn lease(&self) -> String {
        format!("{}:meta:lease", self.namespace)
    }
}
