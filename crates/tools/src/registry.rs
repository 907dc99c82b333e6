//! Capability registry: named handlers, looked up and invoked by name.

use crate::traits::{ActionOutcome, Capability, CapabilityError, Parameters};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// A registered capability.
pub struct CapabilityRecord {
    pub name: String,
    pub description: String,
    pub handler: Arc<dyn Capability>,
}

impl fmt::Debug for CapabilityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRecord")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("version", &self.handler.version())
            .finish()
    }
}

/// What the oracle gets to see about a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityInfo {
    pub name: String,
    pub description: String,
    pub version: String,
}

/// Result of a `register` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Inserted,
    Replaced,
}

#[derive(Default)]
struct Entries {
    // registration order, names are unique
    order: Vec<String>,
    records: HashMap<String, Arc<CapabilityRecord>>,
}

/// Shared between concurrent agent loops behind an `Arc`.
///
/// Records are swapped in whole under the write lock, so a reader never
/// observes a partially-registered capability. Invocations run outside the
/// lock and are not serialized per capability.
pub struct CapabilityRegistry {
    entries: RwLock<Entries>,
    timeout_ms: u64,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT_MS)
    }

    pub fn with_timeout(timeout_ms: u64) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            timeout_ms,
        }
    }

    /// Register a handler under `name`.
    ///
    /// An existing record with the same name is replaced (last writer wins)
    /// and a warning is emitted. Handler parameters are not validated here.
    pub fn register(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn Capability>,
    ) -> Registration {
        let name = name.into();
        let record = Arc::new(CapabilityRecord {
            name: name.clone(),
            description: description.into(),
            handler,
        });

        let mut entries = self.entries.write();
        match entries.records.insert(name.clone(), record) {
            Some(previous) => {
                warn!(
                    capability = %name,
                    previous_version = previous.handler.version(),
                    "Capability already registered, overwriting"
                );
                Registration::Replaced
            }
            None => {
                entries.order.push(name.clone());
                info!(capability = %name, "Registered capability");
                Registration::Inserted
            }
        }
    }

    /// Register a handler under its own name and description.
    pub fn register_capability(&self, handler: Arc<dyn Capability>) -> Registration {
        let name = handler.name().to_string();
        let description = handler.description().to_string();
        self.register(name, description, handler)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<CapabilityRecord>> {
        self.entries.read().records.get(name).cloned()
    }

    /// Registered capabilities in registration order.
    pub fn list(&self) -> Vec<CapabilityInfo> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter_map(|name| entries.records.get(name))
            .map(|record| CapabilityInfo {
                name: record.name.clone(),
                description: record.description.clone(),
                version: record.handler.version().to_string(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke a capability by name.
    ///
    /// Never fails: an unknown name, a handler error, a panic or a timeout
    /// all come back as `ActionOutcome { success: false, .. }`.
    pub async fn invoke(&self, name: &str, params: Parameters) -> ActionOutcome {
        let Some(record) = self.lookup(name) else {
            warn!(capability = %name, "Capability not found");
            return ActionOutcome::failed(format!("capability not found: {name}"));
        };

        debug!(capability = %name, "Invoking capability");
        let handler = Arc::clone(&record.handler);
        // Spawned so a panicking handler cannot take the caller down with it.
        let handle = tokio::spawn(async move { handler.execute(params).await });
        let abort = handle.abort_handle();

        match timeout(Duration::from_millis(self.timeout_ms), handle).await {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(e))) => {
                warn!(capability = %name, "Capability failed: {}", e);
                ActionOutcome::failed(e.to_string())
            }
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    error!(capability = %name, "Capability panicked");
                    ActionOutcome::failed(format!("capability {name} panicked"))
                } else {
                    error!(capability = %name, "Capability task cancelled");
                    ActionOutcome::failed(format!("capability {name} was cancelled"))
                }
            }
            Err(_) => {
                // A timed-out handler must not complete its side effect later.
                abort.abort();
                warn!(capability = %name, "Capability timed out after {}ms", self.timeout_ms);
                ActionOutcome::failed(CapabilityError::Timeout(self.timeout_ms).to_string())
            }
        }
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
