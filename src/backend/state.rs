//! Shared routing state.
//!
//! Provides thread-safe access to the active version with support for
//! runtime switching without interrupting in-flight requests.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::Version;
use crate::config::Backends;

/// Consistent view of the routing state at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingSnapshot {
    pub version: Version,
    pub backend: String,
}

/// Thread-safe routing state with hot-swap support.
///
/// Uses a read-write lock pattern: many concurrent readers (requests)
/// can read the active backend, while writes (switches) are exclusive.
/// The lock only ever wraps in-memory reads and the flip itself.
#[derive(Clone)]
pub struct BackendRegistry {
    inner: Arc<RwLock<RoutingState>>,
}

struct RoutingState {
    active_version: Version,
    backends: Backends,
}

impl BackendRegistry {
    pub fn new(backends: Backends, active_version: Version) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RoutingState {
                active_version,
                backends,
            })),
        }
    }

    /// Build the registry at startup.
    ///
    /// A persisted version, when present, wins over the configured default.
    pub fn seeded(backends: Backends, default: Version, persisted: Option<Version>) -> Self {
        let active = match persisted {
            Some(version) => {
                tracing::info!(version = %version, "Restored last activated version");
                version
            }
            None => {
                tracing::info!(version = %default, "Using configured default version");
                default
            }
        };
        Self::new(backends, active)
    }

    /// URI of the backend all traffic should currently go to.
    pub fn active_backend(&self) -> String {
        let state = self.inner.read();
        state.backends.uri_for(state.active_version).to_string()
    }

    /// Both configured URIs, for status reporting.
    pub fn backends(&self) -> Backends {
        self.inner.read().backends.clone()
    }

    pub fn current_version(&self) -> Version {
        self.inner.read().active_version
    }

    /// Version and backend read under a single lock acquisition.
    pub fn snapshot(&self) -> RoutingSnapshot {
        let state = self.inner.read();
        RoutingSnapshot {
            version: state.active_version,
            backend: state.backends.uri_for(state.active_version).to_string(),
        }
    }

    /// Set the active version from a label.
    ///
    /// Returns false and leaves state untouched for unrecognized labels.
    /// No health checking happens here; callers go through the switch
    /// protocol for that.
    pub fn try_switch(&self, label: &str) -> bool {
        match label.parse::<Version>() {
            Ok(version) => {
                self.switch_to(version);
                true
            }
            Err(_) => false,
        }
    }

    /// Set the active version, returning the one it replaced.
    pub fn switch_to(&self, version: Version) -> Version {
        let mut state = self.inner.write();
        let previous = state.active_version;
        state.active_version = version;
        drop(state);

        if previous != version {
            tracing::info!(
                old_version = %previous,
                new_version = %version,
                "Active version switched"
            );
        }
        previous
    }
}
