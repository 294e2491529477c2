//! Health-gated switch protocol.
//!
//! The only write path to the active version: validate the label, probe the
//! candidate, flip in memory, persist. A failed persist rolls the flip back,
//! so callers only ever observe "switched" or "rejected".

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::backend::state::{BackendRegistry, RoutingSnapshot};
use crate::backend::store::{PersistError, VersionStore};
use crate::backend::version::{Version, VersionError};
use crate::proxy::health::HealthGate;

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error(transparent)]
    InvalidVersion(#[from] VersionError),

    #[error("target backend {backend} for {version} failed its health probe")]
    UnhealthyTarget {
        version: Version,
        backend: String,
        current: RoutingSnapshot,
    },

    #[error("could not persist switch to {version}: {source}")]
    Persistence {
        version: Version,
        #[source]
        source: PersistError,
    },
}

/// Result of a committed switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchOutcome {
    pub version: Version,
    pub backend: String,
    pub previous: Version,
}

pub struct SwitchController {
    registry: BackendRegistry,
    gate: Arc<dyn HealthGate>,
    store: Arc<dyn VersionStore>,
    // Serializes whole switch attempts so a rollback can never undo a
    // concurrent switch. Readers of the registry never touch this.
    //
    // The in-memory flip lands before the version is persisted. If the
    // persist fails, requests arriving between the flip and the rollback
    // are routed to the target that is then reverted.
    in_progress: Mutex<()>,
}

impl SwitchController {
    pub fn new(
        registry: BackendRegistry,
        gate: Arc<dyn HealthGate>,
        store: Arc<dyn VersionStore>,
    ) -> Self {
        Self {
            registry,
            gate,
            store,
            in_progress: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn gate(&self) -> &Arc<dyn HealthGate> {
        &self.gate
    }

    /// Run the switch protocol for a version label.
    pub async fn switch(&self, label: &str) -> Result<SwitchOutcome, SwitchError> {
        let version: Version = label.parse()?;
        let backend = self.registry.backends().uri_for(version).to_string();

        let _guard = self.in_progress.lock().await;

        tracing::info!(version = %version, backend = %backend, "Probing switch target");
        if !self.gate.probe(&backend).await {
            let current = self.registry.snapshot();
            tracing::warn!(
                version = %version,
                backend = %backend,
                current_version = %current.version,
                "Switch rejected: target unhealthy"
            );
            return Err(SwitchError::UnhealthyTarget {
                version,
                backend,
                current,
            });
        }

        let previous = self.registry.switch_to(version);

        if let Err(source) = self.persist(version).await {
            self.registry.switch_to(previous);
            tracing::error!(
                version = %version,
                rolled_back_to = %previous,
                error = %source,
                "Switch rolled back: failed to persist version"
            );
            return Err(SwitchError::Persistence { version, source });
        }

        tracing::info!(
            old_version = %previous,
            new_version = %version,
            backend = %backend,
            "Switch committed"
        );

        Ok(SwitchOutcome {
            version,
            backend,
            previous,
        })
    }

    /// Stores do blocking file I/O, so they run on the blocking pool.
    async fn persist(&self, version: Version) -> Result<(), PersistError> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.persist(version)).await?
    }
}
