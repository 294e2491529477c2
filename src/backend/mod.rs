//! Backend routing state and hot-swap.
//!
//! Provides thread-safe routing state, the durable restart hint, and the
//! health-gated protocol that switches traffic between the two pools
//! without interrupting in-flight requests.

mod state;
mod store;
mod switch;
mod version;

pub use state::{BackendRegistry, RoutingSnapshot};
pub use store::{FileVersionStore, MemoryVersionStore, PersistError, VersionStore};
pub use switch::{SwitchController, SwitchError, SwitchOutcome};
pub use version::{Version, VersionError};
