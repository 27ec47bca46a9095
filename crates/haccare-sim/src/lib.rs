//! hacCare simulation lifecycle engine.
//!
//! Snapshots a template tenant, restores it into isolated simulation
//! tenants, resets and reconciles live simulations against updated
//! templates, and tears simulation tenant trees down again.

pub mod api;
pub mod config;
pub mod error;
mod lock;
pub mod manager;
pub mod reconcile;
pub mod restore;
pub mod snapshot;
pub mod teardown;

pub use api::{ApiResponse, LifecycleApi};
pub use config::LifecycleConfig;
pub use error::LifecycleError;
pub use manager::{Actor, SimulationLifecycleManager};
pub use reconcile::ReconciliationEngine;
pub use restore::{RestoreEngine, RestoreOptions, RestoreReport};
pub use snapshot::SnapshotBuilder;
pub use teardown::TenantTeardownService;
