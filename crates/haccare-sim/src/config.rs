//! Lifecycle engine configuration.

use uuid::Uuid;

/// Configuration for the simulation lifecycle manager.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Parent tenant for simulations launched by privileged users that
    /// have no home tenant. `None` makes such launches fail validation.
    pub fallback_parent_tenant_id: Option<Uuid>,
    /// Duration used when a launch does not specify one and the template
    /// has no default (default: 120 minutes).
    pub default_duration_minutes: u32,
    /// Upper bound for a simulation's timer window (default: 1440 = 24 h).
    pub max_duration_minutes: u32,
    /// Prefix for generated patient barcodes.
    pub barcode_prefix: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            fallback_parent_tenant_id: None,
            default_duration_minutes: 120,
            max_duration_minutes: 1440,
            barcode_prefix: "PT".into(),
        }
    }
}
