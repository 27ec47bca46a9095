//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode. UUIDs are stored as strings
//! and enums as strings with ASSERT constraints. Patient-care entity rows
//! keep their coerced fields in a FLEXIBLE `record` object next to the
//! indexed `tenant_id` and `patient_id` columns.
//!
//! Revision 2 adds the optional clinical tables. The applied revision
//! determines the [`SchemaCapabilities`] the engine runs with.

use haccare_core::registry::{Capability, SchemaCapabilities};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: fn() -> String,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: schema_v1_sql,
    },
    Migration {
        version: 2,
        name: "optional_clinical_tables",
        sql: schema_v2_sql,
    },
];

/// Latest schema revision known to this build.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

/// DDL for one patient-care entity table.
fn entity_table_ddl(table: &str) -> String {
    format!(
        "DEFINE TABLE {table} SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE {table} TYPE string;
DEFINE FIELD patient_id ON TABLE {table} TYPE option<string>;
DEFINE FIELD record ON TABLE {table} TYPE object FLEXIBLE DEFAULT {{}};
DEFINE FIELD created_at ON TABLE {table} TYPE datetime DEFAULT time::now();
DEFINE INDEX idx_{table}_tenant ON TABLE {table} COLUMNS tenant_id;
DEFINE INDEX idx_{table}_patient ON TABLE {table} COLUMNS patient_id;
"
    )
}

const V1_ENTITY_TABLES: &[&str] = &[
    "patient",
    "medication",
    "vital",
    "note",
    "alert",
    "care_order",
    "assessment",
    "administration",
];

const V2_ENTITY_TABLES: &[&str] = &[
    "body_location",
    "device",
    "wound",
    "wound_assessment",
    "directive",
];

fn schema_v1_sql() -> String {
    let mut sql = String::from(SCHEMA_V1_BASE);
    for table in V1_ENTITY_TABLES {
        sql.push_str(&entity_table_ddl(table));
    }
    sql
}

fn schema_v2_sql() -> String {
    V2_ENTITY_TABLES
        .iter()
        .map(|table| entity_table_ddl(table))
        .collect()
}

// -----------------------------------------------------------------------
// Schema v1: tenancy, lifecycle tables, core clinical tables
// -----------------------------------------------------------------------

const SCHEMA_V1_BASE: &str = "\
-- =======================================================================
-- Tenants
-- =======================================================================
DEFINE TABLE tenant SCHEMAFULL;
DEFINE FIELD name ON TABLE tenant TYPE string;
DEFINE FIELD tenant_type ON TABLE tenant TYPE string \
    ASSERT $value IN ['standard', 'template', 'simulation_active'];
DEFINE FIELD is_simulation ON TABLE tenant TYPE bool DEFAULT false;
DEFINE FIELD parent_tenant_id ON TABLE tenant TYPE option<string>;
DEFINE FIELD created_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_tenant_parent ON TABLE tenant COLUMNS parent_tenant_id;

DEFINE TABLE tenant_access SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE tenant_access TYPE string;
DEFINE FIELD user_id ON TABLE tenant_access TYPE string;
DEFINE FIELD role ON TABLE tenant_access TYPE string \
    ASSERT $value IN ['admin', 'nurse', 'viewer'];
DEFINE FIELD granted_at ON TABLE tenant_access TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_tenant_access_tenant_user ON TABLE tenant_access \
    COLUMNS tenant_id, user_id UNIQUE;

-- =======================================================================
-- Templates
-- =======================================================================
DEFINE TABLE template SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE template TYPE string;
DEFINE FIELD name ON TABLE template TYPE string;
DEFINE FIELD description ON TABLE template TYPE option<string>;
DEFINE FIELD status ON TABLE template TYPE string \
    ASSERT $value IN ['draft', 'ready'];
DEFINE FIELD snapshot ON TABLE template TYPE option<object> FLEXIBLE;
DEFINE FIELD snapshot_version ON TABLE template TYPE int DEFAULT 0;
DEFINE FIELD default_duration_minutes ON TABLE template TYPE int;
DEFINE FIELD created_by ON TABLE template TYPE option<string>;
DEFINE FIELD created_at ON TABLE template TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE template TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_template_tenant ON TABLE template COLUMNS tenant_id UNIQUE;

-- =======================================================================
-- Simulations
-- =======================================================================
DEFINE TABLE active_simulation SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE active_simulation TYPE string;
DEFINE FIELD template_id ON TABLE active_simulation TYPE string;
DEFINE FIELD name ON TABLE active_simulation TYPE string;
DEFINE FIELD status ON TABLE active_simulation TYPE string \
    ASSERT $value IN ['launching', 'lobby', 'running', 'paused', \
    'completed', 'deleted'];
DEFINE FIELD duration_minutes ON TABLE active_simulation TYPE int;
DEFINE FIELD starts_at ON TABLE active_simulation TYPE datetime;
DEFINE FIELD ends_at ON TABLE active_simulation TYPE datetime;
DEFINE FIELD template_snapshot_version_synced ON TABLE active_simulation \
    TYPE int;
DEFINE FIELD primary_categories ON TABLE active_simulation \
    TYPE array<string> DEFAULT [];
DEFINE FIELD sub_categories ON TABLE active_simulation \
    TYPE array<string> DEFAULT [];
DEFINE FIELD launched_by ON TABLE active_simulation TYPE option<string>;
DEFINE FIELD first_started_at ON TABLE active_simulation \
    TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE active_simulation TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE active_simulation TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_active_simulation_tenant ON TABLE active_simulation \
    COLUMNS tenant_id UNIQUE;

DEFINE TABLE simulation_participant SCHEMAFULL;
DEFINE FIELD simulation_id ON TABLE simulation_participant TYPE string;
DEFINE FIELD user_id ON TABLE simulation_participant TYPE string;
DEFINE FIELD role ON TABLE simulation_participant TYPE string \
    ASSERT $value IN ['instructor', 'student', 'observer'];
DEFINE INDEX idx_participant_sim_user ON TABLE simulation_participant \
    COLUMNS simulation_id, user_id UNIQUE;

DEFINE TABLE simulation_history SCHEMAFULL;
DEFINE FIELD simulation_id ON TABLE simulation_history TYPE string;
DEFINE FIELD template_id ON TABLE simulation_history TYPE string;
DEFINE FIELD name ON TABLE simulation_history TYPE string;
DEFINE FIELD started_at ON TABLE simulation_history TYPE datetime;
DEFINE FIELD ended_at ON TABLE simulation_history TYPE datetime;
DEFINE FIELD duration_minutes ON TABLE simulation_history TYPE int;
DEFINE FIELD primary_categories ON TABLE simulation_history \
    TYPE array<string> DEFAULT [];
DEFINE FIELD sub_categories ON TABLE simulation_history \
    TYPE array<string> DEFAULT [];
DEFINE FIELD final_status ON TABLE simulation_history TYPE string;
DEFINE FIELD participant_count ON TABLE simulation_history TYPE int;
DEFINE FIELD archived_at ON TABLE simulation_history TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_history_template ON TABLE simulation_history \
    COLUMNS template_id;

-- =======================================================================
-- Audit log (append-only)
-- =======================================================================
DEFINE TABLE audit_log SCHEMAFULL;
DEFINE FIELD actor_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD action ON TABLE audit_log TYPE string;
DEFINE FIELD simulation_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD tenant_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD outcome ON TABLE audit_log TYPE string \
    ASSERT $value IN ['success', 'failure'];
DEFINE FIELD metadata ON TABLE audit_log TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD timestamp ON TABLE audit_log TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_simulation ON TABLE audit_log COLUMNS simulation_id;

";

/// Capabilities available once `version` has been applied.
pub fn capabilities_for_version(version: u32) -> SchemaCapabilities {
    if version >= 2 {
        SchemaCapabilities::none()
            .with(Capability::BodyLocations)
            .with(Capability::Devices)
            .with(Capability::Wounds)
            .with(Capability::AdvanceDirectives)
    } else {
        SchemaCapabilities::none()
    }
}

/// Highest applied migration version, or 0 on an empty database.
pub async fn schema_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    Ok(records.first().map(|m| m.version).unwrap_or(0))
}

/// Resolve the engine's capabilities from the applied schema revision.
/// Called once at startup.
pub async fn detect_capabilities<C: Connection>(
    db: &Surreal<C>,
) -> Result<SchemaCapabilities, DbError> {
    let version = schema_version(db).await?;
    let capabilities = capabilities_for_version(version);
    info!(
        version,
        capabilities = ?capabilities.iter().collect::<Vec<_>>(),
        "Resolved schema capabilities"
    );
    Ok(capabilities)
}

/// Run all pending migrations.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    run_migrations_to(db, LATEST_SCHEMA_VERSION).await
}

/// Run pending migrations up to and including `target`.
///
/// Creates a `_migration` tracking table on first run, then applies each
/// migration whose version exceeds the current maximum. Re-running is
/// safe.
pub async fn run_migrations_to<C: Connection>(
    db: &Surreal<C>,
    target: u32,
) -> Result<(), DbError> {
    let current_version = schema_version(db).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version && migration.version <= target {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query((migration.sql)()).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
        assert_eq!(
            MIGRATIONS.last().map(|m| m.version),
            Some(LATEST_SCHEMA_VERSION)
        );
    }

    #[test]
    fn entity_tables_have_tenant_and_patient_columns() {
        let v1 = schema_v1_sql();
        for table in ["patient", "medication", "administration", "care_order"] {
            assert!(v1.contains(&format!("DEFINE TABLE {table} SCHEMAFULL")));
            assert!(v1.contains(&format!("patient_id ON TABLE {table}")));
        }
        assert!(!v1.contains("DEFINE TABLE wound "));
        assert!(schema_v2_sql().contains("DEFINE TABLE wound SCHEMAFULL"));
        assert!(schema_v2_sql().contains("DEFAULT {};"));
    }

    #[test]
    fn capabilities_track_revision() {
        assert!(!capabilities_for_version(1).contains(Capability::Wounds));
        assert!(capabilities_for_version(2).contains(Capability::Wounds));
        assert_eq!(capabilities_for_version(2), SchemaCapabilities::all());
    }
}
