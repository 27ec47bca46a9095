//! Integration tests for schema initialization using in-memory SurrealDB.

use haccare_core::registry::{Capability, SchemaCapabilities};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

async fn empty_db() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    db
}

#[tokio::test]
async fn schema_migration_applies_successfully() {
    let db = empty_db().await;

    haccare_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("INFO FOR DB").await.unwrap();
    let info: Option<surrealdb_types::Value> = result.take(0).unwrap();
    let info = info.expect("INFO FOR DB should return a value");
    let info_str = format!("{:?}", info);

    for table in [
        "tenant",
        "tenant_access",
        "template",
        "active_simulation",
        "simulation_participant",
        "simulation_history",
        "audit_log",
        "patient",
        "medication",
        "care_order",
        "administration",
        "wound_assessment",
        "directive",
    ] {
        assert!(info_str.contains(table), "missing {table} table");
    }
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let db = empty_db().await;

    haccare_db::run_migrations(&db).await.unwrap();
    haccare_db::run_migrations(&db).await.unwrap();

    assert_eq!(
        haccare_db::schema_version(&db).await.unwrap(),
        haccare_db::LATEST_SCHEMA_VERSION
    );
}

#[tokio::test]
async fn capabilities_follow_applied_revision() {
    let db = empty_db().await;
    assert_eq!(haccare_db::schema_version(&db).await.unwrap(), 0);

    haccare_db::run_migrations_to(&db, 1).await.unwrap();
    let caps = haccare_db::detect_capabilities(&db).await.unwrap();
    assert_eq!(caps, SchemaCapabilities::none());

    haccare_db::run_migrations(&db).await.unwrap();
    let caps = haccare_db::detect_capabilities(&db).await.unwrap();
    assert!(caps.contains(Capability::Wounds));
    assert!(caps.contains(Capability::AdvanceDirectives));
}
