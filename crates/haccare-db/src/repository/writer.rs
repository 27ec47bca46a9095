//! SurrealDB implementation of [`ChangeSetWriter`].
//!
//! A change set is rendered into one `BEGIN TRANSACTION ... COMMIT
//! TRANSACTION` query. Parameters for mutation `n` live under
//! `$batch.m<n>` in a single bound object, so statement text never
//! contains user data. If any statement fails SurrealDB cancels the
//! transaction and nothing from the change set is persisted.

use haccare_core::changeset::{ChangeSet, Mutation};
use haccare_core::error::CoreResult;
use haccare_core::models::simulation::ActiveSimulation;
use haccare_core::repository::ChangeSetWriter;
use serde_json::{Map, Value, json};
use surrealdb::{Connection, Surreal};
use tracing::debug;

use super::entity::owned_by_tenant;
use crate::error::DbError;

/// Drop `null` members so absent optionals reach SurrealDB as NONE.
fn compact(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        other => other,
    }
}

/// Rendered statements plus the `$batch` parameter object.
#[derive(Debug, Default)]
struct TransactionPlan {
    statements: Vec<String>,
    batch: Map<String, Value>,
}

impl TransactionPlan {
    fn from_changes(changes: &ChangeSet) -> Self {
        let mut plan = Self::default();
        for mutation in changes.mutations() {
            plan.add(mutation);
        }
        plan
    }

    /// Register `params` and return the SurrealQL path they are bound at.
    fn params(&mut self, params: Value) -> String {
        let key = format!("m{}", self.batch.len());
        let path = format!("$batch.{key}");
        self.batch.insert(key, compact(params));
        path
    }

    fn add(&mut self, mutation: &Mutation) {
        let statement = match mutation {
            Mutation::CreateTenant(tenant) => {
                let p = self.params(json!({
                    "id": tenant.id,
                    "name": tenant.name,
                    "tenant_type": tenant.tenant_type.as_str(),
                    "is_simulation": tenant.is_simulation,
                    "parent_tenant_id": tenant.parent_tenant_id,
                    "created_at": tenant.created_at,
                }));
                format!(
                    "CREATE type::record('tenant', {p}.id) SET \
                     name = {p}.name, tenant_type = {p}.tenant_type, \
                     is_simulation = {p}.is_simulation, \
                     parent_tenant_id = {p}.parent_tenant_id, \
                     created_at = <datetime> {p}.created_at;"
                )
            }
            Mutation::DeleteTenant { tenant_id } => {
                let p = self.params(json!({ "tenant_id": tenant_id }));
                format!("DELETE type::record('tenant', {p}.tenant_id);")
            }
            Mutation::InsertEntities { kind, records } => {
                let rows: Vec<Value> = records
                    .iter()
                    .map(|record| {
                        json!({
                            "id": record.id,
                            "content": compact(json!({
                                "tenant_id": record.tenant_id,
                                "patient_id": record.patient_id(),
                                "record": record.fields,
                            })),
                        })
                    })
                    .collect();
                let p = self.params(json!({ "rows": rows }));
                format!(
                    "FOR $row IN {p}.rows {{ \
                     CREATE type::record('{table}', $row.id) CONTENT $row.content; \
                     }};",
                    table = kind.table()
                )
            }
            Mutation::DeleteEntities { kind, ids } => {
                let p = self.params(json!({ "ids": ids }));
                format!(
                    "FOR $id IN {p}.ids {{ DELETE type::record('{table}', $id); }};",
                    table = kind.table()
                )
            }
            Mutation::PurgeEntities { kind, tenant_id } => {
                let p = self.params(json!({ "tenant_id": tenant_id }));
                format!(
                    "DELETE {table} WHERE {owned};",
                    table = kind.table(),
                    owned = owned_by_tenant(&format!("{p}.tenant_id"))
                )
            }
            Mutation::CreateTemplate(template) => {
                let p = self.params(json!({
                    "id": template.id,
                    "tenant_id": template.tenant_id,
                    "name": template.name,
                    "description": template.description,
                    "status": template.status.as_str(),
                    "snapshot_version": template.snapshot_version,
                    "default_duration_minutes": template.default_duration_minutes,
                    "created_by": template.created_by,
                    "created_at": template.created_at,
                    "updated_at": template.updated_at,
                }));
                format!(
                    "CREATE type::record('template', {p}.id) SET \
                     tenant_id = {p}.tenant_id, name = {p}.name, \
                     description = {p}.description, status = {p}.status, \
                     snapshot_version = {p}.snapshot_version, \
                     default_duration_minutes = {p}.default_duration_minutes, \
                     created_by = {p}.created_by, \
                     created_at = <datetime> {p}.created_at, \
                     updated_at = <datetime> {p}.updated_at;"
                )
            }
            Mutation::StoreSnapshot {
                template_id,
                snapshot,
                version,
            } => {
                let p = self.params(json!({
                    "template_id": template_id,
                    "snapshot": snapshot,
                    "version": version,
                }));
                // THROW cancels the transaction, so a concurrent snapshot
                // cannot be overwritten with the same version.
                format!(
                    "IF (SELECT VALUE snapshot_version FROM ONLY \
                     type::record('template', {p}.template_id)) != {p}.version - 1 {{ \
                     THROW 'template snapshot version is stale'; \
                     }};\n\
                     UPDATE type::record('template', {p}.template_id) SET \
                     snapshot = {p}.snapshot, snapshot_version = {p}.version, \
                     status = 'ready', updated_at = time::now();"
                )
            }
            Mutation::GrantAccess(access) => {
                let p = self.params(json!({
                    "id": access.id,
                    "tenant_id": access.tenant_id,
                    "user_id": access.user_id,
                    "role": access.role.as_str(),
                    "granted_at": access.granted_at,
                }));
                format!(
                    "CREATE type::record('tenant_access', {p}.id) SET \
                     tenant_id = {p}.tenant_id, user_id = {p}.user_id, \
                     role = {p}.role, granted_at = <datetime> {p}.granted_at;"
                )
            }
            Mutation::RevokeTenantAccess { tenant_id } => {
                let p = self.params(json!({ "tenant_id": tenant_id }));
                format!("DELETE tenant_access WHERE tenant_id = {p}.tenant_id;")
            }
            Mutation::CreateSimulation(sim) => {
                let p = self.params(simulation_params(sim));
                format!(
                    "CREATE type::record('active_simulation', {p}.id) SET {};",
                    simulation_assignments(&p, sim)
                )
            }
            Mutation::UpdateSimulation(sim) => {
                let p = self.params(simulation_params(sim));
                format!(
                    "UPDATE type::record('active_simulation', {p}.id) SET {};",
                    simulation_assignments(&p, sim)
                )
            }
            Mutation::DeleteSimulation { simulation_id } => {
                let p = self.params(json!({ "simulation_id": simulation_id }));
                format!("DELETE type::record('active_simulation', {p}.simulation_id);")
            }
            Mutation::AddParticipants(participants) => {
                let rows: Vec<Value> = participants
                    .iter()
                    .map(|participant| {
                        json!({
                            "id": participant.id,
                            "simulation_id": participant.simulation_id,
                            "user_id": participant.user_id,
                            "role": participant.role.as_str(),
                        })
                    })
                    .collect();
                let p = self.params(json!({ "rows": rows }));
                format!(
                    "FOR $row IN {p}.rows {{ \
                     CREATE type::record('simulation_participant', $row.id) SET \
                     simulation_id = $row.simulation_id, user_id = $row.user_id, \
                     role = $row.role; \
                     }};"
                )
            }
            Mutation::RemoveParticipants { simulation_id } => {
                let p = self.params(json!({ "simulation_id": simulation_id }));
                format!("DELETE simulation_participant WHERE simulation_id = {p}.simulation_id;")
            }
            Mutation::ArchiveHistory(history) => {
                let p = self.params(json!({
                    "id": history.id,
                    "simulation_id": history.simulation_id,
                    "template_id": history.template_id,
                    "name": history.name,
                    "started_at": history.started_at,
                    "ended_at": history.ended_at,
                    "duration_minutes": history.duration_minutes,
                    "primary_categories": history.primary_categories,
                    "sub_categories": history.sub_categories,
                    "final_status": history.final_status.as_str(),
                    "participant_count": history.participant_count,
                    "archived_at": history.archived_at,
                }));
                format!(
                    "CREATE type::record('simulation_history', {p}.id) SET \
                     simulation_id = {p}.simulation_id, template_id = {p}.template_id, \
                     name = {p}.name, \
                     started_at = <datetime> {p}.started_at, \
                     ended_at = <datetime> {p}.ended_at, \
                     duration_minutes = {p}.duration_minutes, \
                     primary_categories = {p}.primary_categories, \
                     sub_categories = {p}.sub_categories, \
                     final_status = {p}.final_status, \
                     participant_count = {p}.participant_count, \
                     archived_at = <datetime> {p}.archived_at;"
                )
            }
            Mutation::AppendAudit(entry) => {
                let metadata = match &entry.metadata {
                    Value::Object(_) => entry.metadata.clone(),
                    _ => json!({}),
                };
                let p = self.params(json!({
                    "id": entry.id,
                    "actor_id": entry.actor_id,
                    "action": entry.action,
                    "simulation_id": entry.simulation_id,
                    "tenant_id": entry.tenant_id,
                    "outcome": entry.outcome.as_str(),
                    "metadata": metadata,
                    "timestamp": entry.timestamp,
                }));
                format!(
                    "CREATE type::record('audit_log', {p}.id) SET \
                     actor_id = {p}.actor_id, action = {p}.action, \
                     simulation_id = {p}.simulation_id, tenant_id = {p}.tenant_id, \
                     outcome = {p}.outcome, metadata = {p}.metadata, \
                     timestamp = <datetime> {p}.timestamp;"
                )
            }
        };
        self.statements.push(statement);
    }

    fn query(&self) -> String {
        let mut sql = String::from("BEGIN TRANSACTION;\n");
        for statement in &self.statements {
            sql.push_str(statement);
            sql.push('\n');
        }
        sql.push_str("COMMIT TRANSACTION;");
        sql
    }
}

fn simulation_params(sim: &ActiveSimulation) -> Value {
    json!({
        "id": sim.id,
        "tenant_id": sim.tenant_id,
        "template_id": sim.template_id,
        "name": sim.name,
        "status": sim.status.as_str(),
        "duration_minutes": sim.duration_minutes,
        "starts_at": sim.starts_at,
        "ends_at": sim.ends_at,
        "template_snapshot_version_synced": sim.template_snapshot_version_synced,
        "primary_categories": sim.primary_categories,
        "sub_categories": sim.sub_categories,
        "launched_by": sim.launched_by,
        "first_started_at": sim.first_started_at,
        "created_at": sim.created_at,
        "updated_at": sim.updated_at,
    })
}

fn simulation_assignments(p: &str, sim: &ActiveSimulation) -> String {
    // `<datetime> NONE` is an error, so the optional timestamp is only cast
    // when present.
    let first_started_at = if sim.first_started_at.is_some() {
        format!("<datetime> {p}.first_started_at")
    } else {
        "NONE".to_string()
    };
    format!(
        "tenant_id = {p}.tenant_id, template_id = {p}.template_id, \
         name = {p}.name, status = {p}.status, \
         duration_minutes = {p}.duration_minutes, \
         starts_at = <datetime> {p}.starts_at, \
         ends_at = <datetime> {p}.ends_at, \
         template_snapshot_version_synced = {p}.template_snapshot_version_synced, \
         primary_categories = {p}.primary_categories, \
         sub_categories = {p}.sub_categories, \
         launched_by = {p}.launched_by, \
         first_started_at = {first_started_at}, \
         created_at = <datetime> {p}.created_at, \
         updated_at = <datetime> {p}.updated_at"
    )
}

#[derive(Clone)]
pub struct SurrealChangeSetWriter<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealChangeSetWriter<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ChangeSetWriter for SurrealChangeSetWriter<C> {
    async fn apply(&self, changes: ChangeSet) -> CoreResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let plan = TransactionPlan::from_changes(&changes);
        debug!(mutations = plan.statements.len(), "Applying change set");

        self.db
            .query(plan.query())
            .bind(("batch", Value::Object(plan.batch)))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Transaction(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haccare_core::models::entity::EntityRecord;
    use haccare_core::registry::EntityKind;
    use haccare_core::models::snapshot::Snapshot;
    use haccare_core::models::template::{CreateTemplate, SimulationTemplate};
    use haccare_core::models::tenant::{CreateTenant, Tenant, TenantType};
    use uuid::Uuid;

    #[test]
    fn statements_are_wrapped_in_one_transaction() {
        let mut changes = ChangeSet::new();
        changes
            .push(Mutation::CreateTenant(Tenant::new(CreateTenant {
                name: "Ward 3".into(),
                tenant_type: TenantType::SimulationActive,
                parent_tenant_id: None,
            })))
            .push(Mutation::PurgeEntities {
                kind: EntityKind::Order,
                tenant_id: Uuid::new_v4(),
            });

        let plan = TransactionPlan::from_changes(&changes);
        let sql = plan.query();
        assert!(sql.starts_with("BEGIN TRANSACTION;"));
        assert!(sql.ends_with("COMMIT TRANSACTION;"));
        assert!(sql.contains("DELETE care_order WHERE tenant_id = $batch.m1.tenant_id"));
        assert_eq!(plan.batch.len(), 2);
    }

    #[test]
    fn absent_optionals_are_not_bound_as_null() {
        let mut changes = ChangeSet::new();
        changes.push(Mutation::CreateTenant(Tenant::new(CreateTenant {
            name: "Standalone".into(),
            tenant_type: TenantType::Standard,
            parent_tenant_id: None,
        })));

        let plan = TransactionPlan::from_changes(&changes);
        let params = plan.batch["m0"].as_object().unwrap();
        assert!(!params.contains_key("parent_tenant_id"));
        assert_eq!(params["tenant_type"], json!("standard"));
    }

    #[test]
    fn entity_rows_carry_patient_column() {
        let patient_id = Uuid::new_v4();
        let mut fields = Map::new();
        fields.insert("patient_id".into(), json!(patient_id.to_string()));
        fields.insert("name".into(), json!("Heparin"));
        let record = EntityRecord {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            kind: EntityKind::Medication,
            fields,
        };

        let mut changes = ChangeSet::new();
        changes.insert_entities(EntityKind::Medication, vec![record.clone()]);
        let plan = TransactionPlan::from_changes(&changes);

        let row = &plan.batch["m0"]["rows"][0];
        assert_eq!(row["id"], json!(record.id));
        assert_eq!(row["content"]["patient_id"], json!(patient_id));
        assert_eq!(row["content"]["record"]["name"], json!("Heparin"));
        assert!(plan.statements[0].contains("type::record('medication', $row.id)"));
    }

    #[test]
    fn snapshot_store_is_guarded_by_the_previous_version() {
        let template = SimulationTemplate::new(CreateTemplate {
            tenant_id: Uuid::new_v4(),
            name: "Sepsis".into(),
            description: None,
            default_duration_minutes: 60,
            created_by: None,
        });
        let mut changes = ChangeSet::new();
        changes
            .push(Mutation::CreateTemplate(template.clone()))
            .push(Mutation::StoreSnapshot {
                template_id: template.id,
                snapshot: Box::new(Snapshot::new(template.tenant_id, None, Default::default())),
                version: 1,
            });

        let plan = TransactionPlan::from_changes(&changes);
        assert_eq!(plan.batch["m0"]["status"], json!("draft"));
        assert!(!plan.batch["m0"].as_object().unwrap().contains_key("description"));
        assert_eq!(plan.batch["m1"]["version"], json!(1));
        assert!(plan.statements[1].contains("!= $batch.m1.version - 1"));
        assert!(plan.statements[1].contains("THROW"));
        assert!(plan.statements[1].contains("snapshot_version = $batch.m1.version"));
    }
}
