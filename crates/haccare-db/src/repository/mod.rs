//! SurrealDB repository implementations.

mod access;
mod audit;
mod entity;
mod simulation;
mod template;
mod tenant;
mod writer;

pub use access::SurrealAccessRepository;
pub use audit::SurrealAuditRepository;
pub use entity::SurrealEntityRepository;
pub use simulation::SurrealSimulationRepository;
pub use template::SurrealTemplateRepository;
pub use tenant::SurrealTenantRepository;
pub use writer::SurrealChangeSetWriter;

use haccare_core::repository::Repositories;
use surrealdb::{Connection, Surreal};
use uuid::Uuid;

use crate::error::DbError;

/// Parse a UUID column, reporting the table it came from when corrupt.
pub(crate) fn parse_uuid(table: &str, value: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::decode(table, format!("invalid UUID '{value}': {e}")))
}

pub(crate) fn parse_optional_uuid(
    table: &str,
    value: Option<&str>,
) -> Result<Option<Uuid>, DbError> {
    value.map(|v| parse_uuid(table, v)).transpose()
}

/// Every repository over one shared SurrealDB handle.
#[derive(Clone)]
pub struct SurrealRepositories<C: Connection> {
    tenants: SurrealTenantRepository<C>,
    templates: SurrealTemplateRepository<C>,
    simulations: SurrealSimulationRepository<C>,
    access: SurrealAccessRepository<C>,
    audit: SurrealAuditRepository<C>,
    entities: SurrealEntityRepository<C>,
    writer: SurrealChangeSetWriter<C>,
}

impl<C: Connection> SurrealRepositories<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            tenants: SurrealTenantRepository::new(db.clone()),
            templates: SurrealTemplateRepository::new(db.clone()),
            simulations: SurrealSimulationRepository::new(db.clone()),
            access: SurrealAccessRepository::new(db.clone()),
            audit: SurrealAuditRepository::new(db.clone()),
            entities: SurrealEntityRepository::new(db.clone()),
            writer: SurrealChangeSetWriter::new(db),
        }
    }
}

impl<C: Connection> Repositories for SurrealRepositories<C> {
    type Tenants = SurrealTenantRepository<C>;
    type Templates = SurrealTemplateRepository<C>;
    type Simulations = SurrealSimulationRepository<C>;
    type Access = SurrealAccessRepository<C>;
    type Audit = SurrealAuditRepository<C>;
    type Entities = SurrealEntityRepository<C>;
    type Writer = SurrealChangeSetWriter<C>;

    fn tenants(&self) -> &Self::Tenants {
        &self.tenants
    }

    fn templates(&self) -> &Self::Templates {
        &self.templates
    }

    fn simulations(&self) -> &Self::Simulations {
        &self.simulations
    }

    fn access(&self) -> &Self::Access {
        &self.access
    }

    fn audit(&self) -> &Self::Audit {
        &self.audit
    }

    fn entities(&self) -> &Self::Entities {
        &self.entities
    }

    fn writer(&self) -> &Self::Writer {
        &self.writer
    }
}
