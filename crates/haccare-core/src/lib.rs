//! hacCare core: domain models, the entity registry and repository
//! traits shared by the storage and lifecycle crates.

pub mod barcode;
pub mod changeset;
pub mod coerce;
pub mod error;
pub mod id_map;
pub mod models;
pub mod registry;
pub mod repository;
