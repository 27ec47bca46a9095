//! Domain models for hacCare.
//!
//! These are the core types shared across all crates.

pub mod access;
pub mod audit;
pub mod entity;
pub mod history;
pub mod participant;
pub mod simulation;
pub mod snapshot;
pub mod template;
pub mod tenant;
