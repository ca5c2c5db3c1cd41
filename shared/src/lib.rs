//! Shared types and models for the garment MRP platform
//!
//! This crate holds the domain model and the materials-requirements core
//! (BOM expansion, requirement aggregation and stock sufficiency checks) as
//! pure functions, independent of the HTTP and database layers.

pub mod models;
pub mod requirements;
pub mod stock;
pub mod types;
pub mod validation;

pub use models::*;
pub use requirements::*;
pub use stock::*;
pub use types::*;
pub use validation::*;
