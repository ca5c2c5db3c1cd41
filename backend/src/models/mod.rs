//! Domain models for the garment MRP platform
//!
//! Re-exports the models from the shared crate

pub use shared::models::*;
