//! HTTP handlers for the garment MRP API

pub mod bom;
pub mod health;
pub mod material;
pub mod order;
pub mod requirements;
pub mod usage;

pub use bom::*;
pub use health::*;
pub use material::*;
pub use order::*;
pub use requirements::*;
pub use usage::*;
