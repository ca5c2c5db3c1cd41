//! Domain models for the garment MRP platform

mod bom;
mod material;
mod order;
mod requirement;

pub use bom::*;
pub use material::*;
pub use order::*;
pub use requirement::*;
