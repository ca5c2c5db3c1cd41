//! Business logic services for the garment MRP platform

pub mod bom;
pub mod material;
pub mod order;
pub mod requirements;
pub mod stock_commit;
pub mod usage;

#[cfg(test)]
pub(crate) mod test_support;

pub use bom::BomService;
pub use material::MaterialService;
pub use order::OrderService;
pub use requirements::RequirementsService;
pub use stock_commit::StockCommitService;
pub use usage::UsageHistoryService;
