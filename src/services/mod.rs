// Reconciliation between stock and consumption history
pub mod consumption;
pub mod inventory;
pub mod locks;

// Spoilage risk
pub mod ranking;
pub mod risk;

// Service factory for dependency injection
pub mod factory;

pub use consumption::{CategorySummary, ConsumptionService, Page};
pub use factory::{ServiceContainer, ServiceFactory};
pub use inventory::{InventoryService, StockCategorySummary};
pub use locks::{StockLockGuard, StockLocks};
pub use ranking::{RankedStock, RankingService};
pub use risk::{RiskAssessment, RiskFactors, RiskLevel, RiskScorer};
