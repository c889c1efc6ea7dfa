use std::sync::Arc;

use crate::{
    config::AppConfig,
    events::EventSender,
    repositories::PantryRepository,
    services::{
        consumption::ConsumptionService, inventory::InventoryService, locks::StockLocks,
    },
};

/// Factory for creating service instances with shared dependencies.
///
/// Every service built by one factory shares the same [`StockLocks`], so
/// stock edits and consumption reconciliation serialize on the same record.
pub struct ServiceFactory {
    repo: Arc<dyn PantryRepository>,
    config: AppConfig,
    locks: StockLocks,
    event_sender: Option<Arc<EventSender>>,
}

impl ServiceFactory {
    /// Creates a new service factory with the given dependencies
    pub fn new(
        repo: Arc<dyn PantryRepository>,
        config: AppConfig,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            repo,
            config,
            locks: StockLocks::new(),
            event_sender: event_sender.map(Arc::new),
        }
    }

    /// Creates a consumption service instance
    pub fn consumption_service(&self) -> ConsumptionService {
        ConsumptionService::new(
            self.repo.clone(),
            self.config.reconciliation.clone(),
            self.event_sender.clone(),
        )
        .with_locks(self.locks.clone())
    }

    /// Creates an inventory service instance
    pub fn inventory_service(&self) -> InventoryService {
        InventoryService::new(
            self.repo.clone(),
            self.config.inventory.clone(),
            self.event_sender.clone(),
        )
        .with_locks(self.locks.clone())
    }

    /// Gets a reference to the repository
    pub fn repository(&self) -> &Arc<dyn PantryRepository> {
        &self.repo
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Service container holding all service instances
#[derive(Clone)]
pub struct ServiceContainer {
    pub consumption: Arc<ConsumptionService>,
    pub inventory: Arc<InventoryService>,
}

impl ServiceContainer {
    /// Creates a new service container with all services initialized
    pub fn new(factory: &ServiceFactory) -> Self {
        Self {
            consumption: Arc::new(factory.consumption_service()),
            inventory: Arc::new(factory.inventory_service()),
        }
    }
}
