#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use pantry_ledger::{
    config::AppConfig,
    entities::{
        ConsumptionFilter, ConsumptionRecord, ConsumptionRecordPatch, FoodCategory,
        LogConsumptionRequest, NewConsumptionRecord, NewStockRecord, StockRecord,
        StockRecordPatch,
    },
    events::{self, EventSender},
    repositories::{
        ConsumptionRecordStore, InMemoryRepository, PantryRepository, StockRecordStore,
        StoreError,
    },
    services::{ServiceContainer, ServiceFactory},
};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Helper harness wiring both services to one store for a single owner.
pub struct TestPantry {
    pub repo: Arc<dyn PantryRepository>,
    pub services: ServiceContainer,
    pub owner: Uuid,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestPantry {
    /// Construct a pantry over a fresh in-memory store.
    pub fn new() -> Self {
        Self::with_repo(Arc::new(InMemoryRepository::new()))
    }

    pub fn with_repo(repo: Arc<dyn PantryRepository>) -> Self {
        Self::with_repo_and_config(repo, AppConfig::default())
    }

    pub fn with_repo_and_config(repo: Arc<dyn PantryRepository>, config: AppConfig) -> Self {
        let (sender, rx) = EventSender::channel(config.event_channel_capacity);
        let event_task = tokio::spawn(events::process_events(rx));
        let factory = ServiceFactory::new(repo.clone(), config, Some(sender));

        Self {
            repo,
            services: ServiceContainer::new(&factory),
            owner: Uuid::new_v4(),
            _event_task: event_task,
        }
    }

    /// Adds a stock record for the harness owner.
    pub async fn stock(&self, name: &str, category: FoodCategory, quantity: i64) -> StockRecord {
        self.stock_for(self.owner, name, category, quantity).await
    }

    pub async fn stock_for(
        &self,
        owner: Uuid,
        name: &str,
        category: FoodCategory,
        quantity: i64,
    ) -> StockRecord {
        self.services
            .inventory
            .add_item(owner, new_stock(name, category, quantity, 7))
            .await
            .expect("seed stock record")
    }

    /// Logs consumption for the harness owner and unwraps the result.
    pub async fn consume(&self, stock_record_id: Uuid, quantity: i64) -> ConsumptionRecord {
        self.services
            .consumption
            .log_consumption(self.owner, consume_request(stock_record_id, quantity))
            .await
            .expect("log consumption")
    }

    /// Current quantity of a stock record, or `None` once it has been removed.
    pub async fn quantity_of(&self, stock_record_id: Uuid) -> Option<i64> {
        self.repo
            .get_stock_record(stock_record_id)
            .await
            .expect("read stock record")
            .map(|record| record.quantity)
    }

    pub async fn consumption_count(&self) -> usize {
        self.repo
            .list_consumption_records(self.owner, &ConsumptionFilter::default())
            .await
            .expect("list consumption")
            .len()
    }
}

pub fn new_stock(name: &str, category: FoodCategory, quantity: i64, days: i64) -> NewStockRecord {
    NewStockRecord {
        name: name.to_string(),
        category,
        quantity,
        expiration_days: days,
        expiry_date: None,
        unit_cost: Decimal::new(250, 2),
    }
}

pub fn new_stock_expiring(
    name: &str,
    category: FoodCategory,
    quantity: i64,
    expiry_date: NaiveDate,
) -> NewStockRecord {
    NewStockRecord {
        expiry_date: Some(expiry_date),
        ..new_stock(name, category, quantity, 1)
    }
}

pub fn consume_request(stock_record_id: Uuid, quantity: i64) -> LogConsumptionRequest {
    LogConsumptionRequest {
        stock_record_id,
        quantity,
        date: None,
        notes: None,
    }
}

/// Store wrapper that fails or stalls selected writes on demand.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryRepository,
    pub fail_stock_updates: AtomicBool,
    pub fail_consumption_updates: AtomicBool,
    pub fail_consumption_deletes: AtomicBool,
    /// Consumption updates carrying these notes sleep before writing.
    slow_notes: Mutex<Option<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(flag: &AtomicBool, on: bool) {
        flag.store(on, Ordering::SeqCst);
    }

    pub fn slow_down_notes(&self, notes: &str) {
        *self.slow_notes.lock().unwrap() = Some(notes.to_string());
    }

    fn is_slow(&self, patch: &ConsumptionRecordPatch) -> bool {
        let slow = self.slow_notes.lock().unwrap();
        slow.is_some() && patch.notes == *slow
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(format!("injected {} failure", what)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StockRecordStore for FlakyStore {
    async fn get_stock_record(&self, id: Uuid) -> Result<Option<StockRecord>, StoreError> {
        self.inner.get_stock_record(id).await
    }

    async fn create_stock_record(&self, record: StockRecord) -> Result<StockRecord, StoreError> {
        self.inner.create_stock_record(record).await
    }

    async fn update_stock_record(
        &self,
        id: Uuid,
        patch: &StockRecordPatch,
    ) -> Result<StockRecord, StoreError> {
        Self::check(&self.fail_stock_updates, "stock update")?;
        self.inner.update_stock_record(id, patch).await
    }

    async fn delete_stock_record(
        &self,
        id: Uuid,
        expected_version: Option<i64>,
    ) -> Result<(), StoreError> {
        Self::check(&self.fail_stock_updates, "stock delete")?;
        self.inner.delete_stock_record(id, expected_version).await
    }

    async fn list_stock_records(&self, owner_id: Uuid) -> Result<Vec<StockRecord>, StoreError> {
        self.inner.list_stock_records(owner_id).await
    }
}

#[async_trait]
impl ConsumptionRecordStore for FlakyStore {
    async fn get_consumption_record(
        &self,
        id: Uuid,
    ) -> Result<Option<ConsumptionRecord>, StoreError> {
        self.inner.get_consumption_record(id).await
    }

    async fn create_consumption_record(
        &self,
        record: NewConsumptionRecord,
    ) -> Result<ConsumptionRecord, StoreError> {
        self.inner.create_consumption_record(record).await
    }

    async fn update_consumption_record(
        &self,
        id: Uuid,
        patch: &ConsumptionRecordPatch,
    ) -> Result<ConsumptionRecord, StoreError> {
        Self::check(&self.fail_consumption_updates, "consumption update")?;
        if self.is_slow(patch) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        self.inner.update_consumption_record(id, patch).await
    }

    async fn delete_consumption_record(&self, id: Uuid) -> Result<(), StoreError> {
        Self::check(&self.fail_consumption_deletes, "consumption delete")?;
        self.inner.delete_consumption_record(id).await
    }

    async fn list_consumption_records(
        &self,
        owner_id: Uuid,
        filter: &ConsumptionFilter,
    ) -> Result<Vec<ConsumptionRecord>, StoreError> {
        self.inner.list_consumption_records(owner_id, filter).await
    }
}
