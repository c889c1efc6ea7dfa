use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::entities::{
    ConsumptionFilter, ConsumptionRecord, ConsumptionRecordPatch, NewConsumptionRecord,
    StockRecord, StockRecordPatch,
};

pub mod in_memory;

pub use in_memory::{InMemoryRepository, StoreSnapshot};

/// Failures raised by a store implementation.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
pub enum StoreError {
    #[error("{kind} record {id} does not exist")]
    RecordMissing { kind: &'static str, id: Uuid },

    #[error("stock record {id} changed concurrently (expected version {expected}, found {actual})")]
    VersionConflict { id: Uuid, expected: i64, actual: i64 },

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// True when a conditional write lost a race and a re-read may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::RecordMissing { kind: "stock", .. }
        )
    }
}

/// Storage of stock records.
///
/// Writes are atomic per record. A patch or delete carrying an expected
/// version must fail with [`StoreError::VersionConflict`] when the stored
/// record has moved on, and every successful write bumps the version.
#[async_trait]
pub trait StockRecordStore: Send + Sync {
    async fn get_stock_record(&self, id: Uuid) -> Result<Option<StockRecord>, StoreError>;

    async fn create_stock_record(&self, record: StockRecord) -> Result<StockRecord, StoreError>;

    async fn update_stock_record(
        &self,
        id: Uuid,
        patch: &StockRecordPatch,
    ) -> Result<StockRecord, StoreError>;

    async fn delete_stock_record(
        &self,
        id: Uuid,
        expected_version: Option<i64>,
    ) -> Result<(), StoreError>;

    async fn list_stock_records(&self, owner_id: Uuid) -> Result<Vec<StockRecord>, StoreError>;
}

/// Storage of consumption records.
#[async_trait]
pub trait ConsumptionRecordStore: Send + Sync {
    async fn get_consumption_record(
        &self,
        id: Uuid,
    ) -> Result<Option<ConsumptionRecord>, StoreError>;

    async fn create_consumption_record(
        &self,
        record: NewConsumptionRecord,
    ) -> Result<ConsumptionRecord, StoreError>;

    async fn update_consumption_record(
        &self,
        id: Uuid,
        patch: &ConsumptionRecordPatch,
    ) -> Result<ConsumptionRecord, StoreError>;

    async fn delete_consumption_record(&self, id: Uuid) -> Result<(), StoreError>;

    /// Records of one owner matching `filter`, newest first.
    async fn list_consumption_records(
        &self,
        owner_id: Uuid,
        filter: &ConsumptionFilter,
    ) -> Result<Vec<ConsumptionRecord>, StoreError>;
}

/// Everything the services need from a backing store.
pub trait PantryRepository: StockRecordStore + ConsumptionRecordStore {}

impl<T> PantryRepository for T where T: StockRecordStore + ConsumptionRecordStore {}
