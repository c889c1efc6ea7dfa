use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{ConsumptionRecordStore, StockRecordStore, StoreError};
use crate::entities::{
    ConsumptionFilter, ConsumptionRecord, ConsumptionRecordPatch, NewConsumptionRecord,
    StockRecord, StockRecordPatch,
};

/// Serializable image of an [`InMemoryRepository`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub stock_records: Vec<StockRecord>,
    #[serde(default)]
    pub consumption_records: Vec<ConsumptionRecord>,
}

impl StoreSnapshot {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        std::fs::write(path, raw)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))
    }
}

/// Process-local store backed by concurrent maps.
///
/// Every write takes the shard lock of its record, which gives the
/// single-record atomicity and versioned compare-and-swap the services
/// rely on.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    stock: DashMap<Uuid, StockRecord>,
    consumption: DashMap<Uuid, ConsumptionRecord>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let repo = Self::new();
        for record in snapshot.stock_records {
            repo.stock.insert(record.id, record);
        }
        for record in snapshot.consumption_records {
            repo.consumption.insert(record.id, record);
        }
        repo
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let mut stock_records: Vec<StockRecord> =
            self.stock.iter().map(|r| r.value().clone()).collect();
        stock_records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut consumption_records: Vec<ConsumptionRecord> =
            self.consumption.iter().map(|r| r.value().clone()).collect();
        consumption_records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        StoreSnapshot {
            stock_records,
            consumption_records,
        }
    }

    pub fn stock_len(&self) -> usize {
        self.stock.len()
    }

    pub fn consumption_len(&self) -> usize {
        self.consumption.len()
    }
}

#[async_trait]
impl StockRecordStore for InMemoryRepository {
    async fn get_stock_record(&self, id: Uuid) -> Result<Option<StockRecord>, StoreError> {
        Ok(self.stock.get(&id).map(|r| r.value().clone()))
    }

    async fn create_stock_record(&self, mut record: StockRecord) -> Result<StockRecord, StoreError> {
        match self.stock.entry(record.id) {
            Entry::Occupied(_) => Err(StoreError::Constraint(format!(
                "stock record {} already exists",
                record.id
            ))),
            Entry::Vacant(slot) => {
                record.version = 1;
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn update_stock_record(
        &self,
        id: Uuid,
        patch: &StockRecordPatch,
    ) -> Result<StockRecord, StoreError> {
        let mut entry = self
            .stock
            .get_mut(&id)
            .ok_or(StoreError::RecordMissing { kind: "stock", id })?;

        if let Some(expected) = patch.expected_version {
            if entry.version != expected {
                return Err(StoreError::VersionConflict {
                    id,
                    expected,
                    actual: entry.version,
                });
            }
        }
        if matches!(patch.quantity, Some(q) if q < 0) {
            return Err(StoreError::Constraint(format!(
                "stock record {} quantity cannot be negative",
                id
            )));
        }

        patch.apply_to(&mut *entry);
        entry.version += 1;
        entry.updated_at = Utc::now();
        debug!(stock_record_id = %id, version = entry.version, "stock record updated");
        Ok(entry.value().clone())
    }

    async fn delete_stock_record(
        &self,
        id: Uuid,
        expected_version: Option<i64>,
    ) -> Result<(), StoreError> {
        let removed = self
            .stock
            .remove_if(&id, |_, record| {
                expected_version.map_or(true, |v| record.version == v)
            });

        match removed {
            Some(_) => Ok(()),
            None => match (self.stock.get(&id), expected_version) {
                (Some(current), Some(expected)) => Err(StoreError::VersionConflict {
                    id,
                    expected,
                    actual: current.version,
                }),
                _ => Err(StoreError::RecordMissing { kind: "stock", id }),
            },
        }
    }

    async fn list_stock_records(&self, owner_id: Uuid) -> Result<Vec<StockRecord>, StoreError> {
        let mut records: Vec<StockRecord> = self
            .stock
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| a.expiry_date.cmp(&b.expiry_date).then(a.id.cmp(&b.id)));
        Ok(records)
    }
}

#[async_trait]
impl ConsumptionRecordStore for InMemoryRepository {
    async fn get_consumption_record(
        &self,
        id: Uuid,
    ) -> Result<Option<ConsumptionRecord>, StoreError> {
        Ok(self.consumption.get(&id).map(|r| r.value().clone()))
    }

    async fn create_consumption_record(
        &self,
        record: NewConsumptionRecord,
    ) -> Result<ConsumptionRecord, StoreError> {
        let now = Utc::now();
        let created = ConsumptionRecord {
            id: Uuid::new_v4(),
            owner_id: record.owner_id,
            stock_record_id: record.stock_record_id,
            item_name: record.item_name,
            category: record.category,
            quantity: record.quantity,
            date: record.date,
            notes: record.notes,
            created_at: now,
            updated_at: now,
        };
        self.consumption.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_consumption_record(
        &self,
        id: Uuid,
        patch: &ConsumptionRecordPatch,
    ) -> Result<ConsumptionRecord, StoreError> {
        let mut entry = self
            .consumption
            .get_mut(&id)
            .ok_or(StoreError::RecordMissing {
                kind: "consumption",
                id,
            })?;
        patch.apply_to(&mut *entry);
        entry.updated_at = Utc::now();
        Ok(entry.value().clone())
    }

    async fn delete_consumption_record(&self, id: Uuid) -> Result<(), StoreError> {
        self.consumption
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::RecordMissing {
                kind: "consumption",
                id,
            })
    }

    async fn list_consumption_records(
        &self,
        owner_id: Uuid,
        filter: &ConsumptionFilter,
    ) -> Result<Vec<ConsumptionRecord>, StoreError> {
        let mut records: Vec<ConsumptionRecord> = self
            .consumption
            .iter()
            .filter(|r| r.owner_id == owner_id && filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| b.date.cmp(&a.date).then(a.id.cmp(&b.id)));
        Ok(records)
    }
}
