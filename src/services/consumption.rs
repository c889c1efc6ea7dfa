//! Consumption logging and stock reconciliation.
//!
//! Every quantity-affecting operation runs under the per-record lock of
//! the stock record it touches and writes stock with a version check, so
//! concurrent requests can neither overdraw a record nor be lost. The
//! store only guarantees single-record atomicity; the two writes of each
//! operation are ordered and compensated so a failure never leaves a
//! consumption record without its matching stock change.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::locks::StockLocks;
use crate::{
    config::ReconciliationConfig,
    entities::{
        ConsumptionFilter, ConsumptionRecord, ConsumptionRecordPatch, FoodCategory,
        LogConsumptionRequest, NewConsumptionRecord, StockRecord, StockRecordPatch,
    },
    errors::ServiceError,
    events::{publish, Event, EventSender},
    repositories::{PantryRepository, StoreError},
};

/// One page of consumption history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u32,
}

/// Consumption totals for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: FoodCategory,
    pub event_count: u64,
    pub total_quantity: i64,
}

/// Outcome of writing a new quantity to a stock record.
enum StockWrite {
    Updated(StockRecord),
    Depleted,
}

impl StockWrite {
    fn remaining(&self) -> i64 {
        match self {
            StockWrite::Updated(record) => record.quantity,
            StockWrite::Depleted => 0,
        }
    }
}

/// Service keeping stock quantities consistent with consumption history.
#[derive(Clone)]
pub struct ConsumptionService {
    repo: Arc<dyn PantryRepository>,
    locks: StockLocks,
    settings: ReconciliationConfig,
    event_sender: Option<Arc<EventSender>>,
}

impl ConsumptionService {
    /// Creates a new consumption service instance
    pub fn new(
        repo: Arc<dyn PantryRepository>,
        settings: ReconciliationConfig,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            repo,
            locks: StockLocks::new(),
            settings,
            event_sender,
        }
    }

    /// Shares a lock registry with other services writing the same store.
    pub fn with_locks(mut self, locks: StockLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Records consumption against a stock record and draws the quantity down.
    ///
    /// The stock record is deleted when the draw leaves exactly zero.
    #[instrument(skip(self, request), fields(owner_id = %owner_id, stock_record_id = %request.stock_record_id, quantity = request.quantity))]
    pub async fn log_consumption(
        &self,
        owner_id: Uuid,
        request: LogConsumptionRequest,
    ) -> Result<ConsumptionRecord, ServiceError> {
        let result = self.log_consumption_locked(owner_id, request).await;
        record_outcome("log", &result);
        result
    }

    async fn log_consumption_locked(
        &self,
        owner_id: Uuid,
        request: LogConsumptionRequest,
    ) -> Result<ConsumptionRecord, ServiceError> {
        request.validate()?;
        let _guard = self.locks.acquire(request.stock_record_id).await;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let stock = self.owned_stock(owner_id, request.stock_record_id).await?;

            if request.quantity > stock.quantity {
                return Err(ServiceError::InsufficientStock {
                    available: stock.quantity,
                    requested: request.quantity,
                });
            }

            let log = self
                .repo
                .create_consumption_record(NewConsumptionRecord {
                    owner_id,
                    stock_record_id: stock.id,
                    item_name: stock.name.clone(),
                    category: stock.category,
                    quantity: request.quantity,
                    date: request.date.unwrap_or_else(Utc::now),
                    notes: request.notes.clone().unwrap_or_default(),
                })
                .await
                .map_err(|e| store_failure("create consumption record", e))?;

            let write = match self
                .write_stock_quantity(&stock, stock.quantity - request.quantity)
                .await
            {
                Ok(write) => write,
                Err(e) => {
                    if let Err(undo) = self.repo.delete_consumption_record(log.id).await {
                        error!(
                            consumption_id = %log.id,
                            stock_record_id = %stock.id,
                            error = %undo,
                            "Failed to remove consumption record after stock write failed; records are inconsistent"
                        );
                    }
                    self.retry_or_fail(&e, stock.id, attempt)?;
                    continue;
                }
            };

            let remaining = write.remaining();
            info!(
                consumption_id = %log.id,
                stock_record_id = %stock.id,
                remaining,
                "Consumption logged"
            );
            metrics::counter!("pantry.consumption.logged", 1);
            self.publish_stock_write(owner_id, stock.id, &write).await;
            publish(
                self.event_sender.as_deref(),
                Event::ConsumptionLogged {
                    owner_id,
                    consumption_id: log.id,
                    stock_record_id: stock.id,
                    quantity: log.quantity,
                    remaining,
                    at: log.date,
                },
            )
            .await;

            return Ok(log);
        }
    }

    /// Edits a consumption record, applying any quantity change to its stock record.
    ///
    /// Edits that leave the quantity unchanged do not touch stock and are
    /// allowed even when the stock record no longer exists. Quantity edits
    /// against a missing stock record fail with `NotFound`.
    #[instrument(skip(self, patch), fields(owner_id = %owner_id, consumption_id = %log_id))]
    pub async fn update_consumption(
        &self,
        owner_id: Uuid,
        log_id: Uuid,
        patch: ConsumptionRecordPatch,
    ) -> Result<ConsumptionRecord, ServiceError> {
        let result = self.update_consumption_locked(owner_id, log_id, patch).await;
        record_outcome("update", &result);
        result
    }

    async fn update_consumption_locked(
        &self,
        owner_id: Uuid,
        log_id: Uuid,
        patch: ConsumptionRecordPatch,
    ) -> Result<ConsumptionRecord, ServiceError> {
        patch.validate()?;
        let log = self.owned_log(owner_id, log_id).await?;
        // A log never moves to another stock record, so this lock stays the right one.
        let _guard = self.locks.acquire(log.stock_record_id).await;
        let mut attempt = 0;

        loop {
            attempt += 1;
            // Re-read under the lock: a concurrent edit may have changed the quantity.
            let log = self.owned_log(owner_id, log_id).await?;

            if patch.quantity.map_or(true, |q| q == log.quantity) {
                let unchanged_quantity = ConsumptionRecordPatch {
                    quantity: None,
                    ..patch.clone()
                };
                let updated = self
                    .repo
                    .update_consumption_record(log_id, &unchanged_quantity)
                    .await
                    .map_err(|e| store_failure("update consumption record", e))?;
                self.publish_update(owner_id, &log, &updated).await;
                return Ok(updated);
            }

            let stock = self
                .owned_stock(owner_id, log.stock_record_id)
                .await
                .map_err(|e| match e {
                    ServiceError::NotFound(_) => ServiceError::NotFound(format!(
                        "Associated stock record {} not found",
                        log.stock_record_id
                    )),
                    other => other,
                })?;

            let new_quantity = patch.quantity.unwrap_or(log.quantity);
            let diff = new_quantity - log.quantity;
            if diff > 0 && diff > stock.quantity {
                return Err(ServiceError::InsufficientStock {
                    available: stock.quantity,
                    requested: diff,
                });
            }
            let remaining = stock
                .quantity
                .checked_sub(diff)
                .ok_or_else(|| quantity_overflow(stock.id))?;

            let updated = self
                .repo
                .update_consumption_record(log_id, &patch)
                .await
                .map_err(|e| store_failure("update consumption record", e))?;

            let write = match self.write_stock_quantity(&stock, remaining).await {
                Ok(write) => write,
                Err(e) => {
                    if let Err(undo) = self
                        .repo
                        .update_consumption_record(log_id, &log.as_patch())
                        .await
                    {
                        error!(
                            consumption_id = %log_id,
                            stock_record_id = %stock.id,
                            error = %undo,
                            "Failed to revert consumption record after stock write failed; records are inconsistent"
                        );
                    }
                    self.retry_or_fail(&e, stock.id, attempt)?;
                    continue;
                }
            };

            info!(
                consumption_id = %log_id,
                stock_record_id = %stock.id,
                old_quantity = log.quantity,
                new_quantity,
                remaining = write.remaining(),
                "Consumption updated"
            );
            self.publish_stock_write(owner_id, stock.id, &write).await;
            self.publish_update(owner_id, &log, &updated).await;
            return Ok(updated);
        }
    }

    /// Deletes a consumption record and returns its quantity to stock.
    ///
    /// When the stock record no longer exists the consumption record is still
    /// deleted and nothing is restored.
    #[instrument(skip(self), fields(owner_id = %owner_id, consumption_id = %log_id))]
    pub async fn delete_consumption(&self, owner_id: Uuid, log_id: Uuid) -> Result<(), ServiceError> {
        let result = self.delete_consumption_locked(owner_id, log_id).await;
        record_outcome("delete", &result);
        result
    }

    async fn delete_consumption_locked(
        &self,
        owner_id: Uuid,
        log_id: Uuid,
    ) -> Result<(), ServiceError> {
        let log = self.owned_log(owner_id, log_id).await?;
        let _guard = self.locks.acquire(log.stock_record_id).await;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let log = self.owned_log(owner_id, log_id).await?;
            let stock = self
                .repo
                .get_stock_record(log.stock_record_id)
                .await
                .map_err(|e| store_failure("get stock record", e))?
                .filter(|stock| stock.is_owned_by(owner_id));

            let Some(stock) = stock else {
                self.repo
                    .delete_consumption_record(log_id)
                    .await
                    .map_err(|e| store_failure("delete consumption record", e))?;
                warn!(
                    consumption_id = %log_id,
                    stock_record_id = %log.stock_record_id,
                    "Stock record no longer exists; consumption deleted without restoring stock"
                );
                metrics::counter!("pantry.consumption.deleted", 1, "restored" => "false");
                publish(
                    self.event_sender.as_deref(),
                    Event::ConsumptionDeleted {
                        owner_id,
                        consumption_id: log_id,
                        stock_restored: false,
                    },
                )
                .await;
                return Ok(());
            };

            let restored_quantity = stock
                .quantity
                .checked_add(log.quantity)
                .ok_or_else(|| quantity_overflow(stock.id))?;
            let restored = match self
                .repo
                .update_stock_record(
                    stock.id,
                    &StockRecordPatch::quantity_at_version(restored_quantity, stock.version),
                )
                .await
            {
                Ok(restored) => restored,
                Err(e) => {
                    self.retry_or_fail(&e, stock.id, attempt)?;
                    continue;
                }
            };

            if let Err(e) = self.repo.delete_consumption_record(log_id).await {
                let undo = StockRecordPatch::quantity_at_version(stock.quantity, restored.version);
                if let Err(undo_err) = self.repo.update_stock_record(stock.id, &undo).await {
                    error!(
                        consumption_id = %log_id,
                        stock_record_id = %stock.id,
                        error = %undo_err,
                        "Failed to take back restored stock after consumption delete failed; records are inconsistent"
                    );
                }
                return Err(store_failure("delete consumption record", e));
            }

            info!(
                consumption_id = %log_id,
                stock_record_id = %stock.id,
                restored = log.quantity,
                new_quantity = restored.quantity,
                "Consumption deleted and stock restored"
            );
            metrics::counter!("pantry.consumption.deleted", 1, "restored" => "true");
            publish(
                self.event_sender.as_deref(),
                Event::StockRestored {
                    owner_id,
                    stock_record_id: stock.id,
                    restored_quantity: log.quantity,
                    new_quantity: restored.quantity,
                },
            )
            .await;
            publish(
                self.event_sender.as_deref(),
                Event::ConsumptionDeleted {
                    owner_id,
                    consumption_id: log_id,
                    stock_restored: true,
                },
            )
            .await;
            return Ok(());
        }
    }

    /// Retrieves one consumption record owned by `owner_id`.
    #[instrument(skip(self))]
    pub async fn get_consumption(
        &self,
        owner_id: Uuid,
        log_id: Uuid,
    ) -> Result<ConsumptionRecord, ServiceError> {
        self.owned_log(owner_id, log_id).await
    }

    /// Consumption history, newest first, one page at a time.
    #[instrument(skip(self))]
    pub async fn get_history(
        &self,
        owner_id: Uuid,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Page<ConsumptionRecord>, ServiceError> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(self.settings.default_page_size);
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "Page must be at least 1".to_string(),
            ));
        }
        if limit == 0 || limit > self.settings.max_page_size {
            return Err(ServiceError::ValidationError(format!(
                "Limit must be between 1 and {}",
                self.settings.max_page_size
            )));
        }

        let all = self.list(owner_id, &ConsumptionFilter::default()).await?;
        let total = all.len() as u64;
        let pages = total.div_ceil(u64::from(limit)) as u32;
        let skip = (page as usize - 1).saturating_mul(limit as usize);
        let items = all.into_iter().skip(skip).take(limit as usize).collect();

        Ok(Page {
            items,
            total,
            page,
            limit,
            pages,
        })
    }

    /// Most recent consumption records, newest first.
    #[instrument(skip(self))]
    pub async fn get_recent(
        &self,
        owner_id: Uuid,
        limit: Option<u32>,
    ) -> Result<Vec<ConsumptionRecord>, ServiceError> {
        let limit = limit.unwrap_or(self.settings.recent_limit) as usize;
        let mut records = self.list(owner_id, &ConsumptionFilter::default()).await?;
        records.truncate(limit);
        Ok(records)
    }

    /// Consumption records dated within `[start, end]`, newest first.
    #[instrument(skip(self))]
    pub async fn get_by_date_range(
        &self,
        owner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ConsumptionRecord>, ServiceError> {
        if start > end {
            return Err(ServiceError::ValidationError(
                "Start date must not be after end date".to_string(),
            ));
        }
        self.list(owner_id, &ConsumptionFilter::between(start, end))
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_by_category(
        &self,
        owner_id: Uuid,
        category: FoodCategory,
    ) -> Result<Vec<ConsumptionRecord>, ServiceError> {
        self.list(owner_id, &ConsumptionFilter::for_category(category))
            .await
    }

    /// Event count and total quantity per category, ordered by category.
    #[instrument(skip(self))]
    pub async fn get_summary(&self, owner_id: Uuid) -> Result<Vec<CategorySummary>, ServiceError> {
        let records = self.list(owner_id, &ConsumptionFilter::default()).await?;

        let mut totals: BTreeMap<FoodCategory, (u64, i64)> = BTreeMap::new();
        for record in &records {
            let entry = totals.entry(record.category).or_default();
            entry.0 += 1;
            entry.1 += record.quantity;
        }

        Ok(totals
            .into_iter()
            .map(|(category, (event_count, total_quantity))| CategorySummary {
                category,
                event_count,
                total_quantity,
            })
            .collect())
    }

    async fn list(
        &self,
        owner_id: Uuid,
        filter: &ConsumptionFilter,
    ) -> Result<Vec<ConsumptionRecord>, ServiceError> {
        self.repo
            .list_consumption_records(owner_id, filter)
            .await
            .map_err(|e| store_failure("list consumption records", e))
    }

    async fn owned_stock(&self, owner_id: Uuid, id: Uuid) -> Result<StockRecord, ServiceError> {
        self.repo
            .get_stock_record(id)
            .await
            .map_err(|e| store_failure("get stock record", e))?
            .filter(|stock| stock.is_owned_by(owner_id))
            .ok_or_else(|| ServiceError::stock_not_found(id))
    }

    async fn owned_log(&self, owner_id: Uuid, id: Uuid) -> Result<ConsumptionRecord, ServiceError> {
        self.repo
            .get_consumption_record(id)
            .await
            .map_err(|e| store_failure("get consumption record", e))?
            .filter(|log| log.is_owned_by(owner_id))
            .ok_or_else(|| ServiceError::consumption_not_found(id))
    }

    /// Conditionally writes `new_quantity`, deleting the record at exactly zero.
    async fn write_stock_quantity(
        &self,
        stock: &StockRecord,
        new_quantity: i64,
    ) -> Result<StockWrite, StoreError> {
        if new_quantity == 0 {
            self.repo
                .delete_stock_record(stock.id, Some(stock.version))
                .await?;
            Ok(StockWrite::Depleted)
        } else {
            let patch = StockRecordPatch::quantity_at_version(new_quantity, stock.version);
            let updated = self.repo.update_stock_record(stock.id, &patch).await?;
            Ok(StockWrite::Updated(updated))
        }
    }

    /// Decides whether a failed stock write is retried. Returns `Ok(())` to retry.
    fn retry_or_fail(&self, err: &StoreError, stock_id: Uuid, attempt: u32) -> Result<(), ServiceError> {
        if !err.is_conflict() {
            return Err(store_failure("write stock record", err.clone()));
        }
        metrics::counter!("pantry.reconciliation.conflicts", 1);
        if attempt >= self.settings.max_conflict_retries {
            warn!(stock_record_id = %stock_id, attempt, "Giving up after repeated stock write conflicts");
            return Err(ServiceError::ConcurrentModification(stock_id));
        }
        warn!(stock_record_id = %stock_id, attempt, error = %err, "Stock record changed concurrently, retrying");
        Ok(())
    }

    async fn publish_stock_write(&self, owner_id: Uuid, stock_record_id: Uuid, write: &StockWrite) {
        match write {
            StockWrite::Depleted => {
                metrics::counter!("pantry.stock.depleted", 1);
                info!(stock_record_id = %stock_record_id, "Stock fully consumed, record removed");
                publish(
                    self.event_sender.as_deref(),
                    Event::StockDepleted {
                        owner_id,
                        stock_record_id,
                    },
                )
                .await;
            }
            StockWrite::Updated(_) => {
                publish(
                    self.event_sender.as_deref(),
                    Event::StockUpdated {
                        owner_id,
                        stock_record_id,
                    },
                )
                .await;
            }
        }
    }

    async fn publish_update(
        &self,
        owner_id: Uuid,
        before: &ConsumptionRecord,
        after: &ConsumptionRecord,
    ) {
        metrics::counter!("pantry.consumption.updated", 1);
        publish(
            self.event_sender.as_deref(),
            Event::ConsumptionUpdated {
                owner_id,
                consumption_id: after.id,
                old_quantity: before.quantity,
                new_quantity: after.quantity,
            },
        )
        .await;
    }
}

fn store_failure(operation: &'static str, err: StoreError) -> ServiceError {
    error!(operation, error = %err, "Store operation failed");
    ServiceError::StoreFailure(err)
}

fn quantity_overflow(stock_record_id: Uuid) -> ServiceError {
    ServiceError::ValidationError(format!(
        "Quantity of stock record {} would exceed the supported range",
        stock_record_id
    ))
}

fn record_outcome<T>(operation: &'static str, result: &Result<T, ServiceError>) {
    if let Err(e) = result {
        metrics::counter!(
            "pantry.reconciliation.failures",
            1,
            "operation" => operation,
            "kind" => e.kind()
        );
    }
}
