use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::locks::StockLocks;
use super::ranking::{RankedStock, RankingService};
use super::risk::RiskScorer;
use crate::{
    config::InventoryConfig,
    entities::{FoodCategory, NewStockRecord, StockRecord, StockRecordPatch},
    errors::ServiceError,
    events::{publish, Event, EventSender},
    repositories::{PantryRepository, StoreError},
};

/// Stock totals for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockCategorySummary {
    pub category: FoodCategory,
    pub item_count: u64,
    pub total_quantity: i64,
    pub total_value: Decimal,
}

/// Service for managing an owner's stock records
#[derive(Clone)]
pub struct InventoryService {
    repo: Arc<dyn PantryRepository>,
    locks: StockLocks,
    settings: InventoryConfig,
    event_sender: Option<Arc<EventSender>>,
}

impl InventoryService {
    /// Creates a new inventory service instance
    pub fn new(
        repo: Arc<dyn PantryRepository>,
        settings: InventoryConfig,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            repo,
            locks: StockLocks::new(),
            settings,
            event_sender,
        }
    }

    /// Shares a lock registry with the consumption service so direct edits
    /// and reconciliation never interleave on one record.
    pub fn with_locks(mut self, locks: StockLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Adds a new stock record. The expiry date defaults to today plus `expiration_days`.
    #[instrument(skip(self, item), fields(owner_id = %owner_id, name = %item.name))]
    pub async fn add_item(
        &self,
        owner_id: Uuid,
        item: NewStockRecord,
    ) -> Result<StockRecord, ServiceError> {
        item.validate()?;

        let now = Utc::now();
        let expiry_date = item.resolved_expiry_date(now.date_naive()).ok_or_else(|| {
            ServiceError::ValidationError("Expiry date is out of range".to_string())
        })?;
        let record = StockRecord {
            id: Uuid::new_v4(),
            owner_id,
            name: item.name.trim().to_string(),
            category: item.category,
            quantity: item.quantity,
            expiration_days: item.expiration_days,
            expiry_date,
            unit_cost: item.unit_cost,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let created = self
            .repo
            .create_stock_record(record)
            .await
            .map_err(|e| store_failure("create stock record", e))?;

        info!(stock_record_id = %created.id, quantity = created.quantity, "Stock record added");
        publish(
            self.event_sender.as_deref(),
            Event::StockAdded {
                owner_id,
                stock_record_id: created.id,
                quantity: created.quantity,
            },
        )
        .await;

        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_item(&self, owner_id: Uuid, id: Uuid) -> Result<StockRecord, ServiceError> {
        self.repo
            .get_stock_record(id)
            .await
            .map_err(|e| store_failure("get stock record", e))?
            .filter(|record| record.is_owned_by(owner_id))
            .ok_or_else(|| ServiceError::stock_not_found(id))
    }

    /// All stock owned by `owner_id`, soonest expiry first.
    #[instrument(skip(self))]
    pub async fn list_items(&self, owner_id: Uuid) -> Result<Vec<StockRecord>, ServiceError> {
        self.repo
            .list_stock_records(owner_id)
            .await
            .map_err(|e| store_failure("list stock records", e))
    }

    /// Stock expiring within `threshold_days` of `as_of`, inclusive of both ends.
    ///
    /// Already expired records are not included.
    #[instrument(skip(self))]
    pub async fn expiring_items(
        &self,
        owner_id: Uuid,
        threshold_days: Option<i64>,
        as_of: NaiveDate,
    ) -> Result<Vec<StockRecord>, ServiceError> {
        let threshold = threshold_days.unwrap_or(self.settings.expiring_soon_days);
        if threshold < 0 {
            return Err(ServiceError::ValidationError(
                "Threshold days cannot be negative".to_string(),
            ));
        }
        let until = Duration::try_days(threshold)
            .and_then(|window| as_of.checked_add_signed(window))
            .ok_or_else(|| {
                ServiceError::ValidationError("Threshold days is out of range".to_string())
            })?;

        let mut items = self.list_items(owner_id).await?;
        items.retain(|record| record.expiry_date >= as_of && record.expiry_date <= until);
        Ok(items)
    }

    #[instrument(skip(self))]
    pub async fn items_by_category(
        &self,
        owner_id: Uuid,
        category: FoodCategory,
    ) -> Result<Vec<StockRecord>, ServiceError> {
        let mut items = self.list_items(owner_id).await?;
        items.retain(|record| record.category == category);
        Ok(items)
    }

    /// Edits a stock record in place. This is a direct correction by the
    /// owner, not a consumption, so no history is written.
    #[instrument(skip(self, patch), fields(owner_id = %owner_id, stock_record_id = %id))]
    pub async fn update_item(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: StockRecordPatch,
    ) -> Result<StockRecord, ServiceError> {
        patch.validate()?;
        let _guard = self.locks.acquire(id).await;
        let current = self.get_item(owner_id, id).await?;

        let patch = StockRecordPatch {
            expected_version: Some(current.version),
            ..patch
        };
        let updated = self
            .repo
            .update_stock_record(id, &patch)
            .await
            .map_err(|e| write_failure(id, e))?;

        info!(quantity = updated.quantity, version = updated.version, "Stock record updated");
        publish(
            self.event_sender.as_deref(),
            Event::StockUpdated {
                owner_id,
                stock_record_id: id,
            },
        )
        .await;

        Ok(updated)
    }

    /// Removes a stock record. Consumption history referencing it is kept.
    #[instrument(skip(self), fields(owner_id = %owner_id, stock_record_id = %id))]
    pub async fn delete_item(&self, owner_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        let _guard = self.locks.acquire(id).await;
        let current = self.get_item(owner_id, id).await?;

        self.repo
            .delete_stock_record(id, Some(current.version))
            .await
            .map_err(|e| write_failure(id, e))?;

        info!("Stock record deleted");
        publish(
            self.event_sender.as_deref(),
            Event::StockRemoved {
                owner_id,
                stock_record_id: id,
            },
        )
        .await;

        Ok(())
    }

    /// Item count, quantity and value per category, ordered by category.
    #[instrument(skip(self))]
    pub async fn summary(&self, owner_id: Uuid) -> Result<Vec<StockCategorySummary>, ServiceError> {
        let items = self.list_items(owner_id).await?;

        let mut totals: BTreeMap<FoodCategory, StockCategorySummary> = BTreeMap::new();
        for item in &items {
            let entry = totals
                .entry(item.category)
                .or_insert_with(|| StockCategorySummary {
                    category: item.category,
                    item_count: 0,
                    total_quantity: 0,
                    total_value: Decimal::ZERO,
                });
            entry.item_count += 1;
            entry.total_quantity = entry
                .total_quantity
                .checked_add(item.quantity)
                .ok_or_else(|| summary_overflow(item.category))?;
            entry.total_value = item
                .total_value()
                .and_then(|value| entry.total_value.checked_add(value))
                .ok_or_else(|| summary_overflow(item.category))?;
        }

        Ok(totals.into_values().collect())
    }

    /// Ranks the owner's stock by spoilage risk as of `as_of`.
    #[instrument(skip(self))]
    pub async fn risk_report(
        &self,
        owner_id: Uuid,
        as_of: NaiveDate,
    ) -> Result<Vec<RankedStock>, ServiceError> {
        let items = self.list_items(owner_id).await?;
        Ok(RankingService::new(RiskScorer::new(as_of)).rank(&items))
    }
}

fn store_failure(operation: &'static str, err: StoreError) -> ServiceError {
    error!(operation, error = %err, "Store operation failed");
    ServiceError::StoreFailure(err)
}

fn summary_overflow(category: FoodCategory) -> ServiceError {
    ServiceError::ValidationError(format!(
        "Totals for category {} exceed the supported range",
        category
    ))
}

fn write_failure(id: Uuid, err: StoreError) -> ServiceError {
    match err {
        StoreError::VersionConflict { .. } => ServiceError::ConcurrentModification(id),
        StoreError::RecordMissing { .. } => ServiceError::stock_not_found(id),
        other => store_failure("write stock record", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{InMemoryRepository, StockRecordStore};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn service() -> InventoryService {
        InventoryService::new(
            Arc::new(InMemoryRepository::new()),
            InventoryConfig::default(),
            None,
        )
    }

    fn item(name: &str, category: FoodCategory, quantity: i64, days: i64) -> NewStockRecord {
        NewStockRecord {
            name: name.to_string(),
            category,
            quantity,
            expiration_days: days,
            expiry_date: None,
            unit_cost: dec!(1.50),
        }
    }

    #[tokio::test]
    async fn add_item_derives_expiry_and_trims_name() {
        let svc = service();
        let owner = Uuid::new_v4();
        let created = svc
            .add_item(owner, item("  Milk  ", FoodCategory::Dairy, 2, 7))
            .await
            .unwrap();

        assert_eq!(created.name, "Milk");
        assert_eq!(created.version, 1);
        assert_eq!(
            created.expiry_date,
            Utc::now().date_naive() + Duration::days(7)
        );
    }

    #[tokio::test]
    async fn add_item_rejects_short_names_and_negative_cost() {
        let svc = service();
        let owner = Uuid::new_v4();

        let err = svc
            .add_item(owner, item(" M ", FoodCategory::Dairy, 2, 7))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));

        let mut costly = item("Milk", FoodCategory::Dairy, 2, 7);
        costly.unit_cost = dec!(-0.01);
        assert_matches!(
            svc.add_item(owner, costly).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn other_owners_cannot_see_or_edit_items() {
        let svc = service();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let created = svc
            .add_item(owner, item("Bread", FoodCategory::Bakery, 1, 3))
            .await
            .unwrap();

        assert!(svc.list_items(stranger).await.unwrap().is_empty());
        assert_matches!(
            svc.get_item(stranger, created.id).await,
            Err(ServiceError::NotFound(_))
        );
        assert_matches!(
            svc.delete_item(stranger, created.id).await,
            Err(ServiceError::NotFound(_))
        );
        assert!(svc.get_item(owner, created.id).await.is_ok());
    }

    #[tokio::test]
    async fn expiring_items_respects_window() {
        let svc = service();
        let owner = Uuid::new_v4();
        let today = Utc::now().date_naive();
        svc.add_item(owner, item("Yogurt", FoodCategory::Dairy, 1, 2))
            .await
            .unwrap();
        svc.add_item(owner, item("Rice", FoodCategory::Grains, 1, 60))
            .await
            .unwrap();

        let soon = svc.expiring_items(owner, None, today).await.unwrap();
        assert_eq!(soon.len(), 1);
        assert_eq!(soon[0].name, "Yogurt");

        let wide = svc.expiring_items(owner, Some(90), today).await.unwrap();
        assert_eq!(wide.len(), 2);
    }

    #[tokio::test]
    async fn summary_groups_by_category_with_value() {
        let svc = service();
        let owner = Uuid::new_v4();
        svc.add_item(owner, item("Apples", FoodCategory::Fruits, 4, 10))
            .await
            .unwrap();
        svc.add_item(owner, item("Pears", FoodCategory::Fruits, 2, 10))
            .await
            .unwrap();
        svc.add_item(owner, item("Cheese", FoodCategory::Dairy, 1, 20))
            .await
            .unwrap();

        let summary = svc.summary(owner).await.unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].category, FoodCategory::Dairy);
        assert_eq!(summary[1].item_count, 2);
        assert_eq!(summary[1].total_quantity, 6);
        assert_eq!(summary[1].total_value, dec!(9.00));
    }

    #[tokio::test]
    async fn out_of_range_dates_are_rejected() {
        let svc = service();
        let owner = Uuid::new_v4();

        let mut forever = item("Salt", FoodCategory::Condiments, 1, 7);
        forever.expiration_days = i64::MAX;
        assert_matches!(
            svc.add_item(owner, forever).await,
            Err(ServiceError::ValidationError(_))
        );

        svc.add_item(owner, item("Salt", FoodCategory::Condiments, 1, 7))
            .await
            .unwrap();
        let today = Utc::now().date_naive();
        assert_matches!(
            svc.expiring_items(owner, Some(1_000_000_000), today).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            svc.expiring_items(owner, Some(1), NaiveDate::MAX).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn summary_reports_overflowing_totals() {
        let repo = Arc::new(InMemoryRepository::new());
        let svc = InventoryService::new(repo.clone(), InventoryConfig::default(), None);
        let owner = Uuid::new_v4();
        let now = Utc::now();
        for _ in 0..2 {
            repo.create_stock_record(StockRecord {
                id: Uuid::new_v4(),
                owner_id: owner,
                name: "Rice".to_string(),
                category: FoodCategory::Grains,
                quantity: i64::MAX,
                expiration_days: 30,
                expiry_date: now.date_naive(),
                unit_cost: Decimal::ZERO,
                version: 0,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        }
        assert_matches!(
            svc.summary(owner).await,
            Err(ServiceError::ValidationError(_))
        );

        let pricey = Uuid::new_v4();
        repo.create_stock_record(StockRecord {
            id: Uuid::new_v4(),
            owner_id: pricey,
            name: "Saffron".to_string(),
            category: FoodCategory::Condiments,
            quantity: 2,
            expiration_days: 30,
            expiry_date: now.date_naive(),
            unit_cost: Decimal::MAX,
            version: 0,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
        assert_matches!(
            svc.summary(pricey).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn update_item_rejects_quantities_past_the_bound() {
        let svc = service();
        let owner = Uuid::new_v4();
        let created = svc
            .add_item(owner, item("Beans", FoodCategory::Protein, 5, 10))
            .await
            .unwrap();

        let patch = StockRecordPatch {
            quantity: Some(i64::MAX),
            ..Default::default()
        };
        assert_matches!(
            svc.update_item(owner, created.id, patch).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_eq!(svc.get_item(owner, created.id).await.unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn update_item_bumps_version() {
        let svc = service();
        let owner = Uuid::new_v4();
        let created = svc
            .add_item(owner, item("Carrots", FoodCategory::Vegetables, 5, 10))
            .await
            .unwrap();

        let patch = StockRecordPatch {
            quantity: Some(8),
            ..Default::default()
        };
        let updated = svc.update_item(owner, created.id, patch).await.unwrap();
        assert_eq!(updated.quantity, 8);
        assert_eq!(updated.version, created.version + 1);
    }
}
