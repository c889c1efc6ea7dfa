use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Food categories a stock record may belong to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum FoodCategory {
    Dairy,
    Vegetables,
    Fruits,
    Grains,
    Protein,
    Bakery,
    Beverages,
    Condiments,
    Frozen,
    Snacks,
    Other,
}

/// One tracked quantity of a food item owned by an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub category: FoodCategory,
    pub quantity: i64,
    /// Shelf life in days as originally declared when the item was added.
    pub expiration_days: i64,
    pub expiry_date: NaiveDate,
    pub unit_cost: Decimal,
    /// Bumped by the store on every write; used for optimistic concurrency.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// Whole days from `as_of` until the expiry date. Negative once expired.
    pub fn days_to_expiry(&self, as_of: NaiveDate) -> i64 {
        (self.expiry_date - as_of).num_days()
    }

    /// Quantity times unit cost, or `None` when the product leaves the decimal range.
    pub fn total_value(&self) -> Option<Decimal> {
        self.unit_cost.checked_mul(Decimal::from(self.quantity))
    }

    pub fn is_owned_by(&self, owner_id: Uuid) -> bool {
        self.owner_id == owner_id
    }
}

/// Input for the "add to stock" action.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewStockRecord {
    #[validate(custom = "validate_item_name")]
    pub name: String,
    pub category: FoodCategory,
    #[validate(range(min = 0, max = 1_000_000_000, message = "Quantity must be between 0 and 1000000000"))]
    pub quantity: i64,
    #[validate(range(min = 1, max = 36_500, message = "Expiration days must be between 1 and 36500"))]
    pub expiration_days: i64,
    /// Derived from `expiration_days` when absent.
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[validate(custom = "validate_unit_cost")]
    pub unit_cost: Decimal,
}

impl NewStockRecord {
    /// The explicit expiry date, else `as_of` plus the shelf life.
    /// `None` when the derived date falls outside the calendar range.
    pub fn resolved_expiry_date(&self, as_of: NaiveDate) -> Option<NaiveDate> {
        match self.expiry_date {
            Some(date) => Some(date),
            None => Duration::try_days(self.expiration_days)
                .and_then(|shelf_life| as_of.checked_add_signed(shelf_life)),
        }
    }
}

/// Partial update of a stock record. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct StockRecordPatch {
    #[validate(custom = "validate_item_name")]
    pub name: Option<String>,
    pub category: Option<FoodCategory>,
    #[validate(range(min = 0, max = 1_000_000_000, message = "Quantity must be between 0 and 1000000000"))]
    pub quantity: Option<i64>,
    #[validate(range(min = 1, max = 36_500, message = "Expiration days must be between 1 and 36500"))]
    pub expiration_days: Option<i64>,
    pub expiry_date: Option<NaiveDate>,
    #[validate(custom = "validate_unit_cost")]
    pub unit_cost: Option<Decimal>,
    /// When set, the store rejects the write unless the record is still at this version.
    #[serde(skip)]
    pub expected_version: Option<i64>,
}

impl StockRecordPatch {
    /// Conditional quantity write used by reconciliation.
    pub fn quantity_at_version(quantity: i64, expected_version: i64) -> Self {
        Self {
            quantity: Some(quantity),
            expected_version: Some(expected_version),
            ..Default::default()
        }
    }

    /// Applies the present fields to `record`. Does not touch the version.
    pub fn apply_to(&self, record: &mut StockRecord) {
        if let Some(name) = &self.name {
            record.name = name.trim().to_string();
        }
        if let Some(category) = self.category {
            record.category = category;
        }
        if let Some(quantity) = self.quantity {
            record.quantity = quantity;
        }
        if let Some(days) = self.expiration_days {
            record.expiration_days = days;
        }
        if let Some(expiry_date) = self.expiry_date {
            record.expiry_date = expiry_date;
        }
        if let Some(unit_cost) = self.unit_cost {
            record.unit_cost = unit_cost;
        }
    }
}

fn validate_item_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().chars().count() < 2 {
        let mut err = ValidationError::new("name");
        err.message = Some("Item name must be at least 2 characters".into());
        return Err(err);
    }
    Ok(())
}

fn validate_unit_cost(cost: &Decimal) -> Result<(), ValidationError> {
    if *cost < Decimal::ZERO {
        let mut err = ValidationError::new("unit_cost");
        err.message = Some("Cost cannot be negative".into());
        return Err(err);
    }
    Ok(())
}
