use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::stock_record::FoodCategory;

/// One consumption event drawn against a stock record.
///
/// `item_name` and `category` are captured when the event is logged so the
/// history stays readable after the stock record changes or disappears.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub stock_record_id: Uuid,
    pub item_name: String,
    pub category: FoodCategory,
    pub quantity: i64,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConsumptionRecord {
    pub fn is_owned_by(&self, owner_id: Uuid) -> bool {
        self.owner_id == owner_id
    }

    /// The editable fields of this record, as a patch that writes them back unchanged.
    pub fn as_patch(&self) -> ConsumptionRecordPatch {
        ConsumptionRecordPatch {
            quantity: Some(self.quantity),
            date: Some(self.date),
            notes: Some(self.notes.clone()),
        }
    }
}

/// Fully resolved consumption record ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConsumptionRecord {
    pub owner_id: Uuid,
    pub stock_record_id: Uuid,
    pub item_name: String,
    pub category: FoodCategory,
    pub quantity: i64,
    pub date: DateTime<Utc>,
    pub notes: String,
}

/// Caller input for logging consumption.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LogConsumptionRequest {
    pub stock_record_id: Uuid,
    #[validate(range(min = 1, max = 1_000_000_000, message = "Quantity must be a positive integer"))]
    pub quantity: i64,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

/// Partial update of a consumption record. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ConsumptionRecordPatch {
    #[validate(range(min = 1, max = 1_000_000_000, message = "Quantity must be at least 1"))]
    pub quantity: Option<i64>,
    pub date: Option<DateTime<Utc>>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

impl ConsumptionRecordPatch {
    pub fn is_empty(&self) -> bool {
        self.quantity.is_none() && self.date.is_none() && self.notes.is_none()
    }

    pub fn apply_to(&self, record: &mut ConsumptionRecord) {
        if let Some(quantity) = self.quantity {
            record.quantity = quantity;
        }
        if let Some(date) = self.date {
            record.date = date;
        }
        if let Some(notes) = &self.notes {
            record.notes = notes.clone();
        }
    }
}

/// Query over one owner's consumption records. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumptionFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub category: Option<FoodCategory>,
    pub stock_record_id: Option<Uuid>,
}

impl ConsumptionFilter {
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        }
    }

    pub fn for_category(category: FoodCategory) -> Self {
        Self {
            category: Some(category),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &ConsumptionRecord) -> bool {
        self.from.map_or(true, |from| record.date >= from)
            && self.to.map_or(true, |to| record.date <= to)
            && self.category.map_or(true, |c| record.category == c)
            && self
                .stock_record_id
                .map_or(true, |id| record.stock_record_id == id)
    }
}
