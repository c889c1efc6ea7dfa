//! Spoilage-risk scoring.
//!
//! A score in `[0, 100]` is the weighted sum of three sub-scores:
//! expiry urgency (0.5), category perishability (0.3) and scarcity (0.2).
//! Scoring depends only on the record and the scorer's reference date.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::entities::{FoodCategory, StockRecord};

const EXPIRY_WEIGHT: f64 = 0.5;
const PERISHABILITY_WEIGHT: f64 = 0.3;
const SCARCITY_WEIGHT: f64 = 0.2;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Band lower bounds are inclusive: exactly 80 is critical, exactly 60 high, and so on.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            RiskLevel::Critical
        } else if score >= 60.0 {
            RiskLevel::High
        } else if score >= 40.0 {
            RiskLevel::Medium
        } else if score >= 20.0 {
            RiskLevel::Low
        } else {
            RiskLevel::Minimal
        }
    }

    pub fn recommended_action(&self, item_name: &str) -> String {
        match self {
            RiskLevel::Critical => format!("Consume {} immediately or dispose of it", item_name),
            RiskLevel::High => format!(
                "Prioritize consuming {} within the next 1-2 days",
                item_name
            ),
            RiskLevel::Medium => format!("Plan to consume {} within the next week", item_name),
            RiskLevel::Low => format!("{} is safe, consume within 2 weeks", item_name),
            RiskLevel::Minimal => format!("{} is fresh, no immediate action needed", item_name),
        }
    }
}

/// The unweighted sub-scores, each on a 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub expiry_urgency: f64,
    pub perishability: f64,
    pub scarcity: f64,
}

impl RiskFactors {
    fn weighted_total(&self) -> f64 {
        self.expiry_urgency * EXPIRY_WEIGHT
            + self.perishability * PERISHABILITY_WEIGHT
            + self.scarcity * SCARCITY_WEIGHT
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub stock_record_id: Uuid,
    pub item_name: String,
    pub category: FoodCategory,
    pub days_to_expiry: i64,
    pub score: f64,
    pub level: RiskLevel,
    pub factors: RiskFactors,
    pub recommended_action: String,
}

/// Step function over days remaining until expiry.
pub fn expiry_urgency(days_to_expiry: i64) -> f64 {
    match days_to_expiry {
        d if d <= 0 => 100.0,
        1 => 90.0,
        2..=3 => 75.0,
        4..=7 => 50.0,
        8..=14 => 25.0,
        _ => 10.0,
    }
}

/// Perishability coefficient in `[0, 1]`.
pub fn perishability(category: FoodCategory) -> f64 {
    match category {
        FoodCategory::Dairy => 0.90,
        FoodCategory::Protein => 0.85,
        FoodCategory::Vegetables => 0.80,
        FoodCategory::Fruits => 0.75,
        FoodCategory::Bakery => 0.70,
        FoodCategory::Beverages => 0.50,
        FoodCategory::Grains => 0.40,
        FoodCategory::Frozen => 0.35,
        FoodCategory::Condiments => 0.30,
        FoodCategory::Snacks => 0.25,
        FoodCategory::Other => 0.50,
    }
}

/// Fewer remaining units score higher. Quantities below one count as one.
pub fn scarcity(quantity: i64) -> f64 {
    let quantity = quantity.max(1) as f64;
    (1.0 / quantity).clamp(0.1, 1.0) * 100.0
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Scores stock records relative to a fixed reference date.
///
/// The scorer holds no mutable state, so one instance can be shared freely
/// and the same record always yields the same score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskScorer {
    as_of: NaiveDate,
}

impl RiskScorer {
    pub fn new(as_of: NaiveDate) -> Self {
        Self { as_of }
    }

    /// Scorer anchored at the current UTC date.
    pub fn today() -> Self {
        Self::new(Utc::now().date_naive())
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn factors(&self, record: &StockRecord) -> RiskFactors {
        RiskFactors {
            expiry_urgency: expiry_urgency(record.days_to_expiry(self.as_of)),
            perishability: perishability(record.category) * 100.0,
            scarcity: scarcity(record.quantity),
        }
    }

    pub fn score(&self, record: &StockRecord) -> f64 {
        round_to_tenth(self.factors(record).weighted_total()).clamp(0.0, 100.0)
    }

    pub fn assess(&self, record: &StockRecord) -> RiskAssessment {
        let factors = self.factors(record);
        let score = round_to_tenth(factors.weighted_total()).clamp(0.0, 100.0);
        let level = RiskLevel::from_score(score);
        RiskAssessment {
            stock_record_id: record.id,
            item_name: record.name.clone(),
            category: record.category,
            days_to_expiry: record.days_to_expiry(self.as_of),
            score,
            level,
            factors,
            recommended_action: level.recommended_action(&record.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;
    use rust_decimal::Decimal;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    fn record(category: FoodCategory, days: i64, quantity: i64) -> StockRecord {
        let now = Utc::now();
        StockRecord {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Item".to_string(),
            category,
            quantity,
            expiration_days: days.max(1),
            expiry_date: today() + Duration::days(days),
            unit_cost: Decimal::ONE,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[rstest]
    #[case(-3, 100.0)]
    #[case(0, 100.0)]
    #[case(1, 90.0)]
    #[case(2, 75.0)]
    #[case(3, 75.0)]
    #[case(4, 50.0)]
    #[case(7, 50.0)]
    #[case(8, 25.0)]
    #[case(14, 25.0)]
    #[case(15, 10.0)]
    #[case(365, 10.0)]
    fn expiry_urgency_steps(#[case] days: i64, #[case] expected: f64) {
        assert_eq!(expiry_urgency(days), expected);
    }

    #[rstest]
    #[case(80.0, RiskLevel::Critical)]
    #[case(79.9, RiskLevel::High)]
    #[case(60.0, RiskLevel::High)]
    #[case(59.9, RiskLevel::Medium)]
    #[case(40.0, RiskLevel::Medium)]
    #[case(20.0, RiskLevel::Low)]
    #[case(19.9, RiskLevel::Minimal)]
    #[case(0.0, RiskLevel::Minimal)]
    #[case(100.0, RiskLevel::Critical)]
    fn level_bands_are_inclusive_on_lower_bound(#[case] score: f64, #[case] expected: RiskLevel) {
        assert_eq!(RiskLevel::from_score(score), expected);
    }

    #[rstest]
    #[case(0, 100.0)]
    #[case(1, 100.0)]
    #[case(2, 50.0)]
    #[case(4, 25.0)]
    #[case(10, 10.0)]
    #[case(50, 10.0)]
    fn scarcity_is_bounded(#[case] quantity: i64, #[case] expected: f64) {
        assert!((scarcity(quantity) - expected).abs() < 1e-9);
    }

    #[test]
    fn expired_single_dairy_item_is_critical() {
        let scorer = RiskScorer::new(today());
        let assessment = scorer.assess(&record(FoodCategory::Dairy, 0, 1));
        // 100 * 0.5 + 90 * 0.3 + 100 * 0.2
        assert_eq!(assessment.score, 97.0);
        assert_eq!(assessment.level, RiskLevel::Critical);
        assert!(assessment.recommended_action.contains("immediately"));
    }

    #[test]
    fn plentiful_condiments_far_from_expiry_are_minimal() {
        let scorer = RiskScorer::new(today());
        let score = scorer.score(&record(FoodCategory::Condiments, 20, 50));
        // 10 * 0.5 + 30 * 0.3 + 10 * 0.2
        assert_eq!(score, 16.0);
        assert_eq!(RiskLevel::from_score(score), RiskLevel::Minimal);
    }

    #[test]
    fn score_is_rounded_to_one_decimal() {
        let scorer = RiskScorer::new(today());
        // 50 * 0.5 + 75 * 0.3 + (100/3) * 0.2 = 54.1666..
        let score = scorer.score(&record(FoodCategory::Fruits, 5, 3));
        assert_eq!(score, 54.2);
    }

    #[test]
    fn scoring_is_repeatable() {
        let scorer = RiskScorer::new(today());
        let item = record(FoodCategory::Bakery, 2, 3);
        let first = scorer.score(&item);
        for _ in 0..10 {
            assert_eq!(scorer.score(&item), first);
        }
    }

    #[test]
    fn risk_level_renders_in_screaming_case() {
        assert_eq!(RiskLevel::Critical.to_string(), "CRITICAL");
        assert_eq!(
            serde_json::to_string(&RiskLevel::Minimal).unwrap(),
            "\"MINIMAL\""
        );
    }
}
