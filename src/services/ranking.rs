use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::risk::{RiskAssessment, RiskScorer};
use crate::entities::StockRecord;

/// A stock record paired with its risk assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedStock {
    pub record: StockRecord,
    pub assessment: RiskAssessment,
}

impl RankedStock {
    pub fn score(&self) -> f64 {
        self.assessment.score
    }
}

/// Orders stock by risk of waste, highest first.
///
/// Ties on score fall back to the earliest expiry date and then to the
/// record id, so any input set has exactly one ranking.
#[derive(Debug, Clone, Copy)]
pub struct RankingService {
    scorer: RiskScorer,
}

impl RankingService {
    pub fn new(scorer: RiskScorer) -> Self {
        Self { scorer }
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    #[instrument(skip(self, records), fields(count = records.len(), as_of = %self.scorer.as_of()))]
    pub fn rank(&self, records: &[StockRecord]) -> Vec<RankedStock> {
        let mut ranked: Vec<RankedStock> = records
            .iter()
            .map(|record| RankedStock {
                assessment: self.scorer.assess(record),
                record: record.clone(),
            })
            .collect();

        ranked.sort_by(compare_ranked);

        metrics::histogram!("pantry.ranking.size", ranked.len() as f64);
        debug!(ranked = ranked.len(), "Ranked stock records");
        ranked
    }
}

fn compare_ranked(a: &RankedStock, b: &RankedStock) -> Ordering {
    b.assessment
        .score
        .total_cmp(&a.assessment.score)
        .then_with(|| a.record.expiry_date.cmp(&b.record.expiry_date))
        .then_with(|| a.record.id.cmp(&b.record.id))
}
