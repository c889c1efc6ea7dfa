use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use pantry_ledger::{
    config::ReconciliationConfig,
    entities::{FoodCategory, LogConsumptionRequest, StockRecord},
    repositories::{InMemoryRepository, StockRecordStore},
    services::{ConsumptionService, RankingService, RiskScorer},
};
use rust_decimal::Decimal;
use strum::IntoEnumIterator;
use uuid::Uuid;

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
}

fn pantry(size: usize) -> Vec<StockRecord> {
    let categories: Vec<FoodCategory> = FoodCategory::iter().collect();
    let now = Utc::now();
    (0..size)
        .map(|i| StockRecord {
            id: Uuid::from_u128(i as u128),
            owner_id: Uuid::nil(),
            name: format!("item-{}", i),
            category: categories[i % categories.len()],
            quantity: (i % 12) as i64,
            expiration_days: 1,
            expiry_date: as_of() + chrono::Duration::days((i % 30) as i64 - 3),
            unit_cost: Decimal::ONE,
            version: 1,
            created_at: now,
            updated_at: now,
        })
        .collect()
}

// Ranking cost as the pantry grows
fn ranking_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank");
    let service = RankingService::new(RiskScorer::new(as_of()));

    for size in [10, 100, 1_000, 10_000].iter() {
        let records = pantry(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| black_box(service.rank(black_box(records))));
        });
    }

    group.finish();
}

fn scoring_benchmark(c: &mut Criterion) {
    let scorer = RiskScorer::new(as_of());
    let record = pantry(1).remove(0);

    c.bench_function("risk_score", |b| {
        b.iter(|| black_box(scorer.score(black_box(&record))));
    });
}

// Log-then-delete round on one record, including locking and versioned writes
fn reconciliation_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let repo = Arc::new(InMemoryRepository::new());
    let mut seed = pantry(1).remove(0);
    seed.quantity = 1_000;
    let stock = rt.block_on(repo.create_stock_record(seed)).unwrap();
    let service = ConsumptionService::new(repo, ReconciliationConfig::default(), None);
    let service = &service;
    let stock_id = stock.id;

    c.bench_function("log_and_delete_consumption", |b| {
        b.to_async(&rt).iter(|| async move {
            let log = service
                .log_consumption(
                    Uuid::nil(),
                    LogConsumptionRequest {
                        stock_record_id: stock_id,
                        quantity: 1,
                        date: None,
                        notes: None,
                    },
                )
                .await
                .unwrap();
            service.delete_consumption(Uuid::nil(), log.id).await.unwrap();
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(100);
    targets =
        ranking_benchmark,
        scoring_benchmark,
        reconciliation_benchmark
}

criterion_main!(benches);
