use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal_macros::dec;
use tillbook::chart::ChartConfig;
use tillbook::engine::PostingEngine;
use tillbook::entries::momo_entries;
use tillbook::models::requests::{MomoPostingRequest, MomoTransactionType};
use tillbook::storage::InMemoryStorage;
use tillbook::validation::validate_balanced;

fn setup() -> PostingEngine {
    let engine = PostingEngine::new(Arc::new(InMemoryStorage::new()), ChartConfig::builtin());
    engine.bootstrap().unwrap();
    engine
}

fn request(id: u64) -> MomoPostingRequest {
    MomoPostingRequest {
        transaction_id: format!("bench-{}", id),
        transaction_type: MomoTransactionType::CashIn,
        amount: dec!(100.00),
        fee: dec!(5.00),
        provider: "MTN".to_string(),
        phone_number: "0244000000".to_string(),
        customer_name: "Bench".to_string(),
        reference: None,
        processed_by: "teller-1".to_string(),
        branch_id: "BR-01".to_string(),
    }
}

fn bench_entry_generation(c: &mut Criterion) {
    let chart = ChartConfig::builtin();
    let req = request(0);
    c.bench_function("momo_entry_generation", |b| {
        b.iter(|| momo_entries(black_box(&chart), black_box(&req)).unwrap())
    });
}

fn bench_validation(c: &mut Criterion) {
    let chart = ChartConfig::builtin();
    let entries = momo_entries(&chart, &request(0)).unwrap();
    c.bench_function("validate_balanced", |b| {
        b.iter(|| validate_balanced(black_box(&entries)).unwrap())
    });
}

fn bench_posting(c: &mut Criterion) {
    let engine = setup();
    let mut id = 0u64;
    c.bench_function("momo_posting", |b| {
        b.iter(|| {
            id += 1;
            engine.post_momo(black_box(&request(id)))
        })
    });
}

fn bench_replay(c: &mut Criterion) {
    let engine = setup();
    let req = request(0);
    engine.post_momo(&req);
    c.bench_function("momo_replay", |b| {
        b.iter(|| engine.post_momo(black_box(&req)))
    });
}

criterion_group!(
    benches,
    bench_entry_generation,
    bench_validation,
    bench_posting,
    bench_replay
);
criterion_main!(benches);
