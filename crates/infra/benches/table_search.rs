use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use basis_domains::parse_domain;
use basis_infra::{SearchOptions, Table};
use basis_parties::Partner;
use serde_json::json;

fn partners(count: usize) -> Table<Partner> {
    let table = Table::new();
    for i in 0..count {
        let partner = if i % 10 == 0 {
            Partner::company(format!("Company {i}"))
        } else {
            Partner::new(format!("Contact {i}")).with_email(format!("contact{i}@example.com"))
        };
        table.create(partner).unwrap();
    }
    table
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_search");
    let domain = parse_domain(&json!([
        "|",
        ["is_company", "=", true],
        ["email", "ilike", "7@example"]
    ]))
    .unwrap();
    let options = SearchOptions::default().with_order("name desc").with_limit(80);

    for size in [100usize, 1_000, 10_000] {
        let table = partners(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("search_read", size), &table, |b, table| {
            b.iter(|| black_box(table.search_read(&domain, &[], &options).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("search_count", size), &table, |b, table| {
            b.iter(|| black_box(table.search_count(&domain).unwrap()));
        });
    }
    group.finish();
}

fn bench_create(c: &mut Criterion) {
    c.bench_function("table_create_with_parent_check", |b| {
        let table = partners(1_000);
        b.iter(|| {
            table
                .create(Partner::new("Child").child_of(basis_core::RecordId::new(1)))
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_search, bench_create);
criterion_main!(benches);
