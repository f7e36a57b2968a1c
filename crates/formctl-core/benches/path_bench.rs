use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use formctl_core::path::{get, set, unset};
use formctl_core::{Tree, Value, diff_values};

fn nested_form(rows: usize) -> Value {
    Value::object([
        ("profile", Value::object([
            ("name", Value::from("ada")),
            ("email", Value::from("ada@example.com")),
        ])),
        ("items", Value::array((0..rows).map(|i| {
            Value::object([
                ("sku", Value::from(format!("sku-{i}"))),
                ("qty", Value::from(i)),
            ])
        }))),
    ])
}

fn bench_get_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_get_set");
    for rows in [10usize, 100, 1000] {
        let form = nested_form(rows);
        let last = format!("items.{}.qty", rows - 1);
        group.bench_function(BenchmarkId::new("get_last_item", rows), |b| {
            b.iter(|| black_box(get(&form, black_box(&last))));
        });
        group.bench_function(BenchmarkId::new("set_then_unset", rows), |b| {
            let mut form = form.clone();
            b.iter(|| {
                set(&mut form, "items.0.note", Value::from("x"));
                black_box(unset(&mut form, "items.0.note"));
            });
        });
    }
    group.finish();
}

fn bench_bookkeeping(c: &mut Criterion) {
    let mut group = c.benchmark_group("bookkeeping");
    for rows in [10usize, 100, 1000] {
        let baseline = nested_form(rows);
        let mut current = baseline.clone();
        set(&mut current, "items.3.qty", Value::from(-1));
        group.bench_function(BenchmarkId::new("diff_values", rows), |b| {
            b.iter(|| black_box(diff_values(&baseline, &current)));
        });
        group.bench_function(BenchmarkId::new("dirty_tree_writes", rows), |b| {
            b.iter(|| {
                let mut dirty = Tree::new();
                for i in 0..rows {
                    set(&mut dirty, &format!("items.{i}.qty"), Tree::Leaf(true));
                }
                black_box(dirty)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_get_set, bench_bookkeeping);
criterion_main!(benches);
