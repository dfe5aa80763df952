use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use attrstore::{AttributeVector, BasicType, CollectionType, Config, MissingPolicy, QueryTerm, Stash, Value};
use rand::Rng;

const WORDS: [&str; 8] = ["the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog"];

/// Helper to create a committed int attribute with random values
fn int_attribute(docs: u32, fast_search: bool) -> AttributeVector {
    let mut rng = rand::thread_rng();
    let config = Config::new(BasicType::Int64, CollectionType::Single).with_fast_search(fast_search);
    let attr = AttributeVector::new("score", config).unwrap();
    attr.add_docs(docs).unwrap();
    for doc in 0..docs {
        attr.update(doc, rng.gen_range(0..1000i64)).unwrap();
    }
    attr.commit().unwrap();
    attr
}

/// Helper to create a committed string array attribute
fn tag_attribute(docs: u32) -> AttributeVector {
    let mut rng = rand::thread_rng();
    let config = Config::new(BasicType::String, CollectionType::Array).with_fast_search(true);
    let attr = AttributeVector::new("tags", config).unwrap();
    attr.add_docs(docs).unwrap();
    for doc in 0..docs {
        let values: Vec<(Value, i32)> = (0..rng.gen_range(0..4))
            .map(|_| (Value::from(WORDS[rng.gen_range(0..WORDS.len())]), 1))
            .collect();
        attr.set_values(doc, &values).unwrap();
    }
    attr.commit().unwrap();
    attr
}

/// Benchmark commit throughput for batches of updates
fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");

    for batch_size in [10u32, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), batch_size, |b, &batch_size| {
            let attr = int_attribute(batch_size, true);
            let mut rng = rand::thread_rng();
            b.iter(|| {
                for doc in 0..batch_size {
                    attr.update(doc, rng.gen_range(0..1000i64)).unwrap();
                }
                attr.commit().unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark point reads through the accessors
fn bench_get_int(c: &mut Criterion) {
    let attr = int_attribute(10_000, false);
    c.bench_function("get_int", |b| {
        let mut doc = 0;
        b.iter(|| {
            black_box(attr.get_int(doc));
            doc = (doc + 1) % 10_000;
        });
    });
}

/// Benchmark a full scan through a read view
fn bench_read_view_scan(c: &mut Criterion) {
    let attr = tag_attribute(10_000);
    c.bench_function("array_read_view_scan", |b| {
        b.iter(|| {
            let guard = attr.take_guard();
            let stash = Stash::new();
            let view = attr.make_array_read_view::<&str>(&guard, &stash).unwrap();
            let mut total = 0;
            for doc in 0..attr.committed_doc_id_limit() {
                total += view.get_values(doc).len();
            }
            black_box(total)
        });
    });
}

/// Benchmark search with and without posting lists
fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    for fast_search in [false, true] {
        let attr = int_attribute(10_000, fast_search);
        group.bench_with_input(BenchmarkId::new("range", fast_search), &attr, |b, attr| {
            b.iter(|| {
                let guard = attr.take_guard();
                let mut ctx = attr.create_search_context(&guard, &QueryTerm::word("[100;200]")).unwrap();
                ctx.fetch_postings();
                black_box(ctx.create_iterator().count())
            });
        });
    }

    let tags = tag_attribute(10_000);
    group.bench_function("prefix", |b| {
        b.iter(|| {
            let guard = tags.take_guard();
            let mut ctx = tags.create_search_context(&guard, &QueryTerm::prefix("qu")).unwrap();
            ctx.fetch_postings();
            black_box(ctx.create_iterator().count())
        });
    });
    group.finish();
}

/// Benchmark sort blob serialization
fn bench_sort_blob(c: &mut Criterion) {
    let attr = tag_attribute(10_000);
    c.bench_function("sort_blob_write", |b| {
        let mut buf = [0u8; 64];
        b.iter(|| {
            let guard = attr.take_guard();
            let mut writer = attr.make_sort_blob_writer(&guard, true, &MissingPolicy::Last, None).unwrap();
            for doc in 0..1000 {
                black_box(writer.write(doc, &mut buf));
            }
        });
    });
}

criterion_group!(benches, bench_commit, bench_get_int, bench_read_view_scan, bench_search, bench_sort_blob);
criterion_main!(benches);
