use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{distributions::Uniform, thread_rng, Rng};
use voxtree_io::compression::StaticRangeCoder;

const SIZES: [usize; 3] = [1_000, 100_000, 1_000_000];

/// Bytes that resemble an occupancy stream: few distinct values, most of them small
fn skewed_bytes(count: usize) -> Vec<u8> {
    let mut rng = thread_rng();
    let rare = Uniform::new_inclusive(0_u8, 255);
    (0..count)
        .map(|_| {
            if rng.gen_bool(0.8) {
                1 << rng.gen_range(0..8)
            } else {
                rng.sample(rare)
            }
        })
        .collect()
}

fn range_coder_benchmarks(c: &mut Criterion) {
    let coder = StaticRangeCoder::new();
    let mut group = c.benchmark_group("range_coder");
    for size in SIZES.iter() {
        let data = skewed_bytes(*size);
        let encoded = coder
            .encode(&data)
            .expect("Encoding the benchmark data failed");
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("encode", size), &data, |b, data| {
            b.iter(|| coder.encode(data).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, encoded| {
            b.iter(|| coder.decode(encoded, *size).unwrap())
        });
    }
    group.finish();
}

criterion_group! {
    name = range_coder;
    config = Criterion::default().sample_size(20);
    targets = range_coder_benchmarks
}
criterion_main!(range_coder);
