//! Cutter throughput at assorted budgets.

use std::io::Write;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use deflate_cut::cut;

fn text_like(len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(42);
    let words: &[&[u8]] = &[
        b"the ", b"quick ", b"brown ", b"fox ", b"jumps ", b"over ", b"a ", b"lazy ", b"dog ",
    ];
    let mut data = Vec::with_capacity(len + 8);
    while data.len() < len {
        data.extend_from_slice(words[rng.gen_range(0..words.len())]);
    }
    data.truncate(len);
    data
}

fn bench_cut(c: &mut Criterion) {
    let data = text_like(1 << 20);
    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&data).unwrap();
    let encoded = encoder.finish().unwrap();

    let mut group = c.benchmark_group("cut");
    group.throughput(Throughput::Bytes(encoded.len() as u64));

    for divisor in [4usize, 2, 1] {
        let budget = encoded.len() / divisor;
        group.bench_with_input(BenchmarkId::new("budget", budget), &budget, |b, &budget| {
            b.iter_batched(
                || encoded.clone(),
                |mut buf| cut(black_box(&mut buf), budget).unwrap(),
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cut);
criterion_main!(benches);
