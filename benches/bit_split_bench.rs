use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::thread_rng;

use mixring::conversion::bitops::{bit_split_rss, pack_2_rss, unpack_2_rss};
use mixring::rep3_core::party::RngExt;
use mixring::sharing::BoolRss;

fn random_rss(n: usize, nbits: usize) -> BoolRss<u64> {
    let mut rng = thread_rng();
    let mask = if nbits >= 64 { u64::MAX } else { (1u64 << nbits) - 1 };
    let si: Vec<u64> = u64::generate(&mut rng, n).into_iter().map(|v| v & mask).collect();
    let sii: Vec<u64> = u64::generate(&mut rng, n).into_iter().map(|v| v & mask).collect();
    BoolRss::new(si, sii, nbits).unwrap()
}

fn bench_bit_split(c: &mut Criterion) {
    let x = random_rss(1 << 14, 64);
    c.bench_function("bit_split_rss 16k x u64", |b| {
        b.iter(|| bit_split_rss(black_box(&x)).unwrap())
    });
}

fn bench_pack_unpack(c: &mut Criterion) {
    let lo = random_rss(1 << 14, 32);
    let hi = random_rss(1 << 14, 32);
    c.bench_function("pack_2_rss + unpack_2_rss 16k x 32 bits", |b| {
        b.iter(|| {
            let packed = pack_2_rss(black_box(&lo), black_box(&hi)).unwrap();
            unpack_2_rss(black_box(&packed)).unwrap()
        })
    });
}

criterion_group!(benches, bench_bit_split, bench_pack_unpack);
criterion_main!(benches);
