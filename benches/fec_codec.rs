use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use relay_core::fec::{RsDecoder, RsEncoder, XorDecoder, XorEncoder};

fn bench_rs_encode(c: &mut Criterion) {
    let buf = vec![0xABu8; 16_000];
    let mut group = c.benchmark_group("rs_encode");
    for (k, m) in [(4u8, 2u8), (8, 3), (16, 4)] {
        group.bench_with_input(BenchmarkId::new("k_m", format!("{k}_{m}")), &(k, m), |b, &(k, m)| {
            let mut enc = RsEncoder::new();
            b.iter(|| {
                enc.encode(&buf, k, m).unwrap();
            });
        });
    }
    group.finish();
}

fn bench_rs_decode(c: &mut Criterion) {
    let buf = vec![0xCDu8; 16_000];
    let mut group = c.benchmark_group("rs_decode");
    for (k, m) in [(4u8, 2u8), (8, 3), (16, 4)] {
        group.bench_with_input(BenchmarkId::new("k_m", format!("{k}_{m}")), &(k, m), |b, &(k, m)| {
            let mut enc = RsEncoder::new();
            b.iter(|| {
                let (_gid, shards) = enc.encode(&buf, k, m).unwrap();
                let mut dec = RsDecoder::new();
                for s in shards.into_iter().take(k as usize) {
                    dec.decode(s);
                }
            });
        });
    }
    group.finish();
}

fn bench_xor_round_trip(c: &mut Criterion) {
    let buf = vec![0x42u8; 4_000];
    c.bench_function("xor_round_trip", |b| {
        b.iter(|| {
            let mut enc = XorEncoder::new();
            let (_gid, mut shards) = enc.encode(&buf, 4).unwrap();
            shards.remove(0);
            let mut dec = XorDecoder::new();
            for s in shards {
                dec.decode(s);
            }
        });
    });
}

criterion_group!(fec_codec_benches, bench_rs_encode, bench_rs_decode, bench_xor_round_trip);
criterion_main!(fec_codec_benches);
