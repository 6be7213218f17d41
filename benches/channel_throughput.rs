//! Benchmarks for channel throughput.
//!
//! Measures the cost of the lease/commit path against bulk transfers, and
//! the overhead a filter adds in front of a terminal.

use bufstream_core::message::VideoAuRecord;
use bufstream_core::{shared, write_all, ByteChannel, Message, NullChannel};
use bufstream_filters::{IndexFilter, MzlFilter};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

const PAYLOAD: usize = 1024 * 1024;

/// Lease/commit in fixed pieces versus one bulk transfer per piece.
fn bench_lease_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("lease_commit");
    group.throughput(Throughput::Bytes(PAYLOAD as u64));
    let data = vec![0x5Au8; PAYLOAD];

    for piece in [188, 4096, 65536] {
        group.bench_function(format!("lease_commit_{}", piece), |b| {
            let mut ch = NullChannel::new(piece);
            b.iter(|| {
                for part in data.chunks(piece) {
                    let region = ch.lease(part.len()).unwrap();
                    region.copy_from_slice(part);
                    black_box(ch.commit(part.len()).unwrap());
                }
            });
        });

        group.bench_function(format!("bulk_transfer_{}", piece), |b| {
            let mut ch = NullChannel::new(piece);
            b.iter(|| write_all(&mut ch, black_box(&data)).unwrap());
        });
    }

    group.finish();
}

/// Pass-through filters in front of a terminal.
fn bench_filter_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_overhead");
    group.throughput(Throughput::Bytes(PAYLOAD as u64));
    let data = vec![0u8; PAYLOAD];
    let dir = tempfile::tempdir().unwrap();

    group.bench_function("mzl_over_null", |b| {
        let mut filter = MzlFilter::with_path(NullChannel::new(65536), dir.path().join("bench.mzl"));
        b.iter(|| write_all(&mut filter, black_box(&data)).unwrap());
    });

    group.bench_function("index_with_records", |b| {
        let sidecar = shared(NullChannel::new(65536));
        let mut filter = IndexFilter::new(NullChannel::new(65536), Some(sidecar), None);
        b.iter(|| {
            for (i, part) in data.chunks(4096).enumerate() {
                write_all(&mut filter, part).unwrap();
                let record = VideoAuRecord {
                    file_pos: (i * 4096) as i64,
                    ..VideoAuRecord::default()
                };
                filter.message(0, &mut Message::VideoAuInfo(record)).unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_lease_commit, bench_filter_overhead);
criterion_main!(benches);
