//! Record pipeline benchmarks
//!
//! - CRC-32C over payload sizes
//! - Raw `RecordReader` throughput
//! - Full dataset pipeline (prefetch, parallel decode, batch)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pipemode::channel::{ChannelRef, MemoryChannel};
use pipemode::dataset::{RecordStreamExt, StreamingDataset};
use pipemode::record::{crc32c, RecordFormat, RecordReader, RecordWriter};

fn payloads(count: usize, size: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| (0..size).map(|j| ((i + j) % 251) as u8).collect())
        .collect()
}

fn bench_crc32c(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32c");

    for size in [64usize, 4 * 1024, 1024 * 1024] {
        let data = vec![0xA5u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| black_box(crc32c(black_box(data))));
        });
    }

    group.finish();
}

fn bench_record_reader(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_reader");

    for size in [100usize, 1_000, 10_000] {
        let mut writer = RecordWriter::new(Vec::new());
        for payload in payloads(1_000, size) {
            writer.write_record(&payload).unwrap();
        }
        let framed = writer.finish().unwrap();
        group.throughput(Throughput::Bytes((1_000 * size) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &framed, |b, framed| {
            b.iter(|| {
                let records = RecordReader::new(framed.as_slice(), "bench")
                    .map(Result::unwrap)
                    .count();
                black_box(records);
            });
        });
    }

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("dataset_pipeline");
    let source = MemoryChannel::from_records(payloads(10_000, 256)).unwrap();
    let channel = ChannelRef::new("train", RecordFormat::TfRecord).unwrap();

    for workers in [1usize, 4] {
        group.bench_with_input(BenchmarkId::new("map_parallel", workers), &workers, |b, &workers| {
            b.iter(|| {
                let batches = StreamingDataset::new(channel.clone(), source.clone())
                    .records()
                    .prefetch(128)
                    .map_parallel(|r| Ok(r.iter().map(|&b| u64::from(b)).sum::<u64>()), workers)
                    .unwrap()
                    .batch(32)
                    .unwrap()
                    .map(Result::unwrap)
                    .count();
                black_box(batches);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_crc32c, bench_record_reader, bench_pipeline);
criterion_main!(benches);
