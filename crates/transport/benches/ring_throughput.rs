use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::fs;
use std::time::Duration;
use transport::{ReadySignal, RingConfig, RingConsumer, RingProducer};

fn bench_signal(tag: &str) -> String {
    format!("/transport_bench_{}_{}", std::process::id(), tag)
}

/// Realistic frame sizes for the preview path.
const SIZES: [(u32, u32, &str); 3] = [
    (1280, 720, "HD"),        // 1280x720x4 = ~3.5MB
    (1920, 1080, "Full HD"),  // 1920x1080x4 = ~8MB
    (2560, 1440, "QHD"),      // 2560x1440x4 = ~14MB
];

/// Benchmark the producer's claim-copy-publish path.
fn benchmark_ring_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_write");

    for (i, (width, height, label)) in SIZES.iter().enumerate() {
        let path = format!("/tmp/transport_bench_write_{i}");
        let signal = bench_signal(&format!("write_{i}"));
        let _ = fs::remove_file(&path);
        let _ = ReadySignal::unlink(&signal);

        let slot_size = width * height * 4 + 64;
        let mut producer = RingProducer::create(
            &path,
            &signal,
            &RingConfig {
                slot_count: 4,
                slot_size,
            },
        )
        .unwrap();
        let consumer = RingConsumer::attach(&path, &signal).unwrap();

        let payload = vec![128u8; (width * height * 4) as usize];

        group.bench_with_input(BenchmarkId::new("claim_copy_publish", label), label, |b, _| {
            b.iter(|| {
                producer.write(black_box(&payload)).unwrap();
                // Drain so the ring never hits the eviction path.
                let frame = consumer.borrow(Duration::ZERO).unwrap();
                frame.release();
            });
        });

        let _ = fs::remove_file(&path);
        let _ = ReadySignal::unlink(&signal);
    }

    group.finish();
}

/// Benchmark the zero-copy borrow against the copying read.
fn benchmark_ring_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_read");

    for (i, (width, height, label)) in SIZES.iter().enumerate() {
        let path = format!("/tmp/transport_bench_read_{i}");
        let signal = bench_signal(&format!("read_{i}"));
        let _ = fs::remove_file(&path);
        let _ = ReadySignal::unlink(&signal);

        let slot_size = width * height * 4 + 64;
        let mut producer = RingProducer::create(
            &path,
            &signal,
            &RingConfig {
                slot_count: 4,
                slot_size,
            },
        )
        .unwrap();
        let consumer = RingConsumer::attach(&path, &signal).unwrap();

        let payload = vec![128u8; (width * height * 4) as usize];
        let mut target = vec![0u8; (width * height * 4) as usize];

        group.bench_with_input(BenchmarkId::new("borrow", label), label, |b, _| {
            b.iter(|| {
                producer.write(&payload).unwrap();
                let frame = consumer.borrow(Duration::ZERO).unwrap();
                black_box(frame.bytes().len());
                frame.release();
            });
        });

        group.bench_with_input(BenchmarkId::new("read_into", label), label, |b, _| {
            b.iter(|| {
                producer.write(&payload).unwrap();
                let len = consumer
                    .read_into(black_box(&mut target), Duration::ZERO)
                    .unwrap();
                black_box(len);
            });
        });

        let _ = fs::remove_file(&path);
        let _ = ReadySignal::unlink(&signal);
    }

    group.finish();
}

criterion_group!(benches, benchmark_ring_write, benchmark_ring_read);
criterion_main!(benches);
