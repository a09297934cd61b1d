//! Criterion benchmarks for the PeriSwitch frame codec.
//!
//! Bare tokens dominate real traffic; the payload cases cover the largest
//! frames the agents exchange (peripheral lists and notifications).
//!
//! Run with:
//! ```bash
//! cargo bench --package periswitch-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use periswitch_core::protocol::{decode_frame, encode_frame, Command, Frame};
use periswitch_core::Peripheral;

// ── Frame fixtures ────────────────────────────────────────────────────────────

fn make_peripheral_list(count: usize) -> Frame {
    let list: Vec<Peripheral> = (0..count)
        .map(|i| Peripheral::new(format!("a4-83-e7-00-00-{i:02x}"), format!("Peripheral {i}")))
        .collect();
    Frame::peripheral_data(&list).expect("peripheral list must encode")
}

fn make_notification() -> Frame {
    Frame::notification("Handoff Complete", "Connected 3 peripherals from desk")
        .expect("notification must encode")
}

fn fixtures() -> Vec<(&'static str, Frame)> {
    vec![
        ("HealthCheck", Frame::bare(Command::HealthCheck)),
        ("ConnectAll", Frame::bare(Command::ConnectAll)),
        ("OpSuccess", Frame::bare(Command::OpSuccess)),
        ("Notification", make_notification()),
        ("PeripheralData(3)", make_peripheral_list(3)),
        ("PeripheralData(32)", make_peripheral_list(32)),
    ]
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_frame");
    for (name, frame) in fixtures() {
        group.bench_with_input(BenchmarkId::new("frame", name), &frame, |b, frame| {
            b.iter(|| encode_frame(black_box(frame)).expect("encode must succeed"))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frame");
    for (name, frame) in fixtures() {
        let bytes = encode_frame(&frame).expect("encode must succeed for benchmark setup");
        group.bench_with_input(BenchmarkId::new("frame", name), &bytes, |b, bytes| {
            b.iter(|| decode_frame(black_box(bytes)).expect("decode must succeed"))
        });
    }
    group.finish();
}

/// Decoding plus payload parsing, as the listener does for a pushed list.
fn bench_peripheral_import(c: &mut Criterion) {
    let bytes = encode_frame(&make_peripheral_list(32)).expect("encode must succeed");
    c.bench_function("decode_and_parse_peripherals(32)", |b| {
        b.iter(|| {
            decode_frame(black_box(&bytes))
                .and_then(|frame| frame.peripherals())
                .expect("parse must succeed")
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_peripheral_import);
criterion_main!(benches);
