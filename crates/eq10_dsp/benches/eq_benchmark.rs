//! Performance benchmarks for the DSP module
//!
//! Run with: cargo bench -p eq10_dsp

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use eq10_dsp::{decimate, EqSnapshot, Equalizer, LevelMeter, DISPLAY_CAP};

fn benchmark_eq_processing(c: &mut Criterion) {
    let mut group = c.benchmark_group("equalizer");

    // Common buffer sizes in audio applications
    let buffer_sizes = [64, 128, 256, 512, 1024, 2048];

    for size in buffer_sizes {
        let sample_count = size * 2;

        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("process_interleaved_{}_frames", size), |b| {
            let mut eq = Equalizer::new(48000.0).unwrap();
            let mut buffer: Vec<f32> = (0..sample_count)
                .map(|i| (i as f32 * 0.001).sin())
                .collect();

            b.iter(|| {
                eq.process_interleaved(black_box(&mut buffer), 2);
            });
        });

        group.bench_function(format!("meter_{}_frames", size), |b| {
            let buffer: Vec<f32> = (0..size).map(|i| (i as f32 * 0.001).sin()).collect();
            let mut meter = LevelMeter::new();

            b.iter(|| {
                for &s in &buffer {
                    meter.push(s);
                }
                black_box(meter.finish());
            });
        });
    }

    group.finish();
}

fn benchmark_snapshot_update(c: &mut Criterion) {
    c.bench_function("eq_apply_snapshot", |b| {
        let mut eq = Equalizer::new(48000.0).unwrap();
        let mut snapshot = EqSnapshot::default();
        let mut band = 0;
        let mut gain = 0.0_f32;

        b.iter(|| {
            // Simulate dragging a slider
            snapshot.bands[band].gain_db = gain;
            eq.apply_snapshot(black_box(&snapshot));
            band = (band + 1) % 10;
            gain = (gain + 1.0) % 40.0;
        });
    });
}

fn benchmark_decimation(c: &mut Criterion) {
    // Five minutes of mono audio at 48 kHz
    let source: Vec<f32> = (0..48_000 * 300).map(|i| (i as f32 * 0.0001).sin()).collect();

    c.bench_function("decimate_5min_mono", |b| {
        b.iter(|| black_box(decimate(black_box(&source), DISPLAY_CAP)));
    });
}

criterion_group!(
    benches,
    benchmark_eq_processing,
    benchmark_snapshot_update,
    benchmark_decimation
);

criterion_main!(benches);
