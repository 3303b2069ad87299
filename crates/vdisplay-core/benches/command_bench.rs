//! Criterion benchmarks for the command parser and swipe planner.
//!
//! Command parsing runs on every inbound line, so it sits on the input
//! latency path between the automation client and the injected event.
//!
//! Run with:
//! ```bash
//! cargo bench --package vdisplay-core --bench command_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vdisplay_core::{align_dimension, parse_command, swipe_path};

/// Benchmarks `parse_command` for every keyword plus the two error paths.
fn bench_parse(c: &mut Criterion) {
    let lines: &[(&str, &str)] = &[
        ("CreateDisplay(defaults)", "CREATE_DISPLAY"),
        ("CreateDisplay(full)", "CREATE_DISPLAY 1080 1920 320 4000"),
        ("DestroyDisplay", "DESTROY_DISPLAY"),
        ("Tap", "TAP 540 960"),
        ("Swipe", "SWIPE 100 1500 100 300 250"),
        ("TouchMove", "TOUCH_MOVE 320 640"),
        ("Key", "KEY 66"),
        ("Screenshot", "SCREENSHOT"),
        ("LaunchApp", "LAUNCH_APP com.example.settings"),
        ("InvalidNumber", "TAP abc def"),
        ("UnknownKeyword", "REBOOT now"),
    ];

    let mut group = c.benchmark_group("parse_command");
    for (name, line) in lines {
        group.bench_with_input(BenchmarkId::new("line", name), line, |b, line| {
            b.iter(|| parse_command(black_box(line)))
        });
    }
    group.finish();
}

/// Benchmarks swipe planning for short, typical, and long gestures.
fn bench_swipe_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("swipe_path");
    for duration_ms in [16u64, 300, 2000] {
        group.bench_with_input(
            BenchmarkId::new("duration_ms", duration_ms),
            &duration_ms,
            |b, &duration_ms| {
                b.iter(|| swipe_path(black_box(100), black_box(1500), 100, 300, duration_ms))
            },
        );
    }
    group.finish();
}

fn bench_align(c: &mut Criterion) {
    c.bench_function("align_dimension", |b| {
        b.iter(|| align_dimension(black_box(2339)))
    });
}

criterion_group!(benches, bench_parse, bench_swipe_path, bench_align);
criterion_main!(benches);
