//! Core hot paths (Criterion).
//!
//! Suites:
//!   - core/emit    → write `n` instructions with their constants, then free
//!   - core/heap    → copy vs take string allocation, full heap release
//!   - core/disasm  → render a synthetic chunk as text
//!
//! Criterion:
//!   CRIT_SAMPLES (def=50) | CRIT_WARMUP_MS (def=300) | CRIT_MEASURE_MS (def=1200)

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use loxide_core::{disassemble_chunk, Chunk, Heap, OpCode, Value};
use loxide_mm::Allocator;

fn env_usize(k: &str, d: usize) -> usize {
    std::env::var(k).ok().and_then(|s| s.parse().ok()).unwrap_or(d)
}
fn env_u64(k: &str, d: u64) -> u64 {
    std::env::var(k).ok().and_then(|s| s.parse().ok()).unwrap_or(d)
}

fn tune(group: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    group.sample_size(env_usize("CRIT_SAMPLES", 50));
    group.warm_up_time(Duration::from_millis(env_u64("CRIT_WARMUP_MS", 300)));
    group.measurement_time(Duration::from_millis(env_u64("CRIT_MEASURE_MS", 1200)));
}

/// `n` constant loads followed by a return, 256 constants at most.
fn emit(alloc: &mut Allocator, n: usize) -> Chunk {
    let mut chunk = Chunk::new();
    for i in 0..n {
        let line = u32::try_from(i / 4).unwrap_or(u32::MAX);
        let slot = chunk.add_constant(alloc, Value::Number(i as f64)).expect("bench budget") % 256;
        chunk.write_op(alloc, OpCode::Constant, line).expect("bench budget");
        chunk.write(alloc, slot as u8, line).expect("bench budget");
    }
    chunk.write_op(alloc, OpCode::Return, 0).expect("bench budget");
    chunk
}

fn bench_emit(c: &mut Criterion) {
    let mut group = c.benchmark_group("core/emit");
    tune(&mut group);
    for n in [16usize, 256, 4096] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let mut alloc = Allocator::default();
            b.iter(|| {
                let mut chunk = emit(&mut alloc, black_box(n));
                chunk.free(&mut alloc);
            });
        });
    }
    group.finish();
}

fn bench_heap(c: &mut Criterion) {
    let mut group = c.benchmark_group("core/heap");
    tune(&mut group);
    let words: Vec<String> = (0..512).map(|i| format!("identifier_{i}")).collect();

    group.bench_function("copy_string", |b| {
        b.iter(|| {
            let mut heap = Heap::new();
            for w in &words {
                black_box(heap.copy_string(w).expect("bench budget"));
            }
            heap.free_objects();
        });
    });
    group.bench_function("take_string", |b| {
        b.iter_batched(
            || words.clone(),
            |owned| {
                let mut heap = Heap::new();
                for w in owned {
                    black_box(heap.take_string(w).expect("bench budget"));
                }
                heap.free_objects();
            },
            criterion::BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn bench_disasm(c: &mut Criterion) {
    let mut group = c.benchmark_group("core/disasm");
    tune(&mut group);
    let mut alloc = Allocator::default();
    let chunk = emit(&mut alloc, 1024);
    group.throughput(Throughput::Bytes(chunk.len() as u64));
    group.bench_function("text", |b| {
        b.iter(|| disassemble_chunk(black_box(&chunk), None, "bench").expect("well-formed chunk"));
    });
    group.finish();
}

criterion_group!(benches, bench_emit, bench_heap, bench_disasm);
criterion_main!(benches);
