//! Monitor Tick Benchmark
//!
//! Measures one monitor tick (`advance_all`) over a registry of looping
//! streams while a software pool plays one buffer per stream per tick, so
//! every tick unqueues, refills and requeues.
//!
//! **Goal:** A tick over 16 streams stays well under the 10 ms monitor sleep

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use wkmp_as::audio::MemoryDecoder;
use wkmp_as::backend::{SoftwareVoicePool, VoicePool};
use wkmp_as::stream::{StreamRegistry, LOOP_INFINITE};
use wkmp_common::events::{EventBus, SoundCategory};
use wkmp_common::params::AudioParams;

const BUFFER_FRAMES: usize = 4096;

fn setup(streams: usize, float32: bool) -> (StreamRegistry, Arc<SoftwareVoicePool>) {
    let params = AudioParams::default();
    params.set_buffer_sample_size(BUFFER_FRAMES).unwrap();
    params.set_max_buffer_count(4).unwrap();

    let pool = Arc::new(SoftwareVoicePool::new(streams, float32));
    let registry = StreamRegistry::new(Arc::new(params), EventBus::new(64));
    registry
        .lock()
        .set_pool(Some(pool.clone() as Arc<dyn VoicePool>));

    for _ in 0..streams {
        let decoder = MemoryDecoder::sine(440.0, 5.0, 2, 44_100);
        let id = registry
            .insert(Box::new(decoder), SoundCategory::Music)
            .unwrap();
        registry
            .with_engine(id, |engine| {
                let total = engine.format().total_samples;
                engine.set_loop(0, total, LOOP_INFINITE).unwrap();
                engine.play().unwrap();
            })
            .unwrap();
    }
    (registry, pool)
}

fn bench_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("advance_all");

    for streams in [1usize, 4, 16] {
        let (registry, pool) = setup(streams, true);
        group.bench_with_input(BenchmarkId::new("float32", streams), &streams, |b, _| {
            b.iter(|| {
                pool.consume(BUFFER_FRAMES);
                registry.advance_all();
                black_box(pool.rendered_frames());
            });
        });
    }

    let (registry, pool) = setup(16, false);
    group.bench_function("int16/16", |b| {
        b.iter(|| {
            pool.consume(BUFFER_FRAMES);
            registry.advance_all();
            black_box(pool.rendered_frames());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_advance);
criterion_main!(benches);
