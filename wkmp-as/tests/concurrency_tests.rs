//! Concurrent access: application calls, monitor ticks and async loads

mod helpers;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use helpers::*;
use wkmp_as::audio::Decoder;
use wkmp_as::backend::{SoftwareVoicePool, VoicePool};
use wkmp_as::stream::{LoadState, StreamId, StreamRegistry, LOOP_INFINITE};
use wkmp_as::Error;
use wkmp_common::events::{EventBus, SoundCategory, StreamPlayState};

/// Small deterministic generator so failures reproduce
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

/// Check the registry-wide invariants while holding the mutex
fn assert_consistent(registry: &StreamRegistry, pool: &SoftwareVoicePool) {
    let state = registry.lock();
    let mut holding = 0;
    for engine in state.engines() {
        if engine.state() == StreamPlayState::Standby {
            assert!(!engine.has_voice(), "stream {} holds a voice in Standby", engine.id());
        }
        if let Some(voice) = engine.voice() {
            holding += 1;
            assert!(
                pool.queued_count(voice) <= engine.buffer_count(),
                "voice {} has more buffers queued than the stream owns",
                voice
            );
        }
    }
    assert_eq!(pool.voices_in_use(), holding);
}

#[test]
fn test_interleaved_operations_keep_invariants() {
    let pool = Arc::new(SoftwareVoicePool::new(4, true));
    let registry = StreamRegistry::new(test_params(), EventBus::new(4096));
    registry
        .lock()
        .set_pool(Some(pool.clone() as Arc<dyn VoicePool>));

    let ids: Vec<StreamId> = (0..8)
        .map(|i| {
            registry
                .insert(Box::new(ScriptedDecoder::ramp(2000 + 300 * i, 2)), SoundCategory::Music)
                .unwrap()
        })
        .collect();
    let ids = Arc::new(ids);

    let mut workers = Vec::new();
    for seed in [0x9E37_79B9_7F4A_7C15u64, 0xD1B5_4A32_D192_ED03] {
        let registry = registry.clone();
        let pool = Arc::clone(&pool);
        let ids = Arc::clone(&ids);
        workers.push(thread::spawn(move || {
            let mut rng = XorShift(seed);
            for _ in 0..500 {
                let id = ids[rng.below(ids.len() as u64) as usize];
                let op = rng.below(6);
                registry
                    .with_engine(id, |engine| {
                        let total = engine.format().total_samples;
                        match op {
                            0 | 1 => {
                                let _ = engine.play();
                            }
                            2 => engine.stop(),
                            3 => {
                                let _ = engine.seek(rng.below(total + 1));
                            }
                            4 => {
                                let begin = rng.below(total);
                                let end = begin + rng.below(total - begin + 1);
                                let counter = rng.below(4) as i32 - 1;
                                let _ = engine.set_loop(begin, end, counter);
                            }
                            _ => engine.set_volume(rng.below(100) as f32 / 100.0),
                        }
                    })
                    .unwrap();
                assert_consistent(&registry, &pool);
            }
        }));
    }

    // The device clock and the monitor tick
    let ticker = {
        let registry = registry.clone();
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            for i in 0..1000 {
                pool.consume(if i % 7 == 0 { 4 * BUFFER } else { BUFFER / 2 });
                registry.advance_all();
                assert_consistent(&registry, &pool);
            }
        })
    };

    for worker in workers {
        worker.join().unwrap();
    }
    ticker.join().unwrap();

    assert_consistent(&registry, &pool);
    for id in ids.iter() {
        registry.release(*id).unwrap();
    }
    assert_eq!(pool.voices_in_use(), 0);
    assert_eq!(pool.buffer_count(), 0);
}

#[test]
fn test_reinit_under_load_keeps_invariants() {
    let backend = Arc::new(simulated_backend().with_voices(4));
    let mut subsystem = subsystem_with(&backend, test_params());
    let streams: Vec<_> = (0..6)
        .map(|_| {
            let stream = subsystem
                .open_decoder(Box::new(ScriptedDecoder::ramp(30_000, 2)), SoundCategory::Music)
                .unwrap();
            stream.set_loop(0, 30_000, LOOP_INFINITE).unwrap();
            stream
        })
        .collect();

    for round in 0..10 {
        for (i, stream) in streams.iter().enumerate() {
            if (i + round) % 2 == 0 {
                let _ = stream.play();
            } else {
                stream.stop().unwrap();
            }
        }
        if let Some(pool) = backend.current_pool() {
            pool.consume(3 * BUFFER);
        }
        thread::sleep(Duration::from_millis(5));
        assert!(subsystem.reinit());

        let pool = backend.current_pool().unwrap();
        assert_consistent(subsystem.registry(), &pool);
        assert!(pool.voices_in_use() <= 4);
    }
}

#[test]
fn test_async_load_becomes_ready() {
    let backend = Arc::new(simulated_backend());
    let subsystem = subsystem_with(&backend, test_params());

    let stream = subsystem
        .open_async_with(SoundCategory::Music, || {
            thread::sleep(Duration::from_millis(50));
            Ok(Box::new(ScriptedDecoder::ramp(5000, 2).with_tag("title", "slow")) as Box<dyn Decoder>)
        })
        .unwrap();

    assert_eq!(stream.load_state().unwrap(), LoadState::Loading);
    assert!(!stream.is_ready());
    assert!(matches!(stream.play(), Err(Error::NotReady(_))));

    stream.wait_until_loaded(Duration::from_secs(5)).unwrap();
    assert!(stream.is_ready());
    assert_eq!(stream.metadata().unwrap().get("title").map(String::as_str), Some("slow"));
    assert!(stream.play().unwrap());
}

#[test]
fn test_async_load_failure_is_reported() {
    let backend = Arc::new(simulated_backend());
    let subsystem = subsystem_with(&backend, test_params());

    let stream = subsystem
        .open_async_with(SoundCategory::Effects, || {
            Err(Error::DecodeInit("no such codec".to_string()))
        })
        .unwrap();

    assert!(matches!(
        stream.wait_until_loaded(Duration::from_secs(5)),
        Err(Error::NotReady(_))
    ));
    assert!(matches!(stream.load_state().unwrap(), LoadState::Failed(reason) if reason.contains("no such codec")));
    assert!(matches!(stream.state(), Err(Error::NotReady(_))));
}

#[test]
fn test_releasing_loading_stream_discards_result() {
    let backend = Arc::new(simulated_backend());
    let subsystem = subsystem_with(&backend, test_params());

    let stream = subsystem
        .open_async_with(SoundCategory::Music, || {
            thread::sleep(Duration::from_millis(100));
            Ok(Box::new(ScriptedDecoder::ramp(5000, 2)) as Box<dyn Decoder>)
        })
        .unwrap();
    assert_eq!(subsystem.registry().len(), 1);

    // Joins the loader; its result must not resurrect the stream
    stream.release().unwrap();
    assert!(subsystem.registry().is_empty());
    assert_eq!(backend.current_pool().unwrap().buffer_count(), 0);
}

#[test]
fn test_handles_are_usable_from_other_threads() {
    let backend = Arc::new(simulated_backend());
    let subsystem = subsystem_with(&backend, test_params());
    let stream = Arc::new(
        subsystem
            .open_decoder(Box::new(ScriptedDecoder::ramp(10_000, 2)), SoundCategory::Music)
            .unwrap(),
    );

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let stream = Arc::clone(&stream);
            thread::spawn(move || {
                for n in 0..50u64 {
                    if i % 2 == 0 {
                        let _ = stream.play();
                    } else {
                        stream.seek((n * 97) % 10_000).unwrap();
                    }
                    stream.tell().unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_consistent(subsystem.registry(), &backend.current_pool().unwrap());
}
