//! Stream engine behavior against a software voice pool
//!
//! Drives a single `StreamEngine` by hand: `consume` stands in for the
//! device clock and `advance` for the monitor tick.

mod helpers;

use std::sync::Arc;

use helpers::*;
use wkmp_as::audio::SampleFormat;
use wkmp_as::backend::{SoftwareVoicePool, VoicePool};
use wkmp_as::stream::{StreamEngine, LOOP_INFINITE};
use wkmp_as::Error;
use wkmp_common::events::{AudioEvent, EventBus, SoundCategory, StopReason, StreamPlayState};

const TOTAL: u64 = 1000;

fn pool() -> Arc<SoftwareVoicePool> {
    Arc::new(SoftwareVoicePool::new(4, true))
}

/// Play half a buffer at a time, ticking after each step, until the stream
/// stops or `max_steps` is reached.
fn run_until_standby(engine: &mut StreamEngine, pool: &SoftwareVoicePool, max_steps: usize) {
    for _ in 0..max_steps {
        pool.consume(BUFFER / 2);
        engine.advance();
        if engine.state() == StreamPlayState::Standby {
            return;
        }
    }
}

#[test]
fn test_loop_region_validation() {
    let pool = pool();
    let events = EventBus::new(64);
    let mut engine = ramp_engine(TOTAL, &pool, &events);

    assert!(matches!(
        engine.set_loop(600, 500, 0),
        Err(Error::InvalidLoopRegion { begin: 600, end: 500, total: TOTAL })
    ));
    assert!(matches!(
        engine.set_loop(0, TOTAL + 1, 0),
        Err(Error::InvalidLoopRegion { .. })
    ));
    assert!(matches!(engine.set_loop(0, 100, -2), Err(Error::InvalidLoopCount(-2))));

    // Rejected calls leave the default region alone
    let region = engine.loop_region();
    assert_eq!((region.begin, region.end, region.counter), (0, TOTAL, 0));

    // Empty and full regions are both valid
    engine.set_loop(500, 500, 0).unwrap();
    engine.set_loop(0, TOTAL, LOOP_INFINITE).unwrap();
    assert_eq!(engine.loop_region().counter, LOOP_INFINITE);
}

#[test]
fn test_seek_then_tell_stopped() {
    let pool = pool();
    let events = EventBus::new(64);
    let mut engine = ramp_engine(TOTAL, &pool, &events);

    for n in 0..=TOTAL {
        engine.seek(n).unwrap();
        assert_eq!(engine.tell(), n);
        assert_eq!(engine.decode_position(), n);
    }
    assert!(matches!(
        engine.seek(TOTAL + 1),
        Err(Error::InvalidSeek { position, total }) if position == TOTAL + 1 && total == TOTAL
    ));
    assert_eq!(engine.tell(), TOTAL);
}

#[test]
fn test_seek_then_tell_playing() {
    let pool = pool();
    let events = EventBus::new(4096);
    let mut engine = ramp_engine(TOTAL, &pool, &events);
    assert!(engine.play().unwrap());

    for n in 0..=TOTAL {
        engine.seek(n).unwrap();
        assert_eq!(engine.tell(), n, "tell after seek({})", n);
        assert_eq!(engine.state(), StreamPlayState::Playing);
        assert!(engine.has_voice());
    }
}

#[test]
fn test_seek_while_playing_refills_from_new_position() {
    let pool = pool();
    let events = EventBus::new(64);
    let mut engine = ramp_engine(5000, &pool, &events);
    engine.play().unwrap();

    engine.seek(3000).unwrap();
    let voice = engine.voice().unwrap();
    assert_eq!(pool.queued_count(voice), 4);
    assert_eq!(engine.decode_position(), 3000 + 4 * BUFFER as u64);

    // One buffer later the confirmed position moves past the seek target
    pool.consume(BUFFER);
    engine.advance();
    assert_eq!(engine.tell(), 3000 + BUFFER as u64);
}

#[test]
fn test_stop_is_idempotent() {
    let pool = pool();
    let events = EventBus::new(64);
    let mut rx = events.subscribe();
    let mut engine = ramp_engine(TOTAL, &pool, &events);

    // Stopping a stream that never played is silent
    engine.stop();
    assert!(drain_events(&mut rx).is_empty());

    engine.play().unwrap();
    engine.stop();
    engine.stop();

    let events = drain_events(&mut rx);
    assert_eq!(stop_reasons(&events), vec![StopReason::Requested]);
    assert_eq!(engine.state(), StreamPlayState::Standby);
    assert!(!engine.has_voice());
    assert_eq!(pool.voices_in_use(), 0);
}

#[test]
fn test_full_rebuffer_queues_every_filled_buffer() {
    let pool = pool();
    let events = EventBus::new(64);

    // Short stream: fewer buffers than the maximum
    let mut short = ramp_engine(600, &pool, &events);
    assert_eq!(short.buffer_count(), 3);
    short.play().unwrap();
    let voice = short.voice().unwrap();
    assert_eq!(pool.queued_count(voice), 3);
    assert_eq!(short.stats().decoded_samples, 600);

    // Tiny stream: a single partial buffer
    let mut tiny = ramp_engine(100, &pool, &events);
    assert_eq!(tiny.buffer_count(), 1);
    tiny.play().unwrap();
    assert_eq!(pool.queued_count(tiny.voice().unwrap()), 1);

    // Small infinite loop: every buffer filled by wrapping
    let mut looped = ramp_engine(TOTAL, &pool, &events);
    looped.set_loop(0, 100, LOOP_INFINITE).unwrap();
    looped.play().unwrap();
    let voice = looped.voice().unwrap();
    assert_eq!(pool.queued_count(voice), looped.buffer_count());
    assert_eq!(looped.stats().decoded_samples, 400);
    assert_eq!(looped.stats().loop_wraps, 3);
}

#[test]
fn test_loop_counter_two_decodes_three_passes() {
    let pool = pool();
    let events = EventBus::new(1024);
    let mut rx = events.subscribe();
    let mut engine = ramp_engine(TOTAL, &pool, &events);
    engine.set_loop(0, TOTAL, 2).unwrap();
    engine.play().unwrap();

    let mut stopped = false;
    for _ in 0..200 {
        pool.consume(BUFFER / 2);
        engine.advance();
        for event in drain_events(&mut rx) {
            if let AudioEvent::StreamStop { .. } = event {
                assert_eq!(
                    engine.stats().decoded_samples,
                    3 * TOTAL,
                    "stream stopped before decoding every pass"
                );
                stopped = true;
            }
        }
        if stopped {
            break;
        }
    }

    assert!(stopped);
    assert_eq!(engine.stats().loop_wraps, 2);
    assert_eq!(engine.state(), StreamPlayState::Standby);
    assert_eq!(engine.tell(), 0);
}

#[test]
fn test_partial_loop_region_then_play_through() {
    let pool = pool();
    let events = EventBus::new(1024);
    let mut engine = ramp_engine(TOTAL, &pool, &events);
    engine.set_loop(200, 600, 1).unwrap();
    engine.play().unwrap();

    run_until_standby(&mut engine, &pool, 200);

    // 0..600, then the last repeat runs 200..1000
    assert_eq!(engine.state(), StreamPlayState::Standby);
    assert_eq!(engine.stats().decoded_samples, 600 + 800);
    assert_eq!(engine.loop_region().counter, 0);
    assert_eq!(engine.loop_region().end, TOTAL);
}

#[test]
fn test_infinite_loop_keeps_playing() {
    let pool = pool();
    let events = EventBus::new(1024);
    let mut engine = ramp_engine(TOTAL, &pool, &events);
    engine.set_loop(0, TOTAL, LOOP_INFINITE).unwrap();
    engine.play().unwrap();

    for _ in 0..100 {
        pool.consume(BUFFER / 2);
        engine.advance();
    }

    assert_eq!(engine.state(), StreamPlayState::Playing);
    assert!(engine.stats().decoded_samples > 5 * TOTAL);
    assert_eq!(engine.loop_region().counter, LOOP_INFINITE);
    assert_eq!(engine.stats().underruns, 0);
}

#[test]
fn test_natural_end_rewinds_and_reports_stop() {
    let pool = pool();
    let events = EventBus::new(1024);
    let mut rx = events.subscribe();
    let mut engine = ramp_engine(TOTAL, &pool, &events);
    engine.play().unwrap();

    run_until_standby(&mut engine, &pool, 100);

    assert_eq!(engine.state(), StreamPlayState::Standby);
    assert_eq!(engine.tell(), 0);
    assert_eq!(engine.stats().decoded_samples, TOTAL);
    assert_eq!(pool.voices_in_use(), 0);

    let reasons = stop_reasons(&drain_events(&mut rx));
    assert_eq!(reasons, vec![StopReason::UnqueueNeeded]);
}

#[test]
fn test_underrun_recovers_from_confirmed_position() {
    let pool = pool();
    let events = EventBus::new(64);
    let mut engine = ramp_engine(5000, &pool, &events);
    engine.play().unwrap();

    // Every queued buffer plays before the engine gets a tick
    pool.consume(4 * BUFFER);
    engine.advance();

    assert_eq!(engine.state(), StreamPlayState::Playing);
    assert_eq!(engine.stats().underruns, 1);
    assert_eq!(engine.tell(), 4 * BUFFER as u64);
    assert!(pool.is_playing(engine.voice().unwrap()));
}

#[test]
fn test_underrun_at_end_is_a_natural_end() {
    let pool = pool();
    let events = EventBus::new(64);
    let mut rx = events.subscribe();
    let mut engine = ramp_engine(TOTAL, &pool, &events);
    engine.play().unwrap();

    pool.consume(TOTAL as usize);
    engine.advance();

    assert_eq!(engine.state(), StreamPlayState::Standby);
    assert_eq!(engine.tell(), 0);
    assert_eq!(engine.stats().underruns, 0);
    assert_eq!(
        stop_reasons(&drain_events(&mut rx)),
        vec![StopReason::NoUnqueueNeeded]
    );
}

#[test]
fn test_decode_failure_mid_stream_stops() {
    let pool = pool();
    let events = EventBus::new(64);
    let mut rx = events.subscribe();
    let decoder = ScriptedDecoder::ramp(5000, 2).fail_at(1100);
    let mut engine = StreamEngine::open(
        uuid::Uuid::new_v4(),
        Box::new(decoder),
        Some(pool.clone() as Arc<dyn VoicePool>),
        test_params(),
        events.clone(),
        SoundCategory::Music,
    )
    .unwrap();

    assert!(engine.play().unwrap());
    run_until_standby(&mut engine, &pool, 50);

    assert_eq!(engine.state(), StreamPlayState::Standby);
    assert!(!engine.has_voice());
    assert_eq!(pool.voices_in_use(), 0);
    assert!(stop_reasons(&drain_events(&mut rx)).contains(&StopReason::RebufferFailed));
}

#[test]
fn test_play_failure_leaves_standby_without_voice() {
    let pool = pool();
    let events = EventBus::new(64);
    let mut rx = events.subscribe();
    let decoder = ScriptedDecoder::ramp(TOTAL, 2).fail_at(0);
    let mut engine = StreamEngine::open(
        uuid::Uuid::new_v4(),
        Box::new(decoder),
        Some(pool.clone() as Arc<dyn VoicePool>),
        test_params(),
        events.clone(),
        SoundCategory::Music,
    )
    .unwrap();

    assert!(matches!(engine.play(), Err(Error::Decode(_))));
    assert_eq!(engine.state(), StreamPlayState::Standby);
    assert!(!engine.has_voice());
    assert_eq!(pool.voices_in_use(), 0);
    let events = drain_events(&mut rx);
    assert!(!events.iter().any(|e| matches!(e, AudioEvent::StreamPlay { .. })));
}

#[test]
fn test_play_without_free_voice_is_refused() {
    let pool = Arc::new(SoftwareVoicePool::new(1, true));
    let events = EventBus::new(64);
    let mut first = ramp_engine(TOTAL, &pool, &events);
    let mut second = ramp_engine(TOTAL, &pool, &events);

    assert!(first.play().unwrap());
    assert!(!second.play().unwrap());
    assert_eq!(second.state(), StreamPlayState::Standby);
    assert!(!second.has_voice());

    first.stop();
    assert!(second.play().unwrap());
}

#[test]
fn test_restart_resumes_from_confirmed_position() {
    let pool = pool();
    let events = EventBus::new(64);
    let mut rx = events.subscribe();
    let mut engine = ramp_engine(5000, &pool, &events);
    engine.play().unwrap();

    pool.consume(2 * BUFFER);
    engine.advance();
    assert_eq!(engine.tell(), 2 * BUFFER as u64);

    assert!(engine.play().unwrap());
    assert_eq!(engine.tell(), 2 * BUFFER as u64);
    assert_eq!(engine.stats().plays, 2);

    let previous: Vec<StreamPlayState> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            AudioEvent::StreamPlay { previous_state, .. } => Some(previous_state),
            _ => None,
        })
        .collect();
    assert_eq!(previous, vec![StreamPlayState::Standby, StreamPlayState::Playing]);
}

#[test]
fn test_int16_only_pool_selects_int16_upload() {
    let pool = Arc::new(SoftwareVoicePool::new(2, false));
    let events = EventBus::new(64);
    let mut engine = ramp_engine(TOTAL, &pool, &events);

    assert_eq!(engine.format().sample_format, SampleFormat::Int16);
    assert!(engine.play().unwrap());
    run_until_standby(&mut engine, &pool, 100);
    assert_eq!(engine.stats().decoded_samples, TOTAL);
}
