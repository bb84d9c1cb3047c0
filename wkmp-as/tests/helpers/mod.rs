//! Shared fixtures for wkmp-as integration tests
//!
//! - Decoders with known sample values and injectable failures
//! - WAV fixture generation (hound)
//! - Small parameter sets and simulated subsystems
//! - Event collection and polling helpers

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hound::{WavSpec, WavWriter};
use tokio::sync::broadcast::{self, error::TryRecvError};
use wkmp_as::audio::{Decoder, PcmBuffer, StreamInfo};
use wkmp_as::backend::{SimulatedBackend, SoftwareVoicePool, VoicePool};
use wkmp_as::stream::StreamEngine;
use wkmp_as::{AudioSubsystem, Error, Result};
use wkmp_common::events::{AudioEvent, EventBus, SoundCategory, StopReason};
use wkmp_common::params::AudioParams;

/// Frames per hardware buffer used throughout the tests (the minimum allowed)
pub const BUFFER: usize = 256;

/// Parameters sized for fast tests: 256-frame buffers, 4 per stream, a
/// 1 ms monitor tick and a long polling interval.
pub fn test_params() -> Arc<AudioParams> {
    let params = AudioParams::default();
    params.set_buffer_sample_size(BUFFER).unwrap();
    params.set_max_buffer_count(4).unwrap();
    params.set_monitor_sleep_ms(1).unwrap();
    params.set_device_check_interval_ms(60_000).unwrap();
    Arc::new(params)
}

/// Same as `test_params` but polling the device list every 50 ms
pub fn polling_params() -> Arc<AudioParams> {
    let params = test_params();
    params.set_device_check_interval_ms(50).unwrap();
    params
}

/// Sample value for frame `frame` of a ramp fixture. Cycles every 1000
/// frames so it stays well inside [-1, 1].
pub fn ramp_value(frame: u64) -> f32 {
    (frame % 1000) as f32 / 1000.0
}

/// Interleaved ramp, identical on every channel
pub fn ramp(frames: u64, channels: u16) -> Vec<f32> {
    let mut samples = Vec::with_capacity(frames as usize * channels as usize);
    for frame in 0..frames {
        for _ in 0..channels {
            samples.push(ramp_value(frame));
        }
    }
    samples
}

/// In-memory ramp decoder with optional failure injection
pub struct ScriptedDecoder {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
    position: u64,
    /// decode_into fails once the decoder reaches this frame
    fail_at: Option<u64>,
    /// Frames handed out so far, visible from outside the engine
    decoded: Arc<AtomicU64>,
    tags: BTreeMap<String, String>,
}

impl ScriptedDecoder {
    pub fn ramp(frames: u64, channels: u16) -> Self {
        Self {
            samples: ramp(frames, channels),
            channels,
            sample_rate: 44_100,
            position: 0,
            fail_at: None,
            decoded: Arc::new(AtomicU64::new(0)),
            tags: BTreeMap::new(),
        }
    }

    pub fn fail_at(mut self, frame: u64) -> Self {
        self.fail_at = Some(frame);
        self
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    /// Shared counter of frames produced
    pub fn decoded_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.decoded)
    }

    fn total_frames(&self) -> u64 {
        (self.samples.len() / self.channels as usize) as u64
    }
}

impl Decoder for ScriptedDecoder {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            channels: self.channels,
            sample_rate: self.sample_rate,
            total_samples: self.total_frames(),
        }
    }

    fn decode_into(&mut self, out: &mut PcmBuffer, max_frames: usize) -> Result<usize> {
        if let Some(limit) = self.fail_at {
            if self.position >= limit {
                return Err(Error::Decode(format!("injected failure at frame {}", limit)));
            }
        }
        let channels = self.channels as usize;
        let mut frames = max_frames
            .min(self.total_frames().saturating_sub(self.position) as usize)
            .min(out.len() / channels);
        if let Some(limit) = self.fail_at {
            frames = frames.min(limit.saturating_sub(self.position) as usize);
        }

        let start = self.position as usize * channels;
        out.write_f32(0, &self.samples[start..start + frames * channels]);
        self.position += frames as u64;
        self.decoded.fetch_add(frames as u64, Ordering::Relaxed);
        Ok(frames)
    }

    fn seek_to_sample(&mut self, sample: u64) -> Result<()> {
        self.position = sample.min(self.total_frames());
        Ok(())
    }

    fn tell_samples(&self) -> u64 {
        self.position
    }

    fn metadata_tags(&self) -> BTreeMap<String, String> {
        self.tags.clone()
    }
}

/// Engine over a ramp of `frames` frames attached to `pool`
pub fn ramp_engine(
    frames: u64,
    pool: &Arc<SoftwareVoicePool>,
    events: &EventBus,
) -> StreamEngine {
    let pool: Arc<dyn VoicePool> = pool.clone();
    StreamEngine::open(
        uuid::Uuid::new_v4(),
        Box::new(ScriptedDecoder::ramp(frames, 2)),
        Some(pool),
        test_params(),
        events.clone(),
        SoundCategory::Music,
    )
    .unwrap()
}

/// Write a 16-bit ramp WAV file
pub fn write_ramp_wav(dir: &Path, name: &str, frames: u64, channels: u16, sample_rate: u32) -> PathBuf {
    let path = dir.join(name);
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec).unwrap();
    for frame in 0..frames {
        let value = (ramp_value(frame) * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(value).unwrap();
        }
    }
    writer.finalize().unwrap();
    path
}

/// Simulated backend with playback devices A and B and capture device Mic
pub fn simulated_backend() -> SimulatedBackend {
    SimulatedBackend::new(&["A", "B"], &["Mic"])
}

/// Subsystem over `backend` with the given parameters
pub fn subsystem_with(backend: &Arc<SimulatedBackend>, params: Arc<AudioParams>) -> AudioSubsystem {
    AudioSubsystem::new(backend.clone(), params, EventBus::new(1024)).unwrap()
}

/// Everything currently buffered on a receiver
pub fn drain_events(rx: &mut broadcast::Receiver<AudioEvent>) -> Vec<AudioEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    events
}

/// Stop reasons of every StreamStop in `events`
pub fn stop_reasons(events: &[AudioEvent]) -> Vec<StopReason> {
    events
        .iter()
        .filter_map(|e| match e {
            AudioEvent::StreamStop { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect()
}

/// Poll `condition` every millisecond until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}
