//! In-process voice pool
//!
//! Keeps the OpenAL-style queue bookkeeping for every voice and mixes playing
//! voices into an interleaved f32 output block on demand. The cpal backend
//! calls `render` from its output callback; the simulated backend and the
//! tests drive it directly through `consume`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use super::{BufferId, VoiceId, VoicePool};
use crate::audio::PcmSlice;
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Voice {
    in_use: bool,
    playing: bool,
    gain: f32,
    queue: VecDeque<BufferId>,
    /// Leading entries of `queue` that have finished playing
    processed: usize,
    /// Fractional read position (frames) inside the current buffer
    cursor: f64,
}

impl Voice {
    fn reset(&mut self) {
        *self = Voice {
            gain: 1.0,
            ..Voice::default()
        };
    }
}

#[derive(Debug, Default)]
struct BufferData {
    channels: u16,
    sample_rate: u32,
    samples: Vec<f32>,
}

#[derive(Debug)]
struct PoolState {
    voices: Vec<Voice>,
    buffers: HashMap<BufferId, BufferData>,
    next_buffer: u32,
    closed: bool,
    rendered_frames: u64,
}

/// Voice pool with a fixed number of voices, mixed in software
#[derive(Debug)]
pub struct SoftwareVoicePool {
    state: Mutex<PoolState>,
    float32: bool,
}

impl SoftwareVoicePool {
    pub fn new(voice_count: usize, supports_float32: bool) -> Self {
        let mut voices = Vec::with_capacity(voice_count);
        voices.resize_with(voice_count, || {
            let mut voice = Voice::default();
            voice.reset();
            voice
        });

        Self {
            state: Mutex::new(PoolState {
                voices,
                buffers: HashMap::new(),
                next_buffer: 1,
                closed: false,
                rendered_frames: 0,
            }),
            float32: supports_float32,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Voice pool mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Total number of voices
    pub fn voice_count(&self) -> usize {
        self.lock().voices.len()
    }

    /// Voices currently lent out
    pub fn voices_in_use(&self) -> usize {
        self.lock().voices.iter().filter(|v| v.in_use).count()
    }

    /// Buffer handles currently allocated
    pub fn buffer_count(&self) -> usize {
        self.lock().buffers.len()
    }

    /// Frames mixed since the pool was created
    pub fn rendered_frames(&self) -> u64 {
        self.lock().rendered_frames
    }

    /// Invalidate every voice and buffer. Called when the device closes.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        for voice in state.voices.iter_mut() {
            voice.reset();
        }
        state.buffers.clear();
        debug!("Software voice pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Mix every playing voice into `out` (interleaved, `channels` wide),
    /// resampling each buffer to `output_rate` by stepping the read cursor.
    pub fn render(&self, out: &mut [f32], channels: usize, output_rate: u32) {
        self.render_inner(out, channels, Some(output_rate));
    }

    /// Play `frames` frames of every voice at its native rate, discarding the
    /// output. Stands in for a device clock.
    pub fn consume(&self, frames: usize) {
        let mut scratch = vec![0.0f32; frames * 2];
        self.render_inner(&mut scratch, 2, None);
    }

    fn render_inner(&self, out: &mut [f32], channels: usize, output_rate: Option<u32>) {
        out.fill(0.0);
        if channels == 0 {
            return;
        }
        let frames = out.len() / channels;

        let mut guard = self.lock();
        let state = &mut *guard;
        if state.closed {
            return;
        }

        for voice in state.voices.iter_mut().filter(|v| v.in_use && v.playing) {
            let mut frame = 0;
            while frame < frames {
                let Some(current) = voice.queue.get(voice.processed).copied() else {
                    break;
                };
                let Some(data) = state.buffers.get(&current) else {
                    // Deleted while queued: nothing to play
                    voice.processed += 1;
                    voice.cursor = 0.0;
                    continue;
                };

                let buffer_channels = data.channels.max(1) as usize;
                let buffer_frames = data.samples.len() / buffer_channels;
                let step = match output_rate {
                    Some(rate) if rate > 0 => data.sample_rate as f64 / rate as f64,
                    _ => 1.0,
                };

                while frame < frames {
                    let src = voice.cursor as usize;
                    if src >= buffer_frames {
                        break;
                    }
                    for c in 0..channels {
                        let sample = data.samples[src * buffer_channels + c.min(buffer_channels - 1)];
                        out[frame * channels + c] += sample * voice.gain;
                    }
                    voice.cursor += step;
                    frame += 1;
                }

                if voice.cursor as usize >= buffer_frames {
                    voice.cursor = (voice.cursor - buffer_frames as f64).max(0.0);
                    voice.processed += 1;
                }
            }

            if voice.processed >= voice.queue.len() {
                // Ran dry: hardware underrun (or the natural end)
                voice.playing = false;
                voice.cursor = 0.0;
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
        state.rendered_frames += frames as u64;
    }
}

impl PoolState {
    fn voice_mut(&mut self, voice: VoiceId) -> Option<&mut Voice> {
        if self.closed {
            return None;
        }
        self.voices.get_mut(voice.0 as usize).filter(|v| v.in_use)
    }

    fn voice(&self, voice: VoiceId) -> Option<&Voice> {
        if self.closed {
            return None;
        }
        self.voices.get(voice.0 as usize).filter(|v| v.in_use)
    }
}

impl VoicePool for SoftwareVoicePool {
    fn try_acquire(&self) -> Option<VoiceId> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        let index = state.voices.iter().position(|v| !v.in_use)?;
        let voice = &mut state.voices[index];
        voice.reset();
        voice.in_use = true;
        Some(VoiceId(index as u32))
    }

    fn release(&self, voice: VoiceId) {
        if let Some(v) = self.lock().voice_mut(voice) {
            v.reset();
        }
    }

    fn play(&self, voice: VoiceId) {
        if let Some(v) = self.lock().voice_mut(voice) {
            if !v.playing {
                v.processed = 0;
                v.cursor = 0.0;
            }
            v.playing = v.processed < v.queue.len();
        }
    }

    fn stop(&self, voice: VoiceId) {
        if let Some(v) = self.lock().voice_mut(voice) {
            v.playing = false;
            v.processed = v.queue.len();
            v.cursor = 0.0;
        }
    }

    fn is_playing(&self, voice: VoiceId) -> bool {
        self.lock().voice(voice).map_or(false, |v| v.playing)
    }

    fn set_gain(&self, voice: VoiceId, gain: f32) {
        if let Some(v) = self.lock().voice_mut(voice) {
            v.gain = gain.max(0.0);
        }
    }

    fn queue_buffers(&self, voice: VoiceId, buffers: &[BufferId]) -> Result<()> {
        let mut state = self.lock();
        if let Some(missing) = buffers.iter().find(|b| !state.buffers.contains_key(*b)) {
            return Err(Error::Backend(format!("Cannot queue unknown {}", missing)));
        }
        let v = state
            .voice_mut(voice)
            .ok_or_else(|| Error::Backend(format!("Cannot queue to inactive {}", voice)))?;
        v.queue.extend(buffers.iter().copied());
        Ok(())
    }

    fn unqueue_buffers(&self, voice: VoiceId, out: &mut [BufferId]) -> usize {
        let mut state = self.lock();
        let Some(v) = state.voice_mut(voice) else {
            return 0;
        };
        let count = out.len().min(v.processed);
        for slot in out.iter_mut().take(count) {
            if let Some(buffer) = v.queue.pop_front() {
                *slot = buffer;
            }
        }
        v.processed -= count;
        count
    }

    fn processed_count(&self, voice: VoiceId) -> usize {
        self.lock().voice(voice).map_or(0, |v| v.processed)
    }

    fn queued_count(&self, voice: VoiceId) -> usize {
        self.lock().voice(voice).map_or(0, |v| v.queue.len())
    }

    fn generate_buffers(&self, count: usize) -> Result<Vec<BufferId>> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::Backend("Voice pool is closed".to_string()));
        }
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = BufferId(state.next_buffer);
            state.next_buffer += 1;
            state.buffers.insert(id, BufferData::default());
            ids.push(id);
        }
        Ok(ids)
    }

    fn delete_buffers(&self, buffers: &[BufferId]) {
        let mut state = self.lock();
        for buffer in buffers {
            state.buffers.remove(buffer);
        }
    }

    fn buffer_data(
        &self,
        buffer: BufferId,
        channels: u16,
        sample_rate: u32,
        data: PcmSlice<'_>,
    ) -> Result<()> {
        if matches!(data, PcmSlice::Float32(_)) && !self.float32 {
            return Err(Error::Backend("Float32 buffers not supported".to_string()));
        }
        let samples = data.to_f32();

        let mut state = self.lock();
        if state.closed {
            return Err(Error::Backend("Voice pool is closed".to_string()));
        }
        let slot = state
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| Error::Backend(format!("Unknown {}", buffer)))?;
        *slot = BufferData {
            channels,
            sample_rate,
            samples,
        };
        Ok(())
    }

    fn supports_float32(&self) -> bool {
        self.float32
    }
}
