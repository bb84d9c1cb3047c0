//! Per-stream decode and buffer rotation
//!
//! A `StreamEngine` owns one decoder and a small ring of hardware buffers.
//! While playing it borrows a voice from the pool, keeps every buffer either
//! queued on that voice or being refilled, and handles loop regions, seeks
//! and natural end of stream.
//!
//! Every method takes `&mut self`: callers serialize access through the
//! registry mutex (see `StreamRegistry`). Nothing here blocks except the
//! decoder itself.
//!
//! # Positions
//!
//! - `decode_position`: next frame the decoder will produce
//! - `live_position`: end of the last buffer the voice finished playing, i.e.
//!   the position playback can safely resume from
//!
//! Both are in frames. Stopping rewinds the decoder to `live_position`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use wkmp_common::events::{AudioEvent, EventBus, SoundCategory, StopReason, StreamPlayState};
use wkmp_common::params::AudioParams;

use super::StreamId;
use crate::audio::{Decoder, FormatInfo, PcmBuffer, SampleFormat};
use crate::backend::{BufferId, VoiceId, VoicePool};
use crate::error::{Error, Result};

/// Loop counter value meaning "loop forever"
pub const LOOP_INFINITE: i32 = -1;

/// Counters describing what a stream has done so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Frames produced by the decoder into hardware buffers
    pub decoded_samples: u64,
    /// Successful play calls (including restarts)
    pub plays: u64,
    /// Times the voice ran dry and playback was restarted
    pub underruns: u64,
    /// Times decoding jumped back to the loop start
    pub loop_wraps: u64,
}

/// Loop region and remaining repeat count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopRegion {
    pub begin: u64,
    pub end: u64,
    /// 0 = play to `end` and stop, -1 = infinite, n > 0 = n more repeats
    pub counter: i32,
}

/// One hardware buffer and the stream range it currently holds
#[derive(Debug, Clone, Copy)]
struct BufferSlot {
    id: BufferId,
    start: u64,
    samples: u64,
}

/// Outcome of hitting the end of the loop region while refilling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    /// Loop count used up, nothing more to decode
    End,
    /// Jumped back to the loop start and refilled the buffer
    Wrapped,
    /// Jumped back but the loop region produced nothing
    Exhausted,
}

pub struct StreamEngine {
    id: StreamId,
    decoder: Box<dyn Decoder>,
    format: FormatInfo,
    category: SoundCategory,
    params: Arc<AudioParams>,
    events: EventBus,
    pool: Option<Arc<dyn VoicePool>>,
    slots: Vec<BufferSlot>,
    buffer_frames: usize,
    scratch: PcmBuffer,
    unqueue_scratch: Vec<BufferId>,
    requeue_scratch: Vec<BufferId>,
    voice: Option<VoiceId>,
    decode_position: u64,
    live_position: u64,
    loop_begin: u64,
    loop_end: u64,
    loop_counter: i32,
    state: StreamPlayState,
    volume: f32,
    metadata: BTreeMap<String, String>,
    stats: StreamStats,
}

impl StreamEngine {
    /// Build an engine around an opened decoder.
    ///
    /// Validates the channel count, picks the upload format the pool
    /// supports, sizes the buffer ring and allocates its handles. With no
    /// pool (audio unavailable) the handles are allocated by
    /// `restore_after_reinit` once a device comes back.
    ///
    /// # Errors
    /// - `UnsupportedFormat` for anything but mono or stereo
    /// - `Backend` if buffer handles cannot be allocated
    pub fn open(
        id: StreamId,
        decoder: Box<dyn Decoder>,
        pool: Option<Arc<dyn VoicePool>>,
        params: Arc<AudioParams>,
        events: EventBus,
        category: SoundCategory,
    ) -> Result<Self> {
        let info = decoder.info();
        if !(1..=2).contains(&info.channels) {
            return Err(Error::UnsupportedFormat {
                channels: info.channels,
            });
        }

        let sample_format = select_format(pool.as_deref());
        let format = FormatInfo {
            channels: info.channels,
            sample_rate: info.sample_rate,
            sample_format,
            total_samples: info.total_samples,
        };

        let buffer_frames = params.buffer_sample_size().max(1);
        let count = buffer_count(
            info.total_samples,
            buffer_frames,
            params.max_buffer_count(),
        );

        let ids = match pool.as_ref() {
            Some(pool) => pool.generate_buffers(count)?,
            None => Vec::new(),
        };
        let metadata = decoder.metadata_tags();

        debug!(
            "Opened stream {}: {} ch, {} Hz, {} frames, {} buffers of {} frames ({:?})",
            id, format.channels, format.sample_rate, format.total_samples, count, buffer_frames,
            sample_format
        );

        Ok(Self {
            id,
            decoder,
            format,
            category,
            params,
            events,
            pool,
            slots: ids.into_iter().map(BufferSlot::new).collect(),
            buffer_frames,
            scratch: PcmBuffer::new(sample_format, buffer_frames, format.channels),
            unqueue_scratch: vec![BufferId::default(); count],
            requeue_scratch: Vec::with_capacity(count),
            voice: None,
            decode_position: 0,
            live_position: 0,
            loop_begin: 0,
            loop_end: format.total_samples,
            loop_counter: 0,
            state: StreamPlayState::Standby,
            volume: 1.0,
            metadata,
            stats: StreamStats::default(),
        })
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn state(&self) -> StreamPlayState {
        self.state
    }

    pub fn format(&self) -> FormatInfo {
        self.format
    }

    pub fn category(&self) -> SoundCategory {
        self.category
    }

    /// Safe resume position in frames
    pub fn tell(&self) -> u64 {
        self.live_position
    }

    pub fn decode_position(&self) -> u64 {
        self.decode_position
    }

    pub fn loop_region(&self) -> LoopRegion {
        LoopRegion {
            begin: self.loop_begin,
            end: self.loop_end,
            counter: self.loop_counter,
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn has_voice(&self) -> bool {
        self.voice.is_some()
    }

    /// Voice borrowed from the pool, while Playing or Finishing
    pub fn voice(&self) -> Option<VoiceId> {
        self.voice
    }

    /// Size of the buffer ring
    pub fn buffer_count(&self) -> usize {
        self.unqueue_scratch.len()
    }

    /// Start (or restart) playback.
    ///
    /// Returns Ok(false) without changing state when no voice is free or
    /// audio is unavailable.
    ///
    /// # Errors
    /// `RebufferExhausted` or a decode error when nothing could be buffered;
    /// the stream is left in Standby.
    pub fn play(&mut self) -> Result<bool> {
        let Some(pool) = self.pool.clone() else {
            warn!("Stream {}: audio unavailable, play ignored", self.id);
            return Ok(false);
        };
        let previous = self.state;

        let voice = match self.voice {
            Some(voice) => {
                // Restart: flush and resume from the last confirmed position
                pool.stop(voice);
                self.drain_voice(pool.as_ref(), voice);
                self.seek_raw(self.live_position)?;
                voice
            }
            None => match pool.try_acquire() {
                Some(voice) => voice,
                None => {
                    warn!("Stream {}: {}, play ignored", self.id, Error::VoiceExhausted);
                    return Ok(false);
                }
            },
        };
        self.voice = Some(voice);
        self.apply_gain();

        match self.full_rebuffer(true) {
            Ok(0) => {
                debug!("Stream {}: nothing to buffer, staying stopped", self.id);
                self.stop_with(StopReason::RebufferFailed);
                return Ok(false);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Stream {}: rebuffer failed on play: {}", self.id, e);
                self.stop_with(StopReason::RebufferFailed);
                return Err(e);
            }
        }

        pool.play(voice);
        self.state = StreamPlayState::Playing;
        self.stats.plays += 1;
        self.events.emit_lossy(AudioEvent::StreamPlay {
            stream_id: self.id,
            previous_state: previous,
            timestamp: Utc::now(),
        });
        info!("Stream {} playing from {}", self.id, self.live_position);
        Ok(true)
    }

    /// Stop on request
    pub fn stop(&mut self) {
        self.stop_with(StopReason::Requested);
    }

    /// Stop playback and give the voice back. No-op without a voice.
    pub fn stop_with(&mut self, reason: StopReason) {
        let Some(voice) = self.voice.take() else {
            return;
        };

        if let Some(pool) = self.pool.clone() {
            pool.stop(voice);
            if reason != StopReason::NoUnqueueNeeded {
                self.drain_voice(pool.as_ref(), voice);
            }
            pool.release(voice);
        }

        if let Err(e) = self.seek_raw(self.live_position) {
            warn!("Stream {}: rewind to {} failed: {}", self.id, self.live_position, e);
        }

        let previous = std::mem::replace(&mut self.state, StreamPlayState::Standby);
        if !matches!(
            previous,
            StreamPlayState::Standby | StreamPlayState::WasPlaying
        ) {
            self.events.emit_lossy(AudioEvent::StreamStop {
                stream_id: self.id,
                previous_state: previous,
                reason,
                timestamp: Utc::now(),
            });
        }
        debug!("Stream {} stopped ({}), was {}", self.id, reason, previous);
    }

    /// Move playback to frame `position`.
    ///
    /// A playing stream is flushed and refilled from the new position.
    ///
    /// # Errors
    /// `InvalidSeek` if `position` is past the end of the stream
    pub fn seek(&mut self, position: u64) -> Result<()> {
        if position > self.format.total_samples {
            return Err(Error::InvalidSeek {
                position,
                total: self.format.total_samples,
            });
        }

        let (Some(pool), Some(voice)) = (self.pool.clone(), self.voice) else {
            return self.seek_raw(position);
        };

        pool.stop(voice);
        self.drain_voice(pool.as_ref(), voice);
        self.seek_raw(position)?;

        match self.full_rebuffer(true) {
            Ok(filled) if filled > 0 => {
                pool.play(voice);
                self.state = StreamPlayState::Playing;
                Ok(())
            }
            Ok(_) => {
                self.stop_with(StopReason::RebufferFailed);
                Ok(())
            }
            Err(e) => {
                warn!("Stream {}: rebuffer after seek failed: {}", self.id, e);
                self.stop_with(StopReason::RebufferFailed);
                Err(e)
            }
        }
    }

    /// Seek by time offset in seconds
    pub fn seek_seconds(&mut self, seconds: f64) -> Result<()> {
        self.seek(self.format.seconds_to_samples(seconds))
    }

    /// Set the loop region `[begin, end)` and repeat count.
    ///
    /// # Errors
    /// - `InvalidLoopRegion` unless `begin <= end <= total`
    /// - `InvalidLoopCount` for counts below -1
    pub fn set_loop(&mut self, begin: u64, end: u64, counter: i32) -> Result<()> {
        let total = self.format.total_samples;
        if begin > end || end > total {
            return Err(Error::InvalidLoopRegion { begin, end, total });
        }
        if counter < LOOP_INFINITE {
            return Err(Error::InvalidLoopCount(counter));
        }
        self.loop_begin = begin;
        self.loop_end = end;
        self.loop_counter = counter;
        Ok(())
    }

    /// Stream gain, clamped to [0, 1]
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.apply_gain();
    }

    /// Push stream × master × category gain to the voice
    pub fn apply_gain(&self) {
        if let (Some(pool), Some(voice)) = (self.pool.as_ref(), self.voice) {
            pool.set_gain(voice, self.volume * self.params.combined_gain(self.category));
        }
    }

    /// Per-tick housekeeping. Errors are handled here: a stream that cannot
    /// continue ends up in Standby.
    pub fn advance(&mut self) {
        match self.state {
            StreamPlayState::Standby | StreamPlayState::WasPlaying => {}
            StreamPlayState::Finishing => self.advance_finishing(),
            StreamPlayState::Playing => self.advance_playing(),
        }
    }

    fn advance_finishing(&mut self) {
        let (Some(pool), Some(voice)) = (self.pool.clone(), self.voice) else {
            self.state = StreamPlayState::Standby;
            return;
        };

        if pool.queued_count(voice) == 0 {
            self.stop_with(StopReason::NoUnqueueNeeded);
            return;
        }

        // Drain without moving live_position: the stream already rewound to 0
        pool.unqueue_buffers(voice, &mut self.unqueue_scratch);
        if pool.queued_count(voice) == 0 {
            self.stop_with(StopReason::UnqueueNeeded);
        }
    }

    fn advance_playing(&mut self) {
        let (Some(pool), Some(voice)) = (self.pool.clone(), self.voice) else {
            self.state = StreamPlayState::Standby;
            return;
        };

        if !pool.is_playing(voice) {
            self.recover_underrun(pool.as_ref(), voice);
            return;
        }

        let processed = pool.processed_count(voice).min(self.unqueue_scratch.len());
        if processed == 0 {
            return;
        }
        let count = pool.unqueue_buffers(voice, &mut self.unqueue_scratch[..processed]);

        let mut requeue = std::mem::take(&mut self.requeue_scratch);
        requeue.clear();
        let mut finished = false;

        for i in 0..count {
            let id = self.unqueue_scratch[i];
            let Some(slot) = self.slot_index(id) else {
                continue;
            };
            if finished {
                continue;
            }
            self.mark_played(slot);

            let filled = match self.rebuffer(slot) {
                Ok(true) => Ok(Boundary::Wrapped),
                Ok(false) => self.on_loop_boundary(slot, false),
                Err(e) => Err(e),
            };

            match filled {
                Ok(Boundary::Wrapped) => requeue.push(id),
                Ok(Boundary::End) => {
                    debug!("Stream {} reached end of loop region, finishing", self.id);
                    self.state = StreamPlayState::Finishing;
                    if let Err(e) = self.seek_raw(0) {
                        warn!("Stream {}: rewind after end failed: {}", self.id, e);
                    }
                    finished = true;
                }
                Ok(Boundary::Exhausted) => {
                    warn!("Stream {}: loop region produced no audio", self.id);
                    self.stop_with(StopReason::LoopRebufferFailed);
                    if let Err(e) = self.seek_raw(0) {
                        warn!("Stream {}: rewind failed: {}", self.id, e);
                    }
                    self.requeue_scratch = requeue;
                    return;
                }
                Err(e) => {
                    warn!("Stream {}: rebuffer failed: {}", self.id, e);
                    self.stop_with(StopReason::RebufferFailed);
                    self.requeue_scratch = requeue;
                    return;
                }
            }
        }

        if !requeue.is_empty() {
            if let Err(e) = pool.queue_buffers(voice, &requeue) {
                warn!("Stream {}: requeue failed: {}", self.id, e);
                self.stop_with(StopReason::RebufferFailed);
            }
        }
        self.requeue_scratch = requeue;
    }

    /// The voice stopped on its own: every queued buffer has played
    fn recover_underrun(&mut self, pool: &dyn VoicePool, voice: VoiceId) {
        pool.stop(voice);
        loop {
            let count = pool.unqueue_buffers(voice, &mut self.unqueue_scratch);
            if count == 0 {
                break;
            }
            for i in 0..count {
                if let Some(slot) = self.slot_index(self.unqueue_scratch[i]) {
                    self.mark_played(slot);
                }
            }
        }

        match self.full_rebuffer(false) {
            Ok(0) => {
                // Ran out exactly at the end of the loop region
                if let Err(e) = self.seek_raw(0) {
                    warn!("Stream {}: rewind after end failed: {}", self.id, e);
                }
                self.live_position = 0;
                self.stop_with(StopReason::NoUnqueueNeeded);
            }
            Ok(filled) => {
                self.stats.underruns += 1;
                debug!("Stream {}: underrun, requeued {} buffers", self.id, filled);
                pool.play(voice);
            }
            Err(e) => {
                warn!("Stream {}: rebuffer after underrun failed: {}", self.id, e);
                self.stop_with(StopReason::RebufferFailed);
            }
        }
    }

    /// Fill every buffer and queue the filled prefix on the voice.
    ///
    /// `restart` is set by play/seek/reinit: if the very first buffer cannot
    /// be filled, decoding restarts at the loop start regardless of the loop
    /// counter. Any later boundary follows normal loop counting.
    ///
    /// Returns the number of buffers queued.
    fn full_rebuffer(&mut self, restart: bool) -> Result<usize> {
        let mut filled = 0;
        for slot in 0..self.slots.len() {
            if self.rebuffer(slot)? {
                filled += 1;
                continue;
            }
            match self.on_loop_boundary(slot, restart && filled == 0)? {
                Boundary::Wrapped => filled += 1,
                Boundary::End => break,
                Boundary::Exhausted if filled == 0 => {
                    return Err(Error::RebufferExhausted {
                        loop_begin: self.loop_begin,
                        loop_end: self.loop_end,
                    });
                }
                Boundary::Exhausted => break,
            }
        }

        if filled > 0 {
            if let (Some(pool), Some(voice)) = (self.pool.as_ref(), self.voice) {
                let ids: Vec<BufferId> = self.slots[..filled].iter().map(|s| s.id).collect();
                pool.queue_buffers(voice, &ids)?;
            }
        }
        Ok(filled)
    }

    /// Decode the next chunk into buffer `slot`, stopping at the loop end.
    ///
    /// Returns false when nothing was produced; the buffer is then untouched.
    fn rebuffer(&mut self, slot: usize) -> Result<bool> {
        let Some(pool) = self.pool.clone() else {
            return Ok(false);
        };
        if self.decode_position >= self.loop_end {
            return Ok(false);
        }

        let remaining = self.loop_end - self.decode_position;
        let max_frames = (self.buffer_frames as u64).min(remaining) as usize;
        let produced = self.decoder.decode_into(&mut self.scratch, max_frames)?;
        if produced == 0 {
            return Ok(false);
        }

        let samples = produced * self.format.channels as usize;
        let id = self.slots[slot].id;
        pool.buffer_data(
            id,
            self.format.channels,
            self.format.sample_rate,
            self.scratch.slice(samples),
        )?;

        self.slots[slot].start = self.decode_position;
        self.slots[slot].samples = produced as u64;
        self.decode_position += produced as u64;
        self.stats.decoded_samples += produced as u64;
        Ok(true)
    }

    /// Handle a refill that hit the loop end
    fn on_loop_boundary(&mut self, slot: usize, restart: bool) -> Result<Boundary> {
        if !restart && self.loop_counter == 0 {
            return Ok(Boundary::End);
        }

        self.seek_raw_decoder(self.loop_begin)?;
        if !self.rebuffer(slot)? {
            return Ok(Boundary::Exhausted);
        }
        self.stats.loop_wraps += 1;

        if !restart && self.loop_counter > 0 {
            self.loop_counter -= 1;
            if self.loop_counter == 0 {
                // Last repeat: play through to the end of the stream
                self.loop_end = self.format.total_samples;
            }
        }
        Ok(Boundary::Wrapped)
    }

    /// Give up hardware resources ahead of a device teardown.
    ///
    /// Playing streams become WasPlaying so `restore_after_reinit` can
    /// resume them; a finishing stream is considered done.
    pub fn release_for_reinit(&mut self) {
        let previous = self.state;
        if previous == StreamPlayState::Finishing {
            self.stop_with(StopReason::NoUnqueueNeeded);
        }

        if let Some(pool) = self.pool.take() {
            if let Some(voice) = self.voice.take() {
                pool.stop(voice);
                self.drain_voice(pool.as_ref(), voice);
                pool.release(voice);
            }
            let ids: Vec<BufferId> = self.slots.iter().map(|s| s.id).collect();
            pool.delete_buffers(&ids);
        }
        self.voice = None;
        self.slots.clear();

        if let Err(e) = self.seek_raw(self.live_position) {
            warn!("Stream {}: rewind before reinit failed: {}", self.id, e);
        }
        if previous == StreamPlayState::Playing {
            self.state = StreamPlayState::WasPlaying;
        }
        debug!("Stream {} released for reinit ({} -> {})", self.id, previous, self.state);
    }

    /// Re-attach to a rebuilt audio context.
    ///
    /// Regenerates buffer handles from `pool` and resumes playback if the
    /// stream was playing when the old context went away. Failures leave the
    /// stream in Standby.
    pub fn restore_after_reinit(&mut self, pool: Option<Arc<dyn VoicePool>>) {
        let was_playing = self.state == StreamPlayState::WasPlaying;
        self.pool = pool;
        self.slots.clear();

        let Some(pool) = self.pool.clone() else {
            if was_playing {
                warn!("Stream {}: no audio device, cannot resume", self.id);
            }
            self.state = StreamPlayState::Standby;
            return;
        };

        // New context, new upload format negotiation
        let sample_format = select_format(Some(pool.as_ref()));
        if sample_format != self.format.sample_format {
            self.format.sample_format = sample_format;
            self.scratch = PcmBuffer::new(sample_format, self.buffer_frames, self.format.channels);
        }

        match pool.generate_buffers(self.unqueue_scratch.len()) {
            Ok(ids) => self.slots = ids.into_iter().map(BufferSlot::new).collect(),
            Err(e) => {
                warn!("Stream {}: buffer allocation after reinit failed: {}", self.id, e);
                self.state = StreamPlayState::Standby;
                return;
            }
        }

        if !was_playing {
            self.state = StreamPlayState::Standby;
            return;
        }

        let Some(voice) = pool.try_acquire() else {
            warn!("Stream {}: {} after reinit", self.id, Error::VoiceExhausted);
            self.state = StreamPlayState::Standby;
            return;
        };
        self.voice = Some(voice);
        self.apply_gain();

        match self.full_rebuffer(true) {
            Ok(filled) if filled > 0 => {
                pool.play(voice);
                self.state = StreamPlayState::Playing;
                info!("Stream {} resumed at {} after reinit", self.id, self.live_position);
            }
            Ok(_) => {
                warn!("Stream {}: nothing to resume after reinit", self.id);
                self.stop_with(StopReason::RebufferFailed);
            }
            Err(e) => {
                warn!("Stream {}: resume after reinit failed: {}", self.id, e);
                self.stop_with(StopReason::RebufferFailed);
            }
        }
    }

    /// Stop (reporting `Released`) and free every hardware handle
    pub fn release(&mut self) {
        self.stop_with(StopReason::Released);
        if let Some(pool) = self.pool.take() {
            let ids: Vec<BufferId> = self.slots.iter().map(|s| s.id).collect();
            pool.delete_buffers(&ids);
        }
        self.slots.clear();
    }

    fn slot_index(&self, id: BufferId) -> Option<usize> {
        self.slots.iter().position(|s| s.id == id)
    }

    /// A buffer finished playing: everything up to its end is confirmed
    fn mark_played(&mut self, slot: usize) {
        let slot = self.slots[slot];
        self.live_position = slot.start + slot.samples;
    }

    /// Unqueue everything a stopped voice still holds
    fn drain_voice(&mut self, pool: &dyn VoicePool, voice: VoiceId) {
        while pool.unqueue_buffers(voice, &mut self.unqueue_scratch) > 0 {}
    }

    /// Position both counters, no validation against playback state
    fn seek_raw(&mut self, position: u64) -> Result<()> {
        self.seek_raw_decoder(position)?;
        self.live_position = position;
        Ok(())
    }

    fn seek_raw_decoder(&mut self, position: u64) -> Result<()> {
        self.decoder.seek_to_sample(position)?;
        self.decode_position = position;
        Ok(())
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            if let Some(voice) = self.voice.take() {
                pool.stop(voice);
                pool.release(voice);
            }
            let ids: Vec<BufferId> = self.slots.iter().map(|s| s.id).collect();
            pool.delete_buffers(&ids);
        }
    }
}

impl std::fmt::Debug for StreamEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEngine")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("format", &self.format)
            .field("voice", &self.voice)
            .field("decode_position", &self.decode_position)
            .field("live_position", &self.live_position)
            .field("loop", &self.loop_region())
            .finish()
    }
}

impl BufferSlot {
    fn new(id: BufferId) -> Self {
        Self {
            id,
            start: 0,
            samples: 0,
        }
    }
}

/// Float32 when the pool takes it, Int16 otherwise
fn select_format(pool: Option<&dyn VoicePool>) -> SampleFormat {
    match pool {
        Some(pool) if pool.supports_float32() => SampleFormat::Float32,
        _ => SampleFormat::Int16,
    }
}

/// `clamp(ceil(total / buffer_frames), 1, max)`
pub fn buffer_count(total_samples: u64, buffer_frames: usize, max: usize) -> usize {
    let needed = total_samples.div_ceil(buffer_frames.max(1) as u64);
    (needed.min(max.max(1) as u64) as usize).max(1)
}
