//! Owner-facing stream handle
//!
//! Every method here takes the registry mutex for the duration of the call
//! and then delegates to the raw `StreamEngine` operation. Dropping the
//! handle cancels a pending load and releases the stream.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::warn;
use wkmp_common::events::StreamPlayState;

use super::engine::{LoopRegion, StreamStats};
use super::lifecycle::{AsyncLoad, LoadState};
use super::registry::StreamRegistry;
use super::StreamId;
use crate::audio::FormatInfo;
use crate::error::{Error, Result};

pub struct StreamHandle {
    id: StreamId,
    registry: StreamRegistry,
    load: Option<AsyncLoad>,
    released: bool,
}

impl StreamHandle {
    pub(crate) fn new(id: StreamId, registry: StreamRegistry, load: Option<AsyncLoad>) -> Self {
        Self {
            id,
            registry,
            load,
            released: false,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Start playback; Ok(false) if no voice was free or audio is unavailable
    pub fn play(&self) -> Result<bool> {
        self.registry.with_engine(self.id, |e| e.play())?
    }

    pub fn stop(&self) -> Result<()> {
        self.registry.with_engine(self.id, |e| e.stop())
    }

    /// Seek to a frame position
    pub fn seek(&self, position: u64) -> Result<()> {
        self.registry.with_engine(self.id, |e| e.seek(position))?
    }

    pub fn seek_seconds(&self, seconds: f64) -> Result<()> {
        self.registry.with_engine(self.id, |e| e.seek_seconds(seconds))?
    }

    /// Last confirmed playback position in frames
    pub fn tell(&self) -> Result<u64> {
        self.registry.with_engine(self.id, |e| e.tell())
    }

    pub fn set_loop(&self, begin: u64, end: u64, counter: i32) -> Result<()> {
        self.registry.with_engine(self.id, |e| e.set_loop(begin, end, counter))?
    }

    pub fn loop_region(&self) -> Result<LoopRegion> {
        self.registry.with_engine(self.id, |e| e.loop_region())
    }

    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.registry.with_engine(self.id, |e| e.set_volume(volume))
    }

    pub fn state(&self) -> Result<StreamPlayState> {
        self.registry.with_engine(self.id, |e| e.state())
    }

    pub fn format(&self) -> Result<FormatInfo> {
        self.registry.with_engine(self.id, |e| e.format())
    }

    pub fn metadata(&self) -> Result<BTreeMap<String, String>> {
        self.registry.with_engine(self.id, |e| e.metadata().clone())
    }

    pub fn stats(&self) -> Result<StreamStats> {
        self.registry.with_engine(self.id, |e| e.stats())
    }

    /// True while holding a voice (Playing or Finishing)
    pub fn has_voice(&self) -> Result<bool> {
        self.registry.with_engine(self.id, |e| e.has_voice())
    }

    pub fn load_state(&self) -> Result<LoadState> {
        self.registry
            .lock()
            .lifecycle(self.id)
            .map(|l| l.state().clone())
            .ok_or(Error::StreamNotFound(self.id))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.load_state(), Ok(LoadState::Ready))
    }

    /// Block until an asynchronous load finishes
    pub fn wait_until_loaded(&self, timeout: Duration) -> Result<()> {
        self.registry.wait_until_loaded(self.id, timeout)
    }

    /// Cancel any pending load and free the stream now
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        if let Some(mut load) = self.load.take() {
            load.cancel_and_join();
        }
        self.registry.release(self.id)
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            warn!("Releasing stream {} on drop: {}", self.id, e);
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("id", &self.id)
            .field("loading", &self.load.as_ref().map_or(false, |l| !l.is_finished()))
            .finish()
    }
}
