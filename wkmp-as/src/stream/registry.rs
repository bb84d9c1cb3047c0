//! Registry of live streams
//!
//! One mutex guards every `StreamEngine`, the last known device lists and
//! the current voice pool. Application calls (through `StreamHandle`) and the
//! monitor's advance sweep both go through it, so a stream never sees a
//! control call in the middle of a tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;
use wkmp_common::events::{EventBus, SoundCategory};
use wkmp_common::params::AudioParams;

use super::engine::StreamEngine;
use super::lifecycle::{LoadState, Lifecycle};
use super::StreamId;
use crate::audio::Decoder;
use crate::backend::VoicePool;
use crate::error::{Error, Result};

/// Device names from the last successful enumeration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceLists {
    pub playback: Vec<String>,
    pub capture: Vec<String>,
}

struct Entry {
    lifecycle: Lifecycle,
    engine: Option<StreamEngine>,
}

/// Everything behind the registry mutex
pub struct RegistryState {
    entries: HashMap<StreamId, Entry>,
    devices: DeviceLists,
    pool: Option<Arc<dyn VoicePool>>,
}

impl RegistryState {
    /// Ready engine for `id`
    ///
    /// # Errors
    /// - `StreamNotFound` for unknown or released streams
    /// - `NotReady` while loading or after a failed load
    pub fn engine_mut(&mut self, id: StreamId) -> Result<&mut StreamEngine> {
        let entry = self.entries.get_mut(&id).ok_or(Error::StreamNotFound(id))?;
        match (&mut entry.engine, entry.lifecycle.state()) {
            (Some(engine), _) => Ok(engine),
            (None, LoadState::Failed(reason)) => {
                Err(Error::NotReady(format!("stream {} failed to load: {}", id, reason)))
            }
            (None, _) => Err(Error::NotReady(format!("stream {} is still loading", id))),
        }
    }

    /// Every ready engine
    pub fn engines_mut(&mut self) -> impl Iterator<Item = &mut StreamEngine> {
        self.entries.values_mut().filter_map(|e| e.engine.as_mut())
    }

    pub fn engines(&self) -> impl Iterator<Item = &StreamEngine> {
        self.entries.values().filter_map(|e| e.engine.as_ref())
    }

    pub fn lifecycle(&self, id: StreamId) -> Option<&Lifecycle> {
        self.entries.get(&id).map(|e| &e.lifecycle)
    }

    pub fn stream_ids(&self) -> Vec<StreamId> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn devices(&self) -> &DeviceLists {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut DeviceLists {
        &mut self.devices
    }

    pub fn pool(&self) -> Option<Arc<dyn VoicePool>> {
        self.pool.clone()
    }

    pub fn set_pool(&mut self, pool: Option<Arc<dyn VoicePool>>) {
        self.pool = pool;
    }
}

struct Shared {
    state: Mutex<RegistryState>,
    loaded: Condvar,
    params: Arc<AudioParams>,
    events: EventBus,
}

/// Cheap-to-clone handle to the shared registry
#[derive(Clone)]
pub struct StreamRegistry {
    shared: Arc<Shared>,
}

impl StreamRegistry {
    pub fn new(params: Arc<AudioParams>, events: EventBus) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RegistryState {
                    entries: HashMap::new(),
                    devices: DeviceLists::default(),
                    pool: None,
                }),
                loaded: Condvar::new(),
                params,
                events,
            }),
        }
    }

    /// Acquire the registry mutex, recovering from poisoning
    pub fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.shared.state.lock().unwrap_or_else(|poisoned| {
            warn!("Stream registry mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn params(&self) -> &Arc<AudioParams> {
        &self.shared.params
    }

    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    /// Build an engine around `decoder` and register it
    pub fn insert(&self, decoder: Box<dyn Decoder>, category: SoundCategory) -> Result<StreamId> {
        let id = Uuid::new_v4();
        let mut state = self.lock();
        let engine = StreamEngine::open(
            id,
            decoder,
            state.pool.clone(),
            Arc::clone(&self.shared.params),
            self.shared.events.clone(),
            category,
        )?;
        state.entries.insert(
            id,
            Entry {
                lifecycle: Lifecycle::ready(),
                engine: Some(engine),
            },
        );
        debug!("Registered stream {}", id);
        Ok(id)
    }

    /// Register a stream whose decoder is still being opened
    pub(crate) fn insert_loading(&self) -> StreamId {
        let id = Uuid::new_v4();
        self.lock().entries.insert(
            id,
            Entry {
                lifecycle: Lifecycle::loading(),
                engine: None,
            },
        );
        id
    }

    /// Loader thread callback: attach the engine unless the load was
    /// cancelled or the stream released meanwhile
    pub(crate) fn complete_load(
        &self,
        id: StreamId,
        category: SoundCategory,
        result: Result<Box<dyn Decoder>>,
        cancel: &AtomicBool,
    ) {
        let mut state = self.lock();
        let pool = state.pool.clone();

        if cancel.load(Ordering::Acquire) {
            debug!("Load of stream {} cancelled", id);
        } else if let Some(entry) = state.entries.get_mut(&id) {
            let engine = result.and_then(|decoder| {
                StreamEngine::open(
                    id,
                    decoder,
                    pool,
                    Arc::clone(&self.shared.params),
                    self.shared.events.clone(),
                    category,
                )
            });
            match engine {
                Ok(engine) => {
                    entry.engine = Some(engine);
                    entry.lifecycle.mark_ready();
                    debug!("Stream {} loaded", id);
                }
                Err(e) => {
                    warn!("Stream {} failed to load: {}", id, e);
                    entry.lifecycle.mark_failed(e.to_string());
                }
            }
        }

        drop(state);
        self.shared.loaded.notify_all();
    }

    /// Block until stream `id` leaves Loading, or `timeout` passes
    pub fn wait_until_loaded(&self, id: StreamId, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            let lifecycle = state.lifecycle(id).ok_or(Error::StreamNotFound(id))?;
            match lifecycle.state() {
                LoadState::Ready => return Ok(()),
                LoadState::Failed(reason) => {
                    return Err(Error::NotReady(format!("stream {} failed to load: {}", id, reason)))
                }
                LoadState::Released => return Err(Error::StreamNotFound(id)),
                LoadState::Loading => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::NotReady(format!("stream {} still loading after {:?}", id, timeout)));
            }
            let (guard, _) = self
                .shared
                .loaded
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Run `f` on a ready engine while holding the mutex
    pub fn with_engine<R>(&self, id: StreamId, f: impl FnOnce(&mut StreamEngine) -> R) -> Result<R> {
        let mut state = self.lock();
        let engine = state.engine_mut(id)?;
        Ok(f(engine))
    }

    /// One housekeeping tick for every stream
    pub fn advance_all(&self) {
        let mut state = self.lock();
        for engine in state.engines_mut() {
            engine.advance();
        }
    }

    /// Tear down a stream's hardware resources and forget it
    pub fn release(&self, id: StreamId) -> Result<()> {
        let mut state = self.lock();
        let mut entry = state.entries.remove(&id).ok_or(Error::StreamNotFound(id))?;
        if let Some(mut engine) = entry.engine.take() {
            engine.release();
        }
        entry.lifecycle.mark_released();
        drop(state);

        self.shared.loaded.notify_all();
        debug!("Released stream {}", id);
        Ok(())
    }

    /// Reapply voice gains after a master or category volume change
    pub fn apply_gains(&self) {
        let state = self.lock();
        for engine in state.engines() {
            engine.apply_gain();
        }
    }

    /// Steps 2-3 of the reinit protocol: release every stream's hardware and
    /// drop the pool
    pub fn release_all_for_reinit(&self) {
        let mut state = self.lock();
        for engine in state.engines_mut() {
            engine.release_for_reinit();
        }
        state.pool = None;
        info!("Released {} streams for reinit", state.len());
    }

    /// Step 5 of the reinit protocol: attach every stream to `pool`
    pub fn restore_all(&self, pool: Option<Arc<dyn VoicePool>>) {
        let mut state = self.lock();
        state.pool = pool.clone();
        for engine in state.engines_mut() {
            engine.restore_after_reinit(pool.clone());
        }
    }

    /// Stop every stream (reporting `Released`) and detach it from the pool
    pub fn release_hardware(&self) {
        let mut state = self.lock();
        for engine in state.engines_mut() {
            engine.release();
        }
        state.pool = None;
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn devices(&self) -> DeviceLists {
        self.lock().devices.clone()
    }

    pub fn has_pool(&self) -> bool {
        self.lock().pool.is_some()
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("StreamRegistry")
            .field("streams", &state.len())
            .field("devices", &state.devices)
            .field("has_pool", &state.pool.is_some())
            .finish()
    }
}
