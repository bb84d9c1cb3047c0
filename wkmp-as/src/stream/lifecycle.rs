//! Load lifecycle of a registered stream
//!
//! `Lifecycle` records where a stream is between registration and release.
//! `AsyncLoad` opens a decoder on a background thread and hands it to the
//! registry when done, unless the owner cancelled first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use wkmp_common::events::SoundCategory;

use super::registry::StreamRegistry;
use super::StreamId;
use crate::audio::Decoder;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// Decoder still opening on a loader thread
    Loading,
    /// Engine constructed and usable
    Ready,
    /// Open failed; the reason is kept for the owner
    Failed(String),
    /// Owner released the stream
    Released,
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: LoadState,
    created_at: DateTime<Utc>,
    ready_at: Option<DateTime<Utc>>,
}

impl Lifecycle {
    pub fn loading() -> Self {
        Self {
            state: LoadState::Loading,
            created_at: Utc::now(),
            ready_at: None,
        }
    }

    pub fn ready() -> Self {
        let now = Utc::now();
        Self {
            state: LoadState::Ready,
            created_at: now,
            ready_at: Some(now),
        }
    }

    pub fn mark_ready(&mut self) {
        self.state = LoadState::Ready;
        self.ready_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.state = LoadState::Failed(reason.into());
    }

    pub fn mark_released(&mut self) {
        self.state = LoadState::Released;
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LoadState::Ready
    }

    pub fn is_loading(&self) -> bool {
        self.state == LoadState::Loading
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        self.ready_at
    }

    /// Time from registration to ready, once ready
    pub fn load_duration(&self) -> Option<chrono::Duration> {
        self.ready_at.map(|ready| ready - self.created_at)
    }
}

/// Background decoder open for one stream
///
/// Held by value in the stream's handle. Dropping it cancels the load and
/// joins the loader thread.
pub struct AsyncLoad {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AsyncLoad {
    /// Run `open` on a loader thread, then register the result under `id`
    pub(crate) fn spawn<F>(
        registry: StreamRegistry,
        id: StreamId,
        category: SoundCategory,
        open: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> Result<Box<dyn Decoder>> + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);

        let handle = thread::Builder::new()
            .name("wkmp-as-loader".to_string())
            .spawn(move || {
                let result = open();
                registry.complete_load(id, category, result, &flag);
            })
            .map_err(|e| Error::Backend(format!("Failed to spawn loader thread: {}", e)))?;

        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }

    /// Ask the loader to discard its result
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// True once the loader thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Cancel and wait for the loader thread
    pub fn cancel_and_join(&mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Loader thread panicked");
            } else {
                debug!("Loader thread joined");
            }
        }
    }
}

impl Drop for AsyncLoad {
    fn drop(&mut self) {
        self.cancel_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let mut lifecycle = Lifecycle::loading();
        assert!(lifecycle.is_loading());
        assert!(lifecycle.load_duration().is_none());

        lifecycle.mark_ready();
        assert!(lifecycle.is_ready());
        assert!(lifecycle.load_duration().unwrap() >= chrono::Duration::zero());

        lifecycle.mark_released();
        assert_eq!(lifecycle.state(), &LoadState::Released);
    }

    #[test]
    fn test_failed_keeps_reason() {
        let mut lifecycle = Lifecycle::loading();
        lifecycle.mark_failed("bad header");
        assert_eq!(lifecycle.state(), &LoadState::Failed("bad header".to_string()));
        assert!(!lifecycle.is_ready());
    }
}
