//! Device monitoring thread
//!
//! The monitor thread drives every stream's `advance` tick and watches the
//! device lists. Two variants, chosen once at start:
//! - backends with native hot-plug events: events arrive through a bounded
//!   channel and are handled between ticks
//! - everything else: the playback list is re-enumerated every
//!   `device_check_interval` and compared with the last known list
//!
//! A detected change sets the shared reinit flag and emits
//! `ReinitRequested`. The rebuild itself runs on the application thread
//! (`AudioSubsystem::service`), which stops this thread first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, error, info, warn};
use wkmp_common::events::{AudioEvent, EventBus};
use wkmp_common::params::AudioParams;

use crate::backend::{DeviceBackend, HotplugEvent};
use crate::error::{Error, Result};
use crate::stream::{DeviceLists, StreamRegistry};

/// Attempts per enumeration before giving up
pub const ENUMERATION_ATTEMPTS: u32 = 3;

const ENUMERATION_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Sleep while waiting to be stopped for a reinit
const REINIT_WAIT_SLEEP: Duration = Duration::from_millis(50);

const HOTPLUG_QUEUE_CAPACITY: usize = 32;

/// Count differences between a known and a fresh device list.
///
/// Compared index by index from both sides: each position where the known
/// list disagrees with the fresh one counts, each position where the fresh
/// list disagrees with the known one counts, and a length difference counts
/// once more.
pub fn count_discrepancies(known: &[String], fresh: &[String]) -> usize {
    let missing = known
        .iter()
        .enumerate()
        .filter(|(i, name)| fresh.get(*i) != Some(*name))
        .count();
    let extra = fresh
        .iter()
        .enumerate()
        .filter(|(i, name)| known.get(*i) != Some(*name))
        .count();
    let length = usize::from(known.len() != fresh.len());
    missing + extra + length
}

/// Query one device list, retrying transient failures
pub fn enumerate_with_retry(backend: &dyn DeviceBackend, playback: bool) -> Result<Vec<String>> {
    let mut last_error = String::new();
    for attempt in 1..=ENUMERATION_ATTEMPTS {
        let result = if playback {
            backend.playback_device_names()
        } else {
            backend.capture_device_names()
        };
        match result {
            Ok(names) => return Ok(names),
            Err(e) => {
                debug!("Device enumeration attempt {} failed: {}", attempt, e);
                last_error = e.to_string();
                if attempt < ENUMERATION_ATTEMPTS {
                    thread::sleep(ENUMERATION_RETRY_DELAY);
                }
            }
        }
    }
    Err(Error::DeviceEnumeration {
        attempts: ENUMERATION_ATTEMPTS,
        message: last_error,
    })
}

/// Device list bookkeeping and the per-tick logic of the monitor thread
pub struct DeviceMonitor {
    backend: Arc<dyn DeviceBackend>,
    registry: StreamRegistry,
    params: Arc<AudioParams>,
    events: EventBus,
    reinit_pending: Arc<AtomicBool>,
    hotplug: Option<mpsc::Receiver<HotplugEvent>>,
    next_check: Instant,
}

impl DeviceMonitor {
    /// Create the monitor. Backends with hot-plug support get the sending
    /// side of a bounded event channel.
    pub fn new(
        backend: Arc<dyn DeviceBackend>,
        registry: StreamRegistry,
        reinit_pending: Arc<AtomicBool>,
    ) -> Self {
        let hotplug = if backend.supports_hotplug() {
            let (tx, rx) = mpsc::channel(HOTPLUG_QUEUE_CAPACITY);
            backend.set_hotplug_sender(tx);
            Some(rx)
        } else {
            None
        };

        let params = Arc::clone(registry.params());
        let events = registry.events().clone();
        Self {
            backend,
            registry,
            next_check: Instant::now() + params.device_check_interval(),
            params,
            events,
            reinit_pending,
            hotplug,
        }
    }

    pub fn uses_hotplug(&self) -> bool {
        self.hotplug.is_some()
    }

    pub fn next_check(&self) -> Instant {
        self.next_check
    }

    /// Push the next scan one interval past `now`
    pub fn reschedule(&mut self, now: Instant) {
        self.next_check = now + self.params.device_check_interval();
    }

    /// Replace both device lists from a fresh enumeration.
    ///
    /// A list whose query keeps failing is left as it was.
    pub fn enumerate_devices(&self) -> DeviceLists {
        let playback = enumerate_with_retry(self.backend.as_ref(), true);
        let capture = enumerate_with_retry(self.backend.as_ref(), false);

        let mut state = self.registry.lock();
        let lists = state.devices_mut();
        match playback {
            Ok(names) => lists.playback = names,
            Err(e) => error!("Playback device enumeration failed, keeping stale list: {}", e),
        }
        match capture {
            Ok(names) => lists.capture = names,
            Err(e) => error!("Capture device enumeration failed, keeping stale list: {}", e),
        }
        info!(
            "Devices: {} playback, {} capture",
            lists.playback.len(),
            lists.capture.len()
        );
        lists.clone()
    }

    /// Sampled comparison of the live playback list against the known one.
    ///
    /// Returns false when a reinit was requested; the caller should stop
    /// polling until it happens. A failing query counts as "no change".
    pub fn verify(&mut self, now: Instant) -> bool {
        if now < self.next_check {
            return true;
        }

        let fresh = match enumerate_with_retry(self.backend.as_ref(), true) {
            Ok(names) => names,
            Err(e) => {
                error!("Device check skipped: {}", e);
                self.reschedule(now);
                return true;
            }
        };
        let fresh_capture = enumerate_with_retry(self.backend.as_ref(), false).ok();

        let (discrepancies, capture_changed) = {
            let mut state = self.registry.lock();
            let lists = state.devices_mut();
            let discrepancies = count_discrepancies(&lists.playback, &fresh);
            let capture_changed = match fresh_capture {
                Some(capture) if capture != lists.capture => {
                    lists.capture = capture;
                    true
                }
                _ => false,
            };
            (discrepancies, capture_changed)
        };

        if capture_changed {
            info!("Capture device list changed");
            self.emit_list_changed(false);
        }

        if discrepancies > 0 {
            warn!(
                "Playback device list changed ({} discrepancies), requesting reinit",
                discrepancies
            );
            self.emit_list_changed(true);
            self.request_reinit(discrepancies);
            return false;
        }

        self.reschedule(now);
        true
    }

    /// Handle queued hot-plug events. Returns false if a reinit was
    /// requested.
    pub fn drain_hotplug(&mut self) -> bool {
        let mut healthy = true;
        loop {
            let event = match self.hotplug.as_mut().map(|rx| rx.try_recv()) {
                Some(Ok(event)) => event,
                Some(Err(TryRecvError::Empty)) | None => break,
                Some(Err(TryRecvError::Disconnected)) => {
                    warn!("Hot-plug channel closed by backend");
                    self.hotplug = None;
                    break;
                }
            };
            if !self.handle_hotplug(event) {
                healthy = false;
            }
        }
        healthy
    }

    fn handle_hotplug(&mut self, event: HotplugEvent) -> bool {
        info!("Hot-plug event: {:?}", event);
        let is_playback = event.is_playback();
        self.emit_list_changed(is_playback);

        if !is_playback {
            // Capture changes need no rebuild, only a fresh list
            match enumerate_with_retry(self.backend.as_ref(), false) {
                Ok(names) => self.registry.lock().devices_mut().capture = names,
                Err(e) => error!("Capture device enumeration failed: {}", e),
            }
            return true;
        }

        let discrepancies = match enumerate_with_retry(self.backend.as_ref(), true) {
            Ok(fresh) => count_discrepancies(&self.registry.lock().devices().playback, &fresh),
            Err(e) => {
                // Can't tell what changed: rebuild anyway
                error!("Playback device enumeration failed: {}", e);
                1
            }
        };
        if discrepancies == 0 {
            debug!("Playback device list unchanged after hot-plug event");
            return true;
        }
        self.request_reinit(discrepancies);
        false
    }

    /// Set the reinit flag and announce it. False if one was already pending.
    pub fn request_reinit(&self, discrepancies: usize) -> bool {
        if self
            .reinit_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Reinit already pending");
            return false;
        }
        self.events.emit_lossy(AudioEvent::ReinitRequested {
            discrepancies,
            timestamp: Utc::now(),
        });
        true
    }

    fn emit_list_changed(&self, is_playback: bool) {
        self.events.emit_lossy(AudioEvent::DeviceListChanged {
            is_playback,
            timestamp: Utc::now(),
        });
    }

    /// Run the monitor loop on its own thread
    pub fn start(mut self) -> Result<MonitorThread> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        self.reschedule(Instant::now());

        let handle = thread::Builder::new()
            .name("wkmp-as-monitor".to_string())
            .spawn(move || self.run(&thread_stop))
            .map_err(|e| Error::Backend(format!("Failed to spawn monitor thread: {}", e)))?;

        Ok(MonitorThread {
            stop,
            handle: Some(handle),
        })
    }

    fn run(mut self, stop: &AtomicBool) -> Self {
        info!(
            "Device monitor started ({})",
            if self.uses_hotplug() { "hot-plug events" } else { "polling" }
        );

        while !stop.load(Ordering::Acquire) {
            self.registry.advance_all();
            thread::park_timeout(self.params.monitor_sleep());
            if stop.load(Ordering::Acquire) {
                break;
            }

            if self.uses_hotplug() {
                // Keeps ticking while a reinit is pending
                self.drain_hotplug();
            } else if !self.verify(Instant::now()) {
                while !stop.load(Ordering::Acquire) {
                    thread::park_timeout(REINIT_WAIT_SLEEP);
                }
            }
        }

        info!("Device monitor stopped");
        self
    }
}

/// Running monitor thread. Stopping it hands the monitor back.
pub struct MonitorThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<DeviceMonitor>>,
}

impl MonitorThread {
    /// Signal, wake and join the thread. None if it panicked.
    pub fn stop(mut self) -> Option<DeviceMonitor> {
        self.stop_inner()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    fn stop_inner(&mut self) -> Option<DeviceMonitor> {
        let handle = self.handle.take()?;
        self.stop.store(true, Ordering::Release);
        handle.thread().unpark();
        match handle.join() {
            Ok(monitor) => Some(monitor),
            Err(_) => {
                error!("Device monitor thread panicked");
                None
            }
        }
    }
}

impl Drop for MonitorThread {
    fn drop(&mut self) {
        self.stop_inner();
    }
}
