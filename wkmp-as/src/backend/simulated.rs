//! Scriptable device backend
//!
//! Device lists, enumeration failures, open failures and hot-plug delivery
//! are all under the caller's control. Opening a device hands out a
//! `SoftwareVoicePool`; nothing consumes its queues unless the caller does
//! (`SoftwareVoicePool::consume`) or a realtime clock is enabled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{DeviceBackend, HotplugEvent, OpenedDevice, SoftwareVoicePool};
use crate::error::{Error, Result};

const CLOCK_TICK: Duration = Duration::from_millis(10);

struct Clock {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct SimState {
    playback: Vec<String>,
    capture: Vec<String>,
    enumeration_failures: u32,
    open_failures: u32,
    enumeration_calls: u32,
    open_calls: u32,
    sender: Option<mpsc::Sender<HotplugEvent>>,
    pool: Option<Arc<SoftwareVoicePool>>,
    opened_name: Option<String>,
    clock: Option<Clock>,
}

/// In-memory stand-in for an audio device layer
pub struct SimulatedBackend {
    state: Mutex<SimState>,
    voice_count: usize,
    float32: bool,
    hotplug: bool,
    clock_rate: Option<u32>,
}

impl SimulatedBackend {
    pub fn new(playback: &[&str], capture: &[&str]) -> Self {
        Self {
            state: Mutex::new(SimState {
                playback: playback.iter().map(|s| s.to_string()).collect(),
                capture: capture.iter().map(|s| s.to_string()).collect(),
                ..SimState::default()
            }),
            voice_count: 8,
            float32: true,
            hotplug: false,
            clock_rate: None,
        }
    }

    pub fn with_voices(mut self, voice_count: usize) -> Self {
        self.voice_count = voice_count;
        self
    }

    /// Pools opened afterwards only accept 16-bit buffers
    pub fn with_int16_only(mut self) -> Self {
        self.float32 = false;
        self
    }

    /// Report native hot-plug support and push events on device list changes
    pub fn with_hotplug(mut self) -> Self {
        self.hotplug = true;
        self
    }

    /// Consume queued audio in real time at `sample_rate` frames per second
    pub fn with_realtime_clock(mut self, sample_rate: u32) -> Self {
        self.clock_rate = Some(sample_rate);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Simulated backend mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Replace the playback device list, notifying hot-plug listeners
    pub fn set_playback_devices(&self, names: &[&str]) {
        self.replace_devices(names, true);
    }

    /// Replace the capture device list, notifying hot-plug listeners
    pub fn set_capture_devices(&self, names: &[&str]) {
        self.replace_devices(names, false);
    }

    fn replace_devices(&self, names: &[&str], is_playback: bool) {
        let mut state = self.lock();
        let fresh: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        let old = if is_playback {
            std::mem::replace(&mut state.playback, fresh.clone())
        } else {
            std::mem::replace(&mut state.capture, fresh.clone())
        };

        if !self.hotplug {
            return;
        }
        let Some(sender) = state.sender.as_ref() else {
            return;
        };

        let removed = old.iter().filter(|n| !fresh.contains(n)).map(|name| {
            HotplugEvent::Removed {
                name: name.clone(),
                is_playback,
            }
        });
        let added = fresh.iter().filter(|n| !old.contains(n)).map(|name| {
            HotplugEvent::Added {
                name: name.clone(),
                is_playback,
            }
        });
        for event in removed.chain(added) {
            if let Err(e) = sender.try_send(event) {
                warn!("Dropping hot-plug event: {}", e);
            }
        }
    }

    /// Make the next `count` playback enumerations fail
    pub fn fail_next_enumerations(&self, count: u32) {
        self.lock().enumeration_failures = count;
    }

    /// Make the next `count` device opens fail
    pub fn fail_next_opens(&self, count: u32) {
        self.lock().open_failures = count;
    }

    pub fn enumeration_calls(&self) -> u32 {
        self.lock().enumeration_calls
    }

    pub fn open_calls(&self) -> u32 {
        self.lock().open_calls
    }

    /// Pool of the currently open device
    pub fn current_pool(&self) -> Option<Arc<SoftwareVoicePool>> {
        self.lock().pool.clone()
    }

    pub fn opened_device(&self) -> Option<String> {
        self.lock().opened_name.clone()
    }

    fn start_clock(pool: Arc<SoftwareVoicePool>, sample_rate: u32) -> Option<Clock> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let frames_per_tick = (sample_rate as u64 * CLOCK_TICK.as_millis() as u64 / 1000) as usize;

        let spawned = thread::Builder::new()
            .name("wkmp-as-sim-clock".to_string())
            .spawn(move || {
                while !thread_stop.load(Ordering::Acquire) {
                    pool.consume(frames_per_tick);
                    thread::sleep(CLOCK_TICK);
                }
            });

        match spawned {
            Ok(handle) => Some(Clock { stop, handle }),
            Err(e) => {
                warn!("Failed to start simulated clock: {}", e);
                None
            }
        }
    }
}

impl DeviceBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    fn playback_device_names(&self) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.enumeration_calls += 1;
        if state.enumeration_failures > 0 {
            state.enumeration_failures -= 1;
            return Err(Error::DeviceEnumeration {
                attempts: 1,
                message: "simulated enumeration failure".to_string(),
            });
        }
        Ok(state.playback.clone())
    }

    fn capture_device_names(&self) -> Result<Vec<String>> {
        Ok(self.lock().capture.clone())
    }

    fn supports_hotplug(&self) -> bool {
        self.hotplug
    }

    fn set_hotplug_sender(&self, sender: mpsc::Sender<HotplugEvent>) {
        if self.hotplug {
            self.lock().sender = Some(sender);
        }
    }

    fn open(&self, index: Option<usize>) -> Result<OpenedDevice> {
        self.close();

        let mut state = self.lock();
        state.open_calls += 1;
        if state.open_failures > 0 {
            state.open_failures -= 1;
            return Err(Error::DeviceOpen("simulated open failure".to_string()));
        }

        let name = match index.and_then(|i| state.playback.get(i)) {
            Some(name) => name.clone(),
            None => {
                if let Some(i) = index {
                    warn!("Device index {} not available, falling back to default device", i);
                }
                state
                    .playback
                    .first()
                    .cloned()
                    .ok_or_else(|| Error::DeviceOpen("No playback devices available".to_string()))?
            }
        };

        let pool = Arc::new(SoftwareVoicePool::new(self.voice_count, self.float32));
        if let Some(rate) = self.clock_rate {
            state.clock = Self::start_clock(Arc::clone(&pool), rate);
        }
        state.pool = Some(Arc::clone(&pool));
        state.opened_name = Some(name.clone());
        info!("Opened simulated device: {}", name);

        Ok(OpenedDevice { name, pool })
    }

    fn close(&self) {
        let mut state = self.lock();
        if let Some(clock) = state.clock.take() {
            clock.stop.store(true, Ordering::Release);
            if clock.handle.join().is_err() {
                warn!("Simulated clock thread panicked");
            }
        }
        if let Some(pool) = state.pool.take() {
            pool.close();
            debug!("Closed simulated device {:?}", state.opened_name);
        }
        state.opened_name = None;
    }
}

impl Drop for SimulatedBackend {
    fn drop(&mut self) {
        self.close();
    }
}
