//! Audio subsystem
//!
//! Single owner of the device backend, the stream registry (and through it
//! the current voice pool), the runtime parameters, the event bus and the
//! monitor thread. Built once at startup and torn down on drop.
//!
//! The monitor thread only *requests* a reinit. The application calls
//! `service()` regularly from its own thread; a pending request is carried
//! out there, never on the monitor thread.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use wkmp_common::events::{AudioEvent, EventBus, SoundCategory};
use wkmp_common::params::AudioParams;

use crate::audio::{Decoder, SymphoniaDecoder};
use crate::backend::{DeviceBackend, OpenedDevice};
use crate::device::{DeviceMonitor, MonitorThread};
use crate::error::{Error, Result};
use crate::stream::{AsyncLoad, DeviceLists, StreamHandle, StreamRegistry};

pub struct AudioSubsystem {
    backend: Arc<dyn DeviceBackend>,
    registry: StreamRegistry,
    params: Arc<AudioParams>,
    events: EventBus,
    reinit_pending: Arc<AtomicBool>,
    monitor: Option<MonitorThread>,
    device_name: Option<String>,
    shut_down: bool,
}

impl AudioSubsystem {
    /// Enumerate devices, open the configured playback device (falling back
    /// to the default) and start the monitor thread.
    ///
    /// A failed device open is logged and leaves audio unavailable; streams
    /// can still be opened and will attach after a successful reinit.
    pub fn new(
        backend: Arc<dyn DeviceBackend>,
        params: Arc<AudioParams>,
        events: EventBus,
    ) -> Result<Self> {
        info!("Starting audio subsystem on {} backend", backend.name());

        let registry = StreamRegistry::new(Arc::clone(&params), events.clone());
        let reinit_pending = Arc::new(AtomicBool::new(false));
        let monitor = DeviceMonitor::new(
            Arc::clone(&backend),
            registry.clone(),
            Arc::clone(&reinit_pending),
        );
        monitor.enumerate_devices();

        let mut subsystem = Self {
            backend,
            registry,
            params,
            events,
            reinit_pending,
            monitor: None,
            device_name: None,
            shut_down: false,
        };

        match subsystem.open_device() {
            Ok(opened) => subsystem.attach(opened),
            Err(e) => error!("No playback device available, audio disabled: {}", e),
        }

        subsystem.monitor = Some(monitor.start()?);
        Ok(subsystem)
    }

    fn open_device(&self) -> Result<OpenedDevice> {
        self.backend.open(self.params.playback_device_index())
    }

    fn attach(&mut self, opened: OpenedDevice) {
        info!("Audio device ready: {}", opened.name);
        self.registry.lock().set_pool(Some(opened.pool));
        self.device_name = Some(opened.name);
    }

    /// Open a file synchronously
    ///
    /// # Errors
    /// `DecodeInit` or `UnsupportedFormat` from the open
    pub fn open_stream(&self, path: &Path, category: SoundCategory) -> Result<StreamHandle> {
        let decoder = SymphoniaDecoder::open(path)?;
        self.open_decoder(Box::new(decoder), category)
    }

    /// Register a stream over an already opened decoder
    pub fn open_decoder(
        &self,
        decoder: Box<dyn Decoder>,
        category: SoundCategory,
    ) -> Result<StreamHandle> {
        let id = self.registry.insert(decoder, category)?;
        Ok(StreamHandle::new(id, self.registry.clone(), None))
    }

    /// Open a file on a loader thread. The handle is usable once
    /// `wait_until_loaded` succeeds (or `is_ready` turns true).
    pub fn open_stream_async(&self, path: PathBuf, category: SoundCategory) -> Result<StreamHandle> {
        self.open_async_with(category, move || {
            let decoder: Box<dyn Decoder> = Box::new(SymphoniaDecoder::open(&path)?);
            Ok(decoder)
        })
    }

    /// Open a stream on a loader thread using a custom decoder factory
    pub fn open_async_with<F>(&self, category: SoundCategory, open: F) -> Result<StreamHandle>
    where
        F: FnOnce() -> Result<Box<dyn Decoder>> + Send + 'static,
    {
        let id = self.registry.insert_loading();
        match AsyncLoad::spawn(self.registry.clone(), id, category, open) {
            Ok(load) => Ok(StreamHandle::new(id, self.registry.clone(), Some(load))),
            Err(e) => {
                let _ = self.registry.release(id);
                Err(e)
            }
        }
    }

    /// Run a pending reinit, if any. Call regularly from the application
    /// thread. Returns true if a reinit ran.
    pub fn service(&mut self) -> bool {
        if !self.reinit_pending.load(Ordering::Acquire) || self.shut_down {
            return false;
        }
        self.reinit();
        true
    }

    /// `service()` for callers on a multi-threaded tokio runtime. A reinit
    /// joins the monitor thread and opens a device, so it runs in place with
    /// the worker handed off to the runtime.
    ///
    /// Panics on a current-thread runtime (`tokio::task::block_in_place`).
    pub fn service_in_place(&mut self) -> bool {
        tokio::task::block_in_place(|| self.service())
    }

    pub fn reinit_pending(&self) -> bool {
        self.reinit_pending.load(Ordering::Acquire)
    }

    /// Tear down and rebuild the audio context.
    ///
    /// Returns whether a device could be opened. Whatever happens, the
    /// monitor is running again and the reinit flag is clear afterwards.
    /// After `shutdown()` this does nothing and returns false.
    pub fn reinit(&mut self) -> bool {
        if self.shut_down {
            warn!("Audio reinit requested after shutdown, ignoring");
            return false;
        }
        info!("Audio reinit started");

        let monitor = match self.monitor.take() {
            Some(thread) => thread.stop(),
            None => None,
        };
        let mut monitor = monitor.unwrap_or_else(|| {
            warn!("Monitor state lost, creating a new monitor");
            DeviceMonitor::new(
                Arc::clone(&self.backend),
                self.registry.clone(),
                Arc::clone(&self.reinit_pending),
            )
        });

        self.registry.release_all_for_reinit();
        self.backend.close();
        self.device_name = None;

        monitor.enumerate_devices();
        let pool = match self.open_device() {
            Ok(opened) => {
                info!("Audio device reopened: {}", opened.name);
                self.device_name = Some(opened.name);
                Some(opened.pool)
            }
            Err(e) => {
                error!("Audio reinit failed, audio unavailable: {}", e);
                None
            }
        };
        let success = pool.is_some();

        self.registry.restore_all(pool);

        monitor.reschedule(std::time::Instant::now());
        match monitor.start() {
            Ok(thread) => self.monitor = Some(thread),
            Err(e) => error!("Failed to restart device monitor: {}", e),
        }

        self.reinit_pending.store(false, Ordering::Release);
        self.events.emit_lossy(AudioEvent::ReinitComplete {
            success,
            timestamp: Utc::now(),
        });
        info!("Audio reinit finished (success={})", success);
        success
    }

    /// Set the global gain and push it to every live voice
    pub fn set_master_volume(&self, volume: f32) -> Result<()> {
        self.params.set_master_volume(volume).map_err(Error::Config)?;
        self.registry.apply_gains();
        Ok(())
    }

    /// Set a category gain and push it to every live voice
    pub fn set_category_volume(&self, category: SoundCategory, volume: f32) -> Result<()> {
        self.params
            .set_category_volume(category, volume)
            .map_err(Error::Config)?;
        self.registry.apply_gains();
        Ok(())
    }

    pub fn device_lists(&self) -> DeviceLists {
        self.registry.devices()
    }

    /// Name of the open playback device
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    /// True while a playback device is open
    pub fn is_available(&self) -> bool {
        self.registry.has_pool()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AudioEvent> {
        self.events.subscribe()
    }

    pub fn params(&self) -> &Arc<AudioParams> {
        &self.params
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn is_monitor_running(&self) -> bool {
        self.monitor.as_ref().map_or(false, |m| m.is_running())
    }

    /// Stop the monitor, silence every stream and close the device.
    /// Stream handles stay valid but report audio unavailable.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        if let Some(monitor) = self.monitor.take() {
            monitor.stop();
        }
        self.registry.release_hardware();
        self.backend.close();
        self.device_name = None;
        info!("Audio subsystem shut down");
    }
}

impl Drop for AudioSubsystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}
