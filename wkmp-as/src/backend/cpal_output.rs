//! Device backend over cpal
//!
//! Enumerates output/input devices of the default host and plays a
//! `SoftwareVoicePool` through the chosen output device.
//!
//! `cpal::Stream` is not Send, so the stream is built and owned by a
//! dedicated output thread that lives until `close()`. The pool is shared
//! with the engine through an Arc; the cpal callback only calls `render`.

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use tracing::{debug, error, info, warn};

use super::{DeviceBackend, OpenedDevice, SoftwareVoicePool};
use crate::audio::types::f32_to_i16;
use crate::error::{Error, Result};

/// Default number of voices per opened device
pub const DEFAULT_VOICE_COUNT: usize = 32;

struct OutputThread {
    pool: Arc<SoftwareVoicePool>,
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

/// Real audio output through the platform's default cpal host
pub struct CpalBackend {
    output: Mutex<Option<OutputThread>>,
    voice_count: usize,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::with_voices(DEFAULT_VOICE_COUNT)
    }

    pub fn with_voices(voice_count: usize) -> Self {
        Self {
            output: Mutex::new(None),
            voice_count,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<OutputThread>> {
        self.output.lock().unwrap_or_else(|poisoned| {
            warn!("cpal backend mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn enumeration_error(e: impl std::fmt::Display) -> Error {
    Error::DeviceEnumeration {
        attempts: 1,
        message: e.to_string(),
    }
}

/// Devices whose name can be read, in host order. Indices into the listed
/// names and into this list always refer to the same device.
fn named<T>(devices: impl Iterator<Item = T>, name: impl Fn(&T) -> Option<String>) -> Vec<(String, T)> {
    devices
        .filter_map(|device| name(&device).map(|n| (n, device)))
        .collect()
}

fn named_output_devices(host: &cpal::Host) -> Result<Vec<(String, cpal::Device)>> {
    let devices = host.output_devices().map_err(enumeration_error)?;
    Ok(named(devices, |d| d.name().ok()))
}

/// Find the output device at `index` of the listed names, falling back to
/// the host default
fn select_device(host: &cpal::Host, index: Option<usize>) -> Result<cpal::Device> {
    if let Some(i) = index {
        let found = named_output_devices(host)
            .ok()
            .and_then(|devices| devices.into_iter().nth(i));
        match found {
            Some((_, device)) => return Ok(device),
            None => warn!("Output device {} not found, falling back to default device", i),
        }
    }
    host.default_output_device()
        .ok_or_else(|| Error::DeviceOpen("No default output device found".to_string()))
}

/// Build and start the output stream. Runs on the output thread.
fn start_stream(index: Option<usize>, pool: Arc<SoftwareVoicePool>) -> Result<(String, Stream)> {
    let host = cpal::default_host();
    let device = select_device(&host, index)?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = device
        .default_output_config()
        .map_err(|e| Error::DeviceOpen(format!("Failed to get default config: {}", e)))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let channels = config.channels as usize;
    let rate = config.sample_rate.0;

    debug!(
        "Output config for {}: {}Hz, {} channels, {:?}",
        name, rate, channels, sample_format
    );

    let err_fn = |err: cpal::StreamError| error!("Audio stream error: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                pool.render(data, channels, rate);
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => {
            let mut scratch: Vec<f32> = Vec::new();
            device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    pool.render(&mut scratch, channels, rate);
                    for (out, sample) in data.iter_mut().zip(&scratch) {
                        *out = f32_to_i16(*sample);
                    }
                },
                err_fn,
                None,
            )
        }
        SampleFormat::U16 => {
            let mut scratch: Vec<f32> = Vec::new();
            device.build_output_stream(
                &config,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    pool.render(&mut scratch, channels, rate);
                    // [-1.0, 1.0] to [0, 65535]
                    for (out, sample) in data.iter_mut().zip(&scratch) {
                        *out = ((sample + 1.0) * 32767.5) as u16;
                    }
                },
                err_fn,
                None,
            )
        }
        other => {
            return Err(Error::DeviceOpen(format!(
                "Unsupported device sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| Error::DeviceOpen(format!("Failed to build stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| Error::DeviceOpen(format!("Failed to start stream: {}", e)))?;

    Ok((name, stream))
}

impl DeviceBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn playback_device_names(&self) -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = named_output_devices(&host)?
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    fn capture_device_names(&self) -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .input_devices()
            .map_err(enumeration_error)?
            .filter_map(|device| device.name().ok())
            .collect();
        debug!("Found {} input devices", devices.len());
        Ok(devices)
    }

    fn open(&self, index: Option<usize>) -> Result<OpenedDevice> {
        self.close();

        let pool = Arc::new(SoftwareVoicePool::new(self.voice_count, true));
        let thread_pool = Arc::clone(&pool);
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<String>>(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("wkmp-as-output".to_string())
            .spawn(move || {
                let stream = match start_stream(index, thread_pool) {
                    Ok((name, stream)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Keep the stream alive until close() (or the sender is dropped)
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("Output thread exiting");
            })
            .map_err(|e| Error::DeviceOpen(format!("Failed to spawn output thread: {}", e)))?;

        let name = match ready_rx.recv() {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(Error::DeviceOpen(
                    "Output thread exited before the stream started".to_string(),
                ));
            }
        };

        info!("Opened audio device: {}", name);
        *self.lock() = Some(OutputThread {
            pool: Arc::clone(&pool),
            shutdown: shutdown_tx,
            handle,
        });

        Ok(OpenedDevice { name, pool })
    }

    fn close(&self) {
        let Some(output) = self.lock().take() else {
            return;
        };
        output.pool.close();
        let _ = output.shutdown.send(());
        if output.handle.join().is_err() {
            error!("Output thread panicked");
        }
        info!("Audio device closed");
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.close();
    }
}
