//! Audio backend interfaces
//!
//! The engine talks to hardware through two traits:
//! - `DeviceBackend`: device enumeration, hot-plug delivery, device open/close
//! - `VoicePool`: voices and buffer handles of an open device (OpenAL-style
//!   queue semantics)
//!
//! Concrete backends:
//! - `CpalBackend`: real output through cpal
//! - `SimulatedBackend`: scriptable devices for tests and headless runs
//!
//! Both hand out a `SoftwareVoicePool`, which does the queue bookkeeping and
//! mixing in process.

pub mod cpal_output;
pub mod simulated;
pub mod software;

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::audio::PcmSlice;
use crate::error::Result;

pub use cpal_output::CpalBackend;
pub use simulated::SimulatedBackend;
pub use software::SoftwareVoicePool;

/// Handle to a voice lent out by a `VoicePool`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u32);

/// Handle to a PCM buffer owned by a `VoicePool`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BufferId(pub u32);

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

/// Fixed set of playback voices plus the buffer handles queued to them.
///
/// Queue semantics follow OpenAL sources:
/// - buffers play in the order they were queued
/// - a buffer that finished playing is "processed" and stays queued until
///   unqueued
/// - `stop` marks every queued buffer processed
/// - a voice whose queue runs dry stops reporting `is_playing`
///
/// Operations on unknown voices or on a closed pool are no-ops that report
/// nothing queued and nothing playing.
pub trait VoicePool: Send + Sync {
    /// Borrow a free voice, or None when every voice is lent out
    fn try_acquire(&self) -> Option<VoiceId>;

    /// Return a voice to the pool; its queue is discarded
    fn release(&self, voice: VoiceId);

    fn play(&self, voice: VoiceId);

    fn stop(&self, voice: VoiceId);

    fn is_playing(&self, voice: VoiceId) -> bool;

    fn set_gain(&self, voice: VoiceId, gain: f32);

    /// Append buffers to the voice's queue
    fn queue_buffers(&self, voice: VoiceId, buffers: &[BufferId]) -> Result<()>;

    /// Remove up to `out.len()` processed buffers (oldest first) into `out`.
    /// Returns how many were written.
    fn unqueue_buffers(&self, voice: VoiceId, out: &mut [BufferId]) -> usize;

    fn processed_count(&self, voice: VoiceId) -> usize;

    fn queued_count(&self, voice: VoiceId) -> usize;

    fn generate_buffers(&self, count: usize) -> Result<Vec<BufferId>>;

    fn delete_buffers(&self, buffers: &[BufferId]);

    /// Upload interleaved PCM into a buffer, replacing its contents
    fn buffer_data(
        &self,
        buffer: BufferId,
        channels: u16,
        sample_rate: u32,
        data: PcmSlice<'_>,
    ) -> Result<()>;

    /// True when 32-bit float buffers are accepted
    fn supports_float32(&self) -> bool;
}

/// Asynchronous device change delivered by a backend with native hot-plug
/// notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotplugEvent {
    Added { name: String, is_playback: bool },
    Removed { name: String, is_playback: bool },
}

impl HotplugEvent {
    pub fn is_playback(&self) -> bool {
        match self {
            HotplugEvent::Added { is_playback, .. } | HotplugEvent::Removed { is_playback, .. } => {
                *is_playback
            }
        }
    }
}

/// Result of opening a playback device
pub struct OpenedDevice {
    /// Name of the device actually opened (may differ from the one asked for
    /// after a fallback)
    pub name: String,
    pub pool: Arc<dyn VoicePool>,
}

impl fmt::Debug for OpenedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedDevice").field("name", &self.name).finish()
    }
}

/// Device enumeration and the audio context of one open device
pub trait DeviceBackend: Send + Sync {
    /// Short backend name for logging
    fn name(&self) -> &str;

    /// Names of available playback devices, in backend order
    fn playback_device_names(&self) -> Result<Vec<String>>;

    /// Names of available capture devices, in backend order
    fn capture_device_names(&self) -> Result<Vec<String>>;

    /// True if the backend pushes `HotplugEvent`s instead of being polled
    fn supports_hotplug(&self) -> bool {
        false
    }

    /// Channel the backend's notification thread forwards events into.
    /// Backends without hot-plug support ignore it.
    fn set_hotplug_sender(&self, _sender: mpsc::Sender<HotplugEvent>) {}

    /// Open a playback device by index into `playback_device_names`.
    /// None, or an index that is no longer valid, opens the default device.
    ///
    /// # Errors
    /// `DeviceOpen` when no device at all can be opened
    fn open(&self, index: Option<usize>) -> Result<OpenedDevice>;

    /// Tear down the open device and its context. Every voice and buffer
    /// handed out before becomes invalid.
    fn close(&self);
}
