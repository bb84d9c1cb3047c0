//! Runtime audio parameter management
//!
//! All tunable values of the streaming engine live in one `AudioParams`
//! value owned by the audio subsystem and shared by `Arc`. Read-frequently,
//! write-rarely access pattern using RwLock.
//!
//! # Usage
//!
//! ```rust
//! use wkmp_common::params::AudioParams;
//!
//! let params = AudioParams::default();
//!
//! // Read (fast, uncontended)
//! let buffers = params.max_buffer_count();
//!
//! // Write (validated against the metadata table)
//! params.set_max_buffer_count(8).unwrap();
//! assert!(params.set_max_buffer_count(64).is_err());
//! ```

use std::sync::{PoisonError, RwLock};

use crate::events::SoundCategory;

// Module declarations
mod init;
mod metadata;
mod setters;

/// Runtime parameter storage
///
/// All parameters stored with RwLock for thread-safe access.
/// Readers don't block each other (shared read lock).
pub struct AudioParams {
    /// Upper bound on hardware buffers per stream
    ///
    /// Valid range: [2, 16]
    /// Default: 4
    /// Actual count per stream is `clamp(ceil(total / buffer_sample_size), 1, max)`
    pub max_buffer_count: RwLock<usize>,

    /// Frames decoded into each hardware buffer
    ///
    /// Valid range: [256, 262144] frames
    /// Default: 8192 frames (186ms @ 44.1kHz)
    pub buffer_sample_size: RwLock<usize>,

    /// Interval between device list discrepancy scans
    ///
    /// Valid range: [50, 60000] ms
    /// Default: 1000 ms
    /// Only used on backends without native hot-plug events
    pub device_check_interval_ms: RwLock<u64>,

    /// Monitoring thread sleep between advance ticks
    ///
    /// Valid range: [1, 1000] ms
    /// Default: 10 ms
    /// Must stay well below one buffer's playback duration
    pub monitor_sleep_ms: RwLock<u64>,

    /// Global output gain
    ///
    /// Valid range: [0.0, 1.0]
    /// Default: 1.0
    pub master_volume: RwLock<f32>,

    /// Gain applied to `SoundCategory::Music` streams
    ///
    /// Valid range: [0.0, 1.0]
    /// Default: 1.0
    pub music_volume: RwLock<f32>,

    /// Gain applied to `SoundCategory::Effects` streams
    ///
    /// Valid range: [0.0, 1.0]
    /// Default: 1.0
    pub effects_volume: RwLock<f32>,

    /// Selected playback device index into the enumerated list
    ///
    /// Valid range: [-1, 255]
    /// Default: -1 (system default device)
    pub playback_device_index: RwLock<i32>,
}

fn read<T: Copy>(lock: &RwLock<T>) -> T {
    *lock.read().unwrap_or_else(PoisonError::into_inner)
}

impl AudioParams {
    pub fn max_buffer_count(&self) -> usize {
        read(&self.max_buffer_count)
    }

    pub fn buffer_sample_size(&self) -> usize {
        read(&self.buffer_sample_size)
    }

    pub fn device_check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(read(&self.device_check_interval_ms))
    }

    pub fn monitor_sleep(&self) -> std::time::Duration {
        std::time::Duration::from_millis(read(&self.monitor_sleep_ms))
    }

    pub fn master_volume(&self) -> f32 {
        read(&self.master_volume)
    }

    /// Gain for one category (not including master volume)
    pub fn category_volume(&self, category: SoundCategory) -> f32 {
        match category {
            SoundCategory::Music => read(&self.music_volume),
            SoundCategory::Effects => read(&self.effects_volume),
        }
    }

    /// Master × category gain, the factor applied on top of a stream's own volume
    pub fn combined_gain(&self, category: SoundCategory) -> f32 {
        self.master_volume() * self.category_volume(category)
    }

    /// Selected playback device, `None` for the system default
    pub fn playback_device_index(&self) -> Option<usize> {
        let index = read(&self.playback_device_index);
        usize::try_from(index).ok()
    }
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            max_buffer_count: RwLock::new(4),
            buffer_sample_size: RwLock::new(8192),
            device_check_interval_ms: RwLock::new(1000),
            monitor_sleep_ms: RwLock::new(10),
            master_volume: RwLock::new(1.0),
            music_volume: RwLock::new(1.0),
            effects_volume: RwLock::new(1.0),
            playback_device_index: RwLock::new(-1),
        }
    }
}

impl std::fmt::Debug for AudioParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioParams")
            .field("max_buffer_count", &self.max_buffer_count())
            .field("buffer_sample_size", &self.buffer_sample_size())
            .field("device_check_interval", &self.device_check_interval())
            .field("monitor_sleep", &self.monitor_sleep())
            .field("master_volume", &self.master_volume())
            .field("music_volume", &self.category_volume(SoundCategory::Music))
            .field("effects_volume", &self.category_volume(SoundCategory::Effects))
            .field("playback_device_index", &read(&self.playback_device_index))
            .finish()
    }
}

/// Metadata for a single AudioParams parameter
///
/// Encapsulates everything the setters and the TOML loader need to know
/// about a parameter, including its validation logic.
///
/// # Validator Closure Signature
///
/// All validators must have signature: `fn(&str) -> Result<(), String>`
///
/// Error format: `"{param_name}: {specific_reason}"`
pub struct ParamMetadata {
    pub key: &'static str,
    pub data_type: &'static str,
    pub default_value: &'static str,
    pub description: &'static str,
    pub validation_range: &'static str,
    pub validator: fn(&str) -> Result<(), String>,
}
