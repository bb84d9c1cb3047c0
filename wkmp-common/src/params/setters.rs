//! Parameter setter methods with metadata-based validation
//!
//! All setters delegate to the metadata validators so the TOML loader and
//! the typed setters can never disagree about what is valid.

use std::sync::{PoisonError, RwLock};

use super::AudioParams;
use crate::events::SoundCategory;

fn write<T>(lock: &RwLock<T>, value: T) {
    *lock.write().unwrap_or_else(PoisonError::into_inner) = value;
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("{}: invalid number format", key))
}

fn validate(key: &str, value: &str) -> Result<(), String> {
    let meta = AudioParams::find_metadata(key)
        .ok_or_else(|| format!("{}: unknown parameter", key))?;
    (meta.validator)(value)
}

impl AudioParams {
    /// Validate and update max_buffer_count
    ///
    /// Only affects streams opened afterwards; existing buffer rings keep
    /// their size for their lifetime.
    pub fn set_max_buffer_count(&self, value: usize) -> Result<(), String> {
        validate("max_buffer_count", &value.to_string())?;
        write(&self.max_buffer_count, value);
        Ok(())
    }

    /// Validate and update buffer_sample_size
    pub fn set_buffer_sample_size(&self, value: usize) -> Result<(), String> {
        validate("buffer_sample_size", &value.to_string())?;
        write(&self.buffer_sample_size, value);
        Ok(())
    }

    /// Validate and update device_check_interval_ms
    pub fn set_device_check_interval_ms(&self, value: u64) -> Result<(), String> {
        validate("device_check_interval_ms", &value.to_string())?;
        write(&self.device_check_interval_ms, value);
        Ok(())
    }

    /// Validate and update monitor_sleep_ms
    pub fn set_monitor_sleep_ms(&self, value: u64) -> Result<(), String> {
        validate("monitor_sleep_ms", &value.to_string())?;
        write(&self.monitor_sleep_ms, value);
        Ok(())
    }

    /// Validate and update master_volume
    pub fn set_master_volume(&self, value: f32) -> Result<(), String> {
        validate("master_volume", &value.to_string())?;
        write(&self.master_volume, value);
        Ok(())
    }

    /// Validate and update the volume of one category
    pub fn set_category_volume(&self, category: SoundCategory, value: f32) -> Result<(), String> {
        match category {
            SoundCategory::Music => {
                validate("music_volume", &value.to_string())?;
                write(&self.music_volume, value);
            }
            SoundCategory::Effects => {
                validate("effects_volume", &value.to_string())?;
                write(&self.effects_volume, value);
            }
        }
        Ok(())
    }

    /// Validate and update playback_device_index (-1 = default device)
    pub fn set_playback_device_index(&self, value: i32) -> Result<(), String> {
        validate("playback_device_index", &value.to_string())?;
        write(&self.playback_device_index, value);
        Ok(())
    }

    /// Validate and update a parameter from its string form
    ///
    /// Used by the configuration loader. Parsing cannot fail once the
    /// validator accepted the value.
    pub fn set_by_key(&self, key: &str, value: &str) -> Result<(), String> {
        validate(key, value)?;
        let value = value.trim();
        match key {
            "max_buffer_count" => self.set_max_buffer_count(parse(key, value)?),
            "buffer_sample_size" => self.set_buffer_sample_size(parse(key, value)?),
            "device_check_interval_ms" => {
                self.set_device_check_interval_ms(parse(key, value)?)
            }
            "monitor_sleep_ms" => self.set_monitor_sleep_ms(parse(key, value)?),
            "master_volume" => self.set_master_volume(parse(key, value)?),
            "music_volume" => self
                .set_category_volume(SoundCategory::Music, parse(key, value)?),
            "effects_volume" => self
                .set_category_volume(SoundCategory::Effects, parse(key, value)?),
            "playback_device_index" => {
                self.set_playback_device_index(parse(key, value)?)
            }
            _ => Err(format!("{}: unknown parameter", key)),
        }
    }
}
