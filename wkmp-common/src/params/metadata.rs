//! Parameter metadata definitions
//!
//! Single source of truth for parameter validation.

use super::{AudioParams, ParamMetadata};

fn parse_in_range<T>(key: &str, s: &str, min: T, max: T) -> Result<(), String>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
{
    let v: T = s
        .trim()
        .parse()
        .map_err(|_| format!("{}: invalid number format", key))?;
    if v < min || v > max {
        return Err(format!("{}: value {} out of range [{}, {}]", key, v, min, max));
    }
    Ok(())
}

impl AudioParams {
    /// Get metadata for all runtime parameters
    ///
    /// # Example: Validating a Parameter
    ///
    /// ```rust
    /// # use wkmp_common::params::AudioParams;
    /// let meta = AudioParams::find_metadata("master_volume").unwrap();
    ///
    /// assert!((meta.validator)("0.5").is_ok());
    /// assert!((meta.validator)("2.0").is_err());
    /// ```
    pub fn metadata() -> &'static [ParamMetadata] {
        &[
            ParamMetadata {
                key: "max_buffer_count",
                data_type: "usize",
                default_value: "4",
                description: "Upper bound on hardware buffers per stream",
                validation_range: "2-16",
                validator: |s| parse_in_range::<usize>("max_buffer_count", s, 2, 16),
            },
            ParamMetadata {
                key: "buffer_sample_size",
                data_type: "usize",
                default_value: "8192",
                description: "Frames decoded into each hardware buffer",
                validation_range: "256-262144",
                validator: |s| parse_in_range::<usize>("buffer_sample_size", s, 256, 262_144),
            },
            ParamMetadata {
                key: "device_check_interval_ms",
                data_type: "u64",
                default_value: "1000",
                description: "Interval between device list discrepancy scans (ms)",
                validation_range: "50-60000",
                validator: |s| parse_in_range::<u64>("device_check_interval_ms", s, 50, 60_000),
            },
            ParamMetadata {
                key: "monitor_sleep_ms",
                data_type: "u64",
                default_value: "10",
                description: "Monitoring thread sleep between advance ticks (ms)",
                validation_range: "1-1000",
                validator: |s| parse_in_range::<u64>("monitor_sleep_ms", s, 1, 1000),
            },
            ParamMetadata {
                key: "master_volume",
                data_type: "f32",
                default_value: "1.0",
                description: "Global output gain",
                validation_range: "0.0-1.0",
                validator: |s| parse_in_range::<f32>("master_volume", s, 0.0, 1.0),
            },
            ParamMetadata {
                key: "music_volume",
                data_type: "f32",
                default_value: "1.0",
                description: "Gain for music streams",
                validation_range: "0.0-1.0",
                validator: |s| parse_in_range::<f32>("music_volume", s, 0.0, 1.0),
            },
            ParamMetadata {
                key: "effects_volume",
                data_type: "f32",
                default_value: "1.0",
                description: "Gain for effect streams",
                validation_range: "0.0-1.0",
                validator: |s| parse_in_range::<f32>("effects_volume", s, 0.0, 1.0),
            },
            ParamMetadata {
                key: "playback_device_index",
                data_type: "i32",
                default_value: "-1",
                description: "Playback device index (-1 = system default)",
                validation_range: "-1-255",
                validator: |s| parse_in_range::<i32>("playback_device_index", s, -1, 255),
            },
        ]
    }

    /// Look up metadata by parameter key
    pub fn find_metadata(key: &str) -> Option<&'static ParamMetadata> {
        Self::metadata().iter().find(|m| m.key == key)
    }
}
