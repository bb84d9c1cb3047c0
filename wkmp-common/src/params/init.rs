//! Parameter initialization from the TOML `[audio]` table
//!
//! Metadata-based loading: every value goes through the same validator the
//! typed setters use.

use tracing::{debug, info, warn};

use super::AudioParams;

impl AudioParams {
    /// Build parameters from an optional `[audio]` table
    ///
    /// # Error Handling Policy
    ///
    /// 1. Parameter missing: use default, continue
    /// 2. Type mismatch: Log WARN, use default, continue
    /// 3. Out of range: Log WARN, use default, continue
    /// 4. Unknown key: Log WARN, ignore
    /// 5. Process all independently (no fail-fast)
    pub fn from_toml(table: Option<&toml::Table>) -> Self {
        let params = Self::default();
        let Some(table) = table else {
            debug!("No [audio] table, using default parameters");
            return params;
        };

        let mut loaded = 0;
        for (key, value) in table {
            if Self::find_metadata(key).is_none() {
                warn!("Unknown audio parameter '{}' ignored", key);
                continue;
            }

            let text = match value {
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::String(s) => s.clone(),
                other => {
                    warn!("Audio parameter '{}' has unsupported type {}, using default", key, other.type_str());
                    continue;
                }
            };

            match params.set_by_key(key, &text) {
                Ok(()) => loaded += 1,
                Err(e) => warn!("Invalid audio parameter ({}), using default", e),
            }
        }

        info!("Loaded {} audio parameter(s) from configuration", loaded);
        params
    }
}
