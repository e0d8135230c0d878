//! Configuration management for Paystore
//!
//! Provides presets for the device classes a wallet runs on
//! and validation for custom configurations.

/// Largest key the log format can carry (u16 length prefix, bbolt-compatible bound)
pub const MAX_KEY_SIZE_LIMIT: usize = 32 * 1024;

/// Largest value the engine accepts under any configuration
pub const MAX_VALUE_SIZE_LIMIT: usize = 128 * 1024 * 1024;

/// Paystore configuration with device-class presets
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum key size in bytes
    pub max_key_size: usize,
    /// Maximum value size in bytes
    pub max_value_size: usize,
    /// Durably sync the store file on every commit
    pub sync_on_commit: bool,
    /// Compact on open when dead space ratio exceeds this
    pub compaction_trigger_ratio: f64,
    /// Files smaller than this are never compacted on open
    pub compaction_min_file_bytes: u64,
}

impl Config {
    /// Phone-class: small files, compact eagerly to save flash space
    pub fn phone() -> Self {
        Self {
            max_key_size: 512,
            max_value_size: 4 * 1024 * 1024,
            sync_on_commit: true,
            compaction_trigger_ratio: 0.5,
            compaction_min_file_bytes: 4 * 1024 * 1024,
        }
    }

    /// Desktop-class: larger records, compaction only once the log is sizeable
    pub fn desktop() -> Self {
        Self {
            max_key_size: 1024,
            max_value_size: 16 * 1024 * 1024,
            sync_on_commit: true,
            compaction_trigger_ratio: 0.6,
            compaction_min_file_bytes: 32 * 1024 * 1024,
        }
    }

    /// Budget-class: tight storage, aggressive compaction
    pub fn budget() -> Self {
        Self {
            max_key_size: 256,
            max_value_size: 1024 * 1024,
            sync_on_commit: true,
            compaction_trigger_ratio: 0.3,
            compaction_min_file_bytes: 1024 * 1024,
        }
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.max_key_size == 0 || self.max_key_size > MAX_KEY_SIZE_LIMIT {
            return Err(format!("max_key_size must be in [1, {}]", MAX_KEY_SIZE_LIMIT));
        }
        if self.max_value_size == 0 || self.max_value_size > MAX_VALUE_SIZE_LIMIT {
            return Err("max_value_size must be in [1, 128MB]".into());
        }
        if self.compaction_trigger_ratio <= 0.0 || self.compaction_trigger_ratio >= 1.0 {
            return Err("compaction_trigger_ratio must be in (0.0, 1.0)".into());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self { Self::phone() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_presets_valid() {
        assert!(Config::phone().validate().is_ok());
        assert!(Config::desktop().validate().is_ok());
        assert!(Config::budget().validate().is_ok());
    }

    #[test]
    fn test_tier_ordering() {
        let d = Config::desktop();
        let p = Config::phone();
        let b = Config::budget();
        assert!(d.max_value_size > p.max_value_size);
        assert!(p.max_value_size > b.max_value_size);
        assert!(d.compaction_min_file_bytes > b.compaction_min_file_bytes);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.max_key_size = MAX_KEY_SIZE_LIMIT + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.max_value_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.compaction_trigger_ratio = 1.0;
        assert!(config.validate().is_err());
    }
}
