//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - ted.toml (default configuration)
//! - ted.local.toml (git-ignored local overrides)
//! - Environment variables (TED_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # ted.toml
//! initial_table_capacity = 64
//! tick_concurrency = 4
//!
//! [logging]
//! filter = "ted=debug"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! TED_INITIAL_TABLE_CAPACITY=256
//! TED_LOGGING__FILTER=ted=trace
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Engine-wide tunables for a [`crate::program::Program`].
///
/// None of these affect observable semantics (row contents, rule results,
/// tick report contents beyond timing) — they only affect how much memory
/// is reserved up front and how much of a tick's independent work runs
/// concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Starting capacity for every newly declared table, rounded up to the
    /// next power of two and floored at the row table's own minimum.
    /// Sizing this to the expected steady-state row count of a table avoids
    /// repeated doubling during bulk loads.
    #[serde(default = "default_initial_table_capacity")]
    pub initial_table_capacity: usize,

    /// Reserved cap on how many independent tasks `Program::tick`'s
    /// concurrent scheduler runs at once. 0 is rejected at `tick` time (see
    /// `crate::error::TickError::InvalidConcurrency`); any other value is
    /// currently accepted but not yet enforced as a cap — concurrency is
    /// bounded only by the dependency graph's width, not by this field.
    #[serde(default = "default_tick_concurrency")]
    pub tick_concurrency: usize,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Structured-logging configuration, applied by the embedding application
/// (this crate never installs a global subscriber itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive string, e.g. `"ted=info"`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_initial_table_capacity() -> usize {
    16
}

fn default_tick_concurrency() -> usize {
    4
}

fn default_log_filter() -> String {
    "ted=info".to_string()
}

impl EngineConfig {
    /// Load configuration from default locations, merging in order:
    /// 1. `ted.toml` (base configuration)
    /// 2. `ted.local.toml` (local overrides, git-ignored)
    /// 3. Environment variables (`TED_*` prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("ted.toml"))
            .merge(Toml::file("ted.local.toml"))
            .merge(Env::prefixed("TED_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path, still subject to
    /// environment overrides.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TED_").split("__"))
            .extract()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            initial_table_capacity: default_initial_table_capacity(),
            tick_concurrency: default_tick_concurrency(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: default_log_filter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_tunables() {
        let config = EngineConfig::default();
        assert_eq!(config.initial_table_capacity, 16);
        assert_eq!(config.tick_concurrency, 4);
        assert_eq!(config.logging.filter, "ted=info");
    }

    #[test]
    fn explicit_toml_overlay_wins_over_default() {
        // Unset fields fall back to their `#[serde(default = ...)]`
        // functions, the same way `load`/`from_file` rely on serde rather
        // than a pre-populated base provider.
        let config: EngineConfig = Figment::new()
            .merge(Toml::string("tick_concurrency = 8"))
            .extract()
            .unwrap();
        assert_eq!(config.tick_concurrency, 8);
        assert_eq!(config.initial_table_capacity, default_initial_table_capacity());
    }

    #[test]
    fn from_file_rejects_missing_file_by_falling_back_to_defaults_on_absence() {
        // Toml::file on a nonexistent path contributes nothing to the
        // figment rather than erroring, so extraction still succeeds.
        let config = EngineConfig::from_file("does-not-exist.toml").unwrap();
        assert_eq!(config.initial_table_capacity, default_initial_table_capacity());
    }
}
