//! Configuration loading from TOML files
//!
//! The binary selects the file with `--config <path>` or the CONFIG_FILE
//! environment variable (default: config/station.toml).

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderMode {
    Sim,
    Serial,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub id: String,
    pub tick_ms: u64,
    /// Periodic lane-state debug log (0 to disable)
    pub status_log_secs: u64,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self { id: "station".to_string(), tick_ms: 50, status_log_secs: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub addr: String,
    pub retry_secs: u64,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// First line sent after every successful connect
    pub handshake: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8888".to_string(),
            retry_secs: 5,
            connect_timeout_ms: 2000,
            write_timeout_ms: 1000,
            handshake: "HELLO".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LanesConfig {
    pub server_timeout_ms: u64,
    pub debounce_ms: u64,
    /// Pause between the vehicle clearing the beam and the barrier closing
    pub clearance_delay_ms: u64,
    pub flicker_threshold: u32,
    pub flicker_window_ms: u64,
}

impl Default for LanesConfig {
    fn default() -> Self {
        Self {
            server_timeout_ms: 10_000,
            debounce_ms: 500,
            clearance_delay_ms: 500,
            flicker_threshold: 5,
            flicker_window_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub mode: ReaderMode,
    pub entry_device: String,
    pub exit_device: String,
    pub baud: u32,
    pub stale_after_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            mode: ReaderMode::Sim,
            entry_device: "/dev/ttyUSB0".to_string(),
            exit_device: "/dev/ttyUSB1".to_string(),
            baud: 9600,
            stale_after_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// JSONL file for finished lane cycles (empty to disable)
    pub file: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self { file: default_journal_file() }
    }
}

fn default_journal_file() -> String {
    "cycles.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: 30, prometheus_port: 9100 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub station: StationConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub lanes: LanesConfig,
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    station: StationConfig,
    backend: BackendConfig,
    lanes: LanesConfig,
    reader: ReaderConfig,
    journal: JournalConfig,
    metrics: MetricsConfig,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            station: toml_config.station,
            backend: toml_config.backend,
            lanes: toml_config.lanes,
            reader: toml_config.reader,
            journal: toml_config.journal,
            metrics: toml_config.metrics,
            config_file,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self::from_toml(toml_config, path.display().to_string());
        config.validate().with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.station.tick_ms > 0, "station.tick_ms must be positive");
        anyhow::ensure!(self.backend.retry_secs > 0, "backend.retry_secs must be positive");
        anyhow::ensure!(!self.backend.addr.is_empty(), "backend.addr must be set");
        anyhow::ensure!(
            !self.backend.handshake.contains('\n'),
            "backend.handshake must be a single line"
        );
        Ok(())
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn station_id(&self) -> &str {
        &self.station.id
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.station.tick_ms)
    }

    pub fn status_log_secs(&self) -> u64 {
        self.station.status_log_secs
    }

    pub fn backend_addr(&self) -> &str {
        &self.backend.addr
    }

    pub fn backend_retry_interval(&self) -> Duration {
        Duration::from_secs(self.backend.retry_secs)
    }

    pub fn backend_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.connect_timeout_ms)
    }

    pub fn backend_write_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.write_timeout_ms)
    }

    pub fn handshake(&self) -> &str {
        &self.backend.handshake
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_millis(self.lanes.server_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.lanes.debounce_ms)
    }

    pub fn clearance_delay(&self) -> Duration {
        Duration::from_millis(self.lanes.clearance_delay_ms)
    }

    pub fn flicker_threshold(&self) -> u32 {
        self.lanes.flicker_threshold
    }

    pub fn flicker_window(&self) -> Duration {
        Duration::from_millis(self.lanes.flicker_window_ms)
    }

    pub fn reader_mode(&self) -> ReaderMode {
        self.reader.mode
    }

    pub fn reader_entry_device(&self) -> &str {
        &self.reader.entry_device
    }

    pub fn reader_exit_device(&self) -> &str {
        &self.reader.exit_device
    }

    pub fn reader_baud(&self) -> u32 {
        self.reader.baud
    }

    pub fn reader_stale_after(&self) -> Duration {
        Duration::from_millis(self.reader.stale_after_ms)
    }

    /// Journal path, `None` when disabled
    pub fn journal_file(&self) -> Option<&str> {
        let file = self.journal.file.trim();
        (!file.is_empty()).then_some(file)
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics.interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.metrics.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to shorten the server timeout
    #[cfg(test)]
    pub fn with_server_timeout_ms(mut self, ms: u64) -> Self {
        self.lanes.server_timeout_ms = ms;
        self
    }

    /// Builder method for tests to disable the journal
    #[cfg(test)]
    pub fn without_journal(mut self) -> Self {
        self.journal.file = String::new();
        self
    }

    /// Builder method for tests to journal into a scratch file
    #[cfg(test)]
    pub fn with_journal_file(mut self, path: &str) -> Self {
        self.journal.file = path.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend_addr(), "127.0.0.1:8888");
        assert_eq!(config.backend_retry_interval(), Duration::from_secs(5));
        assert_eq!(config.handshake(), "HELLO");
        assert_eq!(config.server_timeout(), Duration::from_secs(10));
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert_eq!(config.clearance_delay(), Duration::from_millis(500));
        assert_eq!(config.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.reader_mode(), ReaderMode::Sim);
        assert_eq!(config.journal_file(), Some("cycles.jsonl"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[backend]
addr = "10.0.0.5:9000"
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.backend_addr(), "10.0.0.5:9000");
        assert_eq!(config.backend_retry_interval(), Duration::from_secs(5));
        assert_eq!(config.server_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_empty_journal_disables() {
        let config = Config::default().without_journal();
        assert_eq!(config.journal_file(), None);
    }
}
