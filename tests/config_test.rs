//! Integration tests for configuration loading

use barrier_station::infra::{Config, ReaderMode};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[station]
id = "gate-b"
tick_ms = 20

[backend]
addr = "10.0.0.2:9000"
retry_secs = 3
handshake = "HELLO_FROM_GATE_B"

[lanes]
server_timeout_ms = 8000
debounce_ms = 300
clearance_delay_ms = 750

[reader]
mode = "serial"
entry_device = "/dev/ttyACM0"
exit_device = "/dev/ttyACM1"
baud = 115200

[journal]
file = "/var/lib/station/cycles.jsonl"

[metrics]
interval_secs = 15
prometheus_port = 9091
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.station_id(), "gate-b");
    assert_eq!(config.tick_interval(), Duration::from_millis(20));
    assert_eq!(config.backend_addr(), "10.0.0.2:9000");
    assert_eq!(config.backend_retry_interval(), Duration::from_secs(3));
    assert_eq!(config.handshake(), "HELLO_FROM_GATE_B");
    assert_eq!(config.server_timeout(), Duration::from_millis(8000));
    assert_eq!(config.debounce(), Duration::from_millis(300));
    assert_eq!(config.clearance_delay(), Duration::from_millis(750));
    assert_eq!(config.reader_mode(), ReaderMode::Serial);
    assert_eq!(config.reader_entry_device(), "/dev/ttyACM0");
    assert_eq!(config.reader_baud(), 115200);
    assert_eq!(config.journal_file(), Some("/var/lib/station/cycles.jsonl"));
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.prometheus_port(), 9091);
    assert_eq!(config.config_file(), temp_file.path().display().to_string());
}

#[test]
fn test_missing_sections_use_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[station]\nid = \"gate-c\"\n").unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.station_id(), "gate-c");
    assert_eq!(config.backend_addr(), "127.0.0.1:8888");
    assert_eq!(config.server_timeout(), Duration::from_secs(10));
    assert_eq!(config.reader_mode(), ReaderMode::Sim);
    assert_eq!(config.flicker_threshold(), 5);
}

#[test]
fn test_empty_journal_file_disables_journal() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[journal]\nfile = \"\"\n").unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.journal_file(), None);
}

#[test]
fn test_invalid_values_are_rejected() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[station]\ntick_ms = 0\n").unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("tick_ms"));
}

#[test]
fn test_unknown_reader_mode_is_a_parse_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[reader]\nmode = \"bluetooth\"\n").unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.backend_addr(), "127.0.0.1:8888");
    assert_eq!(config.handshake(), "HELLO");
    assert_eq!(config.config_file(), "default");
}
