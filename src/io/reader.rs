//! Credential readers
//!
//! A reader is polled once per tick for the lane. Each reading is returned
//! once; the same tag shown again produces a new reading.
//!
//! Serial protocol (one reader module per lane):
//! - Baud: configurable, default 9600, 8N1
//! - One UID per line, hex digits with optional ' ', ':' or '-' separators

use crate::domain::types::{LaneId, Uid};
use crate::infra::config::Config;
use crate::io::line_codec::LineCodec;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info, warn};

/// Delay before reopening a serial port that failed or closed
const REOPEN_DELAY: Duration = Duration::from_secs(5);

/// Non-blocking credential source
pub trait CredentialReader: Send {
    fn poll(&mut self, lane: LaneId) -> Option<Uid>;
}

/// Newest unread UID per lane, shared between port tasks and the control loop
#[derive(Default)]
struct Latest {
    slots: [Option<(Uid, Instant)>; 2],
}

/// UIDs from one serial reader module per lane
pub struct SerialReader {
    latest: Arc<Mutex<Latest>>,
    stale_after: Duration,
}

impl SerialReader {
    /// Start one port task per lane and return the polling handle
    pub fn spawn(config: &Config, shutdown: watch::Receiver<bool>) -> Self {
        let latest = Arc::new(Mutex::new(Latest::default()));

        for (lane, device) in [
            (LaneId::Entry, config.reader_entry_device()),
            (LaneId::Exit, config.reader_exit_device()),
        ] {
            let port = SerialPortTask {
                lane,
                device: device.to_string(),
                baud: config.reader_baud(),
                latest: latest.clone(),
            };
            tokio::spawn(port.run(shutdown.clone()));
        }

        Self { latest, stale_after: config.reader_stale_after() }
    }

    fn take(&self, lane: LaneId, now: Instant) -> Option<Uid> {
        let (uid, read_at) = self.latest.lock().slots[lane.index()].take()?;
        let age = now.saturating_duration_since(read_at);
        if age > self.stale_after {
            debug!(lane = %lane, uid = %uid, age_ms = %age.as_millis(), "reader_stale_uid_discarded");
            return None;
        }
        Some(uid)
    }
}

impl CredentialReader for SerialReader {
    fn poll(&mut self, lane: LaneId) -> Option<Uid> {
        self.take(lane, Instant::now())
    }
}

struct SerialPortTask {
    lane: LaneId,
    device: String,
    baud: u32,
    latest: Arc<Mutex<Latest>>,
}

impl SerialPortTask {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(lane = %self.lane, device = %self.device, baud = %self.baud, "reader_port_task_started");

        loop {
            let port = tokio_serial::new(&self.device, self.baud).open_native_async();

            match port {
                Ok(mut port) => {
                    info!(lane = %self.lane, device = %self.device, "reader_port_opened");
                    tokio::select! {
                        _ = self.read_lines(&mut port) => {}
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                info!(lane = %self.lane, "reader_shutdown");
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(lane = %self.lane, device = %self.device, error = %e, "reader_port_open_failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(REOPEN_DELAY) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(lane = %self.lane, "reader_shutdown");
                        return;
                    }
                }
            }
        }
    }

    /// Read until the port fails
    async fn read_lines(&self, port: &mut tokio_serial::SerialStream) {
        let mut buf = [0u8; 64];
        let mut codec = LineCodec::new();

        loop {
            let n = match port.read(&mut buf).await {
                Ok(0) => {
                    warn!(lane = %self.lane, "reader_port_closed");
                    return;
                }
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => {
                    warn!(lane = %self.lane, error = %e, "reader_read_error");
                    return;
                }
            };

            codec.push(&buf[..n]);
            while let Some(line) = codec.next_line() {
                self.store(&line, Instant::now());
            }
        }
    }

    fn store(&self, line: &str, now: Instant) {
        match Uid::parse(line) {
            Some(uid) => {
                debug!(lane = %self.lane, uid = %uid, "reader_uid_received");
                self.latest.lock().slots[self.lane.index()] = Some((uid, now));
            }
            None => warn!(lane = %self.lane, line = %line, "reader_line_invalid"),
        }
    }
}
