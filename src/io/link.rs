//! Backend transport link
//!
//! One persistent TCP connection carrying newline-terminated lines. A reader
//! task frames inbound bytes into lines and hands them to the control loop
//! through a channel; writes happen inline with a timeout. While disconnected
//! the link retries on a fixed interval and sends the handshake line right
//! after every successful connect.

use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::line_codec::LineCodec;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Inbound lines buffered between the reader task and the control loop
const INBOUND_CHANNEL_CAPACITY: usize = 64;

/// Log connection failure (cold path)
#[cold]
fn log_connect_failed(addr: &str, e: &dyn std::fmt::Display) {
    warn!(addr = %addr, error = %e, "backend_connect_failed");
}

/// Line-oriented connection to the authorization backend
#[async_trait]
pub trait Transport: Send {
    fn is_connected(&self) -> bool;

    /// Reconnect when due; sends the handshake after a successful connect
    async fn tick(&mut self, now: Instant);

    /// Send one line (terminator appended). No-op while disconnected.
    async fn send_line(&mut self, line: &str);

    /// At most one complete line, trailing whitespace trimmed. Never blocks.
    fn try_receive_line(&mut self) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub addr: String,
    pub handshake: String,
    pub retry_interval: Duration,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
}

impl LinkSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            addr: config.backend_addr().to_string(),
            handshake: config.handshake().to_string(),
            retry_interval: config.backend_retry_interval(),
            connect_timeout: config.backend_connect_timeout(),
            write_timeout: config.backend_write_timeout(),
        }
    }
}

/// Live connection; dropping it closes the socket and stops the reader task
struct Session {
    writer: OwnedWriteHalf,
    lines: mpsc::Receiver<String>,
    reader: JoinHandle<()>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

pub struct TcpLink {
    settings: LinkSettings,
    session: Option<Session>,
    last_attempt: Option<Instant>,
    metrics: Arc<Metrics>,
}

impl TcpLink {
    pub fn new(settings: LinkSettings, metrics: Arc<Metrics>) -> Self {
        Self { settings, session: None, last_attempt: None, metrics }
    }

    fn reconnect_due(&self, now: Instant) -> bool {
        match self.last_attempt {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.settings.retry_interval,
        }
    }

    async fn connect(&mut self) -> bool {
        self.metrics.record_connect_attempt();
        debug!(addr = %self.settings.addr, "backend_connecting");

        let stream = match tokio::time::timeout(
            self.settings.connect_timeout,
            TcpStream::connect(&self.settings.addr),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                log_connect_failed(&self.settings.addr, &e);
                return false;
            }
            Err(_) => {
                log_connect_failed(&self.settings.addr, &"connect timed out");
                return false;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "backend_set_nodelay_failed");
        }

        let (read_half, writer) = stream.into_split();
        let (tx, lines) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let reader = tokio::spawn(read_loop(read_half, tx));
        self.session = Some(Session { writer, lines, reader });

        self.metrics.record_connected();
        info!(addr = %self.settings.addr, "backend_link_connected");
        true
    }

    fn drop_session(&mut self, reason: &str) {
        if self.session.take().is_some() {
            self.metrics.record_disconnected();
            warn!(addr = %self.settings.addr, reason = %reason, "backend_link_lost");
        }
    }
}

/// Frame the read half into lines until EOF or error
async fn read_loop(mut read_half: OwnedReadHalf, tx: mpsc::Sender<String>) {
    let mut buf = [0u8; 1024];
    let mut codec = LineCodec::new();

    loop {
        let n = match read_half.read(&mut buf).await {
            Ok(0) => {
                debug!("backend_connection_closed");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "backend_read_error");
                return;
            }
        };

        codec.push(&buf[..n]);
        while let Some(line) = codec.next_line() {
            if tx.send(line).await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl Transport for TcpLink {
    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    async fn tick(&mut self, now: Instant) {
        if self.session.is_some() || !self.reconnect_due(now) {
            return;
        }
        self.last_attempt = Some(now);

        if self.connect().await {
            let handshake = self.settings.handshake.clone();
            self.send_line(&handshake).await;
        }
    }

    async fn send_line(&mut self, line: &str) {
        let write_timeout = self.settings.write_timeout;
        let Some(session) = self.session.as_mut() else {
            self.metrics.record_send_dropped();
            warn!(line = %line, "backend_send_while_offline");
            return;
        };

        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.push(b'\n');

        match tokio::time::timeout(write_timeout, session.writer.write_all(&frame)).await {
            Ok(Ok(())) => {
                self.metrics.record_line_sent();
                debug!(line = %line, "backend_line_sent");
            }
            Ok(Err(e)) => {
                self.metrics.record_send_dropped();
                self.drop_session(&format!("write error: {e}"));
            }
            Err(_) => {
                self.metrics.record_send_dropped();
                self.drop_session("write timed out");
            }
        }
    }

    fn try_receive_line(&mut self) -> Option<String> {
        let session = self.session.as_mut()?;
        match session.lines.try_recv() {
            Ok(line) => Some(line),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.drop_session("connection closed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(retry: Duration) -> LinkSettings {
        LinkSettings {
            addr: "127.0.0.1:1".to_string(),
            handshake: "HELLO".to_string(),
            retry_interval: retry,
            connect_timeout: Duration::from_millis(200),
            write_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_reconnect_schedule() {
        let mut link = TcpLink::new(settings(Duration::from_secs(5)), Arc::new(Metrics::new()));
        let t0 = Instant::now();
        assert!(link.reconnect_due(t0));

        link.last_attempt = Some(t0);
        assert!(!link.reconnect_due(t0 + Duration::from_millis(4999)));
        assert!(link.reconnect_due(t0 + Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_send_while_offline_is_noop() {
        let metrics = Arc::new(Metrics::new());
        let mut link = TcpLink::new(settings(Duration::from_secs(5)), metrics.clone());
        link.send_line("CLOSED:1").await;

        assert!(!link.is_connected());
        assert_eq!(link.try_receive_line(), None);
        assert_eq!(metrics.report().sends_dropped, 1);
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config::default();
        let settings = LinkSettings::from_config(&config);
        assert_eq!(settings.addr, "127.0.0.1:8888");
        assert_eq!(settings.handshake, "HELLO");
        assert_eq!(settings.retry_interval, Duration::from_secs(5));
    }
}
