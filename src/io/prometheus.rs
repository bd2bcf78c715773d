//! Prometheus metrics HTTP endpoint
//!
//! Exposes station metrics in Prometheus text format at /metrics and a small
//! JSON status document at /health. Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with station label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    station: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{station=\"{station}\"}} {val}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, station_id: &str) -> String {
    let summary = metrics.report();
    let mut output = String::with_capacity(4096);

    write_lane_metrics(&mut output, station_id, &summary);
    write_link_metrics(&mut output, station_id, &summary);
    write_display_metrics(&mut output, station_id, &summary);

    output
}

fn write_lane_metrics(output: &mut String, station: &str, summary: &MetricsSummary) {
    let counters = [
        ("barrier_cards_scanned_total", "Credential scans sent to the backend", summary.cards_scanned),
        ("barrier_checkouts_total", "Ticketless exit requests", summary.checkouts),
        ("barrier_opens_total", "Barrier open commands executed", summary.opens),
        ("barrier_opens_ignored_total", "OPEN commands ignored in a busy lane", summary.opens_ignored),
        ("barrier_rejects_total", "Requests rejected by the backend", summary.rejects),
        ("barrier_timeouts_total", "Requests abandoned on server timeout", summary.timeouts),
        ("barrier_closes_total", "Barrier close cycles completed", summary.closes),
        ("barrier_presence_flickers_total", "Presence flicker alerts", summary.presence_flickers),
    ];
    for (name, help, val) in counters {
        write_metric(output, name, help, MetricType::Counter, station, val);
    }

    let _ = writeln!(
        output,
        "# HELP barrier_lane_state Lane state (0=idle, 1=waiting_server, 2=opened, 3=closing)"
    );
    let _ = writeln!(output, "# TYPE barrier_lane_state gauge");
    for (lane, state) in [("entry", summary.entry_state), ("exit", summary.exit_state)] {
        let _ = writeln!(
            output,
            "barrier_lane_state{{station=\"{station}\",lane=\"{lane}\"}} {state}"
        );
    }

    let _ = writeln!(output, "# HELP barrier_slots_available Free parking slots reported by the backend");
    let _ = writeln!(output, "# TYPE barrier_slots_available gauge");
    for (kind, count) in [("car", summary.car_slots), ("motor", summary.motor_slots)] {
        let _ = writeln!(
            output,
            "barrier_slots_available{{station=\"{station}\",kind=\"{kind}\"}} {count}"
        );
    }
}

fn write_link_metrics(output: &mut String, station: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "barrier_link_connected",
        "Backend link status (1=connected)",
        MetricType::Gauge,
        station,
        summary.link_connected as u64,
    );
    let counters = [
        ("barrier_link_connect_attempts_total", "Backend connect attempts", summary.connect_attempts),
        ("barrier_link_connects_total", "Successful backend connects", summary.connects),
        ("barrier_link_disconnects_total", "Backend link drops", summary.disconnects),
        ("barrier_lines_received_total", "Inbound protocol lines", summary.lines_received),
        ("barrier_lines_unknown_total", "Inbound lines with no known command", summary.lines_unknown),
        ("barrier_lines_malformed_total", "Inbound lines dropped for a bad payload", summary.lines_malformed),
        ("barrier_lines_sent_total", "Outbound protocol lines", summary.lines_sent),
        ("barrier_sends_dropped_total", "Outbound lines dropped while offline", summary.sends_dropped),
    ];
    for (name, help, val) in counters {
        write_metric(output, name, help, MetricType::Counter, station, val);
    }
}

fn write_display_metrics(output: &mut String, station: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "barrier_display_refreshes_total",
        "Display redraws",
        MetricType::Counter,
        station,
        summary.display_refreshes,
    );
    write_metric(
        output,
        "barrier_display_suppressed_total",
        "Display updates suppressed as unchanged",
        MetricType::Counter,
        station,
        summary.display_suppressed,
    );
}

/// Gauges only; tick statistics are left to `report()`
fn format_health(metrics: &Metrics, station_id: &str) -> String {
    let (car, motor) = metrics.slots();
    serde_json::json!({
        "ok": true,
        "station": station_id,
        "link_connected": metrics.link_connected(),
        "slots": { "car": car, "motor": motor },
    })
    .to_string()
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    station_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics, &station_id);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(format_health(&metrics, &station_id))))
            .expect("static response should not fail")),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    station_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let station_id = Arc::new(station_id);

    info!(port = %port, station = %station_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let station_id = station_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let station_id = station_id.clone();
                                async move { handle_request(req, metrics, station_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{LaneId, LaneState};

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_card_scanned();
        metrics.record_open();
        metrics.record_connected();
        metrics.set_lane_state(LaneId::Entry, LaneState::Opened);
        metrics.set_slots(3, 7);

        let output = format_prometheus_metrics(&metrics, "gate-a");

        assert!(output.contains("barrier_cards_scanned_total{station=\"gate-a\"} 1"));
        assert!(output.contains("barrier_opens_total{station=\"gate-a\"} 1"));
        assert!(output.contains("barrier_link_connected{station=\"gate-a\"} 1"));
        assert!(output.contains("barrier_lane_state{station=\"gate-a\",lane=\"entry\"} 2"));
        assert!(output.contains("barrier_slots_available{station=\"gate-a\",kind=\"motor\"} 7"));
    }

    #[test]
    fn test_health_reports_slots() {
        let metrics = Metrics::new();
        metrics.set_slots(12, 40);
        let value: serde_json::Value =
            serde_json::from_str(&format_health(&metrics, "gate-a")).unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(value["link_connected"], false);
        assert_eq!(value["slots"]["car"], 12);
        assert_eq!(value["slots"]["motor"], 40);
    }

    #[test]
    fn test_health_leaves_tick_stats_alone() {
        let metrics = Metrics::new();
        metrics.record_tick(250);
        metrics.record_tick(90);

        format_health(&metrics, "gate-a");
        format_health(&metrics, "gate-a");

        assert_eq!(metrics.report().tick_max_us, 250);
    }
}
