use reqwest::Url;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::{timeout_at, Instant};

use super::classify::classify_io_error;
use super::{millis, ProbeOutcome};
use crate::db::enums::ErrorCategory;
use crate::db::models::LatencyBreakdown;

/// Extracts `(host, port)` from either a URL with a port (explicit or scheme
/// default) or a bare `host:port` / `[v6]:port` pair.
pub fn parse_target(target: &str) -> Option<(String, u16)> {
    let target = target.trim();
    if target.contains("://") {
        let url = Url::parse(target).ok()?;
        let host = url.host_str()?.trim_matches(|c| c == '[' || c == ']').to_string();
        let port = url.port_or_known_default()?;
        return Some((host, port));
    }
    let (host, port) = target.rsplit_once(':')?;
    let host = host.trim_matches(|c| c == '[' || c == ']');
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port.parse().ok()?))
}

pub async fn probe_port(target: &str, timeout: Duration) -> ProbeOutcome {
    let Some((host, port)) = parse_target(target) else {
        return ProbeOutcome::failed(
            ErrorCategory::UnknownError,
            format!("Unknown Error: target {target} is not host:port"),
            Duration::ZERO,
        );
    };
    let deadline = Instant::now() + timeout;
    let started = Instant::now();

    let addrs = match timeout_at(deadline, lookup_host((host.as_str(), port))).await {
        Ok(Ok(addrs)) => addrs.collect::<Vec<_>>(),
        Ok(Err(e)) => {
            return ProbeOutcome::failed(
                ErrorCategory::NetworkError,
                format!("Connection Error: could not resolve {host}: {e}"),
                started.elapsed(),
            )
        }
        Err(_) => return timed_out(&host, port, started.elapsed()),
    };
    let dns_ms = millis(started.elapsed());
    let Some(addr) = addrs.first().copied() else {
        return ProbeOutcome::failed(
            ErrorCategory::NetworkError,
            format!("Connection Error: {host} resolved to no addresses"),
            started.elapsed(),
        );
    };

    let connect_started = Instant::now();
    match timeout_at(deadline, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => {
            let connect_ms = millis(connect_started.elapsed());
            let mut outcome = ProbeOutcome::up(millis(started.elapsed()));
            outcome.latency = Some(LatencyBreakdown {
                dns_ms: Some(dns_ms),
                connect_ms: Some(connect_ms),
                ttfb_ms: None,
                exact: true,
            });
            outcome
        }
        Ok(Err(e)) => {
            let category = match classify_io_error(&e) {
                ErrorCategory::UnknownError => ErrorCategory::NetworkError,
                category => category,
            };
            ProbeOutcome::failed(
                category,
                format!("Connection Error: {host}:{port}: {e}"),
                started.elapsed(),
            )
        }
        Err(_) => timed_out(&host, port, started.elapsed()),
    }
}

fn timed_out(host: &str, port: u16, elapsed: Duration) -> ProbeOutcome {
    ProbeOutcome::failed(
        ErrorCategory::TimeoutError,
        format!("Timeout Error: {host}:{port} did not answer in time"),
        elapsed,
    )
}
