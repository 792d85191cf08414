use reqwest::Url;
use std::net::IpAddr;
use std::time::Duration;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, SurgeError, ICMP};
use tokio::net::lookup_host;
use tokio::time::Instant;
use tracing::warn;

use super::{millis, ProbeOutcome};
use crate::db::enums::ErrorCategory;

const PAYLOAD: [u8; 32] = [0; 32];

/// ICMP sockets for both address families. Opening them needs raw-socket
/// privileges, so either may be missing.
#[derive(Clone, Default)]
pub struct IcmpClients {
    v4: Option<Client>,
    v6: Option<Client>,
}

impl IcmpClients {
    pub fn open() -> Self {
        let v4 = Client::new(&Config::default())
            .map_err(|e| warn!(error = %e, "ICMPv4 socket unavailable, PING monitors will fail."))
            .ok();
        let v6 = Client::new(&Config::builder().kind(ICMP::V6).build())
            .map_err(|e| warn!(error = %e, "ICMPv6 socket unavailable."))
            .ok();
        Self { v4, v6 }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }

    fn for_addr(&self, addr: &IpAddr) -> Option<&Client> {
        match addr {
            IpAddr::V4(_) => self.v4.as_ref(),
            IpAddr::V6(_) => self.v6.as_ref(),
        }
    }
}

/// Accepts a bare host, an IP literal or a URL and returns the host part.
pub fn ping_host(target: &str) -> Option<String> {
    let target = target.trim();
    let host = if target.contains("://") {
        Url::parse(target).ok()?.host_str()?.to_string()
    } else {
        target.to_string()
    };
    let host = host.trim_matches(|c| c == '[' || c == ']');
    (!host.is_empty()).then(|| host.to_string())
}

async fn resolve(host: &str) -> std::io::Result<Option<IpAddr>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(Some(ip));
    }
    Ok(lookup_host((host, 0)).await?.next().map(|addr| addr.ip()))
}

pub async fn probe_ping(clients: &IcmpClients, target: &str, timeout: Duration) -> ProbeOutcome {
    let started = Instant::now();
    let Some(host) = ping_host(target) else {
        return ProbeOutcome::failed(
            ErrorCategory::UnknownError,
            format!("Unknown Error: invalid ping target {target}"),
            Duration::ZERO,
        );
    };

    let addr = match tokio::time::timeout(timeout, resolve(&host)).await {
        Ok(Ok(Some(addr))) => addr,
        Ok(Ok(None)) | Ok(Err(_)) => {
            return ProbeOutcome::failed(
                ErrorCategory::NetworkError,
                format!("Connection Error: could not resolve {host}"),
                started.elapsed(),
            )
        }
        Err(_) => {
            return ProbeOutcome::failed(
                ErrorCategory::TimeoutError,
                format!("Timeout Error: resolving {host} timed out"),
                started.elapsed(),
            )
        }
    };

    let Some(client) = clients.for_addr(&addr) else {
        return ProbeOutcome::failed(
            ErrorCategory::UnknownError,
            "Unknown Error: ICMP socket unavailable",
            started.elapsed(),
        );
    };

    let remaining = timeout.saturating_sub(started.elapsed());
    let mut pinger = client.pinger(addr, PingIdentifier(rand::random())).await;
    pinger.timeout(remaining);
    match pinger.ping(PingSequence(0), &PAYLOAD).await {
        Ok((_reply, rtt)) => ProbeOutcome::up(millis(rtt)),
        Err(SurgeError::Timeout { .. }) => ProbeOutcome::failed(
            ErrorCategory::TimeoutError,
            format!("Timeout Error: no echo reply from {addr}"),
            started.elapsed(),
        ),
        Err(e) => ProbeOutcome::failed(
            ErrorCategory::NetworkError,
            format!("Connection Error: ping {addr} failed: {e}"),
            started.elapsed(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_host_from_targets() {
        assert_eq!(ping_host("8.8.8.8").as_deref(), Some("8.8.8.8"));
        assert_eq!(ping_host("https://example.com/health").as_deref(), Some("example.com"));
        assert_eq!(ping_host("[::1]").as_deref(), Some("::1"));
        assert_eq!(ping_host("   "), None);
    }

    #[tokio::test]
    async fn missing_socket_reports_unknown_error() {
        let outcome = probe_ping(&IcmpClients::unavailable(), "127.0.0.1", Duration::from_secs(1)).await;
        assert!(!outcome.is_up);
        assert_eq!(outcome.error_category, ErrorCategory::UnknownError);
        assert_eq!(outcome.http_status, Some(-2));
        assert_eq!(
            outcome.error_message.as_deref(),
            Some("Unknown Error: ICMP socket unavailable")
        );
    }
}
