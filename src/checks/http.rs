use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Method, Url};
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use super::classify::{classify_request_error, classify_status, describe};
use super::{millis, ProbeOutcome};
use crate::db::enums::ErrorCategory;
use crate::db::models::{LatencyBreakdown, Monitor};

#[derive(Debug, Clone, Copy)]
struct PreflightTimings {
    dns_ms: i64,
    connect_ms: i64,
}

/// Resolves and connects on a throwaway socket to time DNS and TCP connect.
/// The real request opens its own connection, so these figures are indicative.
async fn preflight(url: &Url, deadline: Instant) -> Option<PreflightTimings> {
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;

    let started = Instant::now();
    let addrs = timeout_at(deadline, lookup_host((host, port))).await.ok()?.ok()?;
    let dns_ms = millis(started.elapsed());

    let addr = addrs.into_iter().next()?;
    let started = Instant::now();
    let _stream = timeout_at(deadline, TcpStream::connect(addr)).await.ok()?.ok()?;
    let connect_ms = millis(started.elapsed());

    Some(PreflightTimings { dns_ms, connect_ms })
}

fn request_method(monitor: &Monitor) -> Method {
    monitor
        .http_method
        .as_deref()
        .and_then(|m| Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).ok())
        .unwrap_or(Method::GET)
}

pub async fn probe_http(client: &reqwest::Client, monitor: &Monitor, timeout: Duration) -> ProbeOutcome {
    let deadline = Instant::now() + timeout;
    let url = match Url::parse(monitor.url.trim()) {
        Ok(url) => url,
        Err(e) => {
            return ProbeOutcome::failed(
                ErrorCategory::UnknownError,
                format!("Unknown Error: invalid URL {}: {e}", monitor.url),
                Duration::ZERO,
            )
        }
    };

    let timings = preflight(&url, deadline).await;

    let mut request = client
        .request(request_method(monitor), url)
        .timeout(deadline.saturating_duration_since(Instant::now()));
    if let Some(headers) = &monitor.http_headers {
        for (name, value) in headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => request = request.header(name, value),
                _ => warn!(monitor_id = monitor.id, header = %name, "Skipping invalid HTTP header."),
            }
        }
    }

    let started = Instant::now();
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => return request_failure(&e, started.elapsed()),
    };
    let ttfb_ms = millis(started.elapsed());
    let status = response.status();

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => return request_failure(&e, started.elapsed()),
    };
    let response_time_ms = millis(started.elapsed());

    let latency = match timings {
        Some(t) => LatencyBreakdown {
            dns_ms: Some(t.dns_ms),
            connect_ms: Some(t.connect_ms),
            ttfb_ms: Some(ttfb_ms),
            exact: false,
        },
        None => LatencyBreakdown::approximate(response_time_ms),
    };

    let (mut is_up, mut category) = classify_status(status.as_u16());
    let mut error_message = (!is_up).then(|| {
        format!(
            "HTTP Error {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown Status")
        )
    });

    if is_up {
        if let Some(needle) = monitor.content_match.as_deref().filter(|n| !n.is_empty()) {
            if !String::from_utf8_lossy(&body).contains(needle) {
                is_up = false;
                category = ErrorCategory::ContentMismatch;
                error_message = Some(format!("Response body does not contain \"{needle}\""));
            }
        }
    }

    debug!(
        monitor_id = monitor.id,
        status = status.as_u16(),
        response_time_ms,
        is_up,
        "HTTP probe finished."
    );

    ProbeOutcome {
        is_up,
        http_status: Some(i32::from(status.as_u16())),
        response_time_ms,
        latency: Some(latency),
        response_size_bytes: Some(body.len() as i64),
        error_category: category,
        error_message,
    }
}

fn request_failure(err: &reqwest::Error, elapsed: Duration) -> ProbeOutcome {
    let category = classify_request_error(err);
    let prefix = match category {
        ErrorCategory::TimeoutError => "Timeout Error",
        ErrorCategory::SslError => "SSL Error",
        ErrorCategory::NetworkError => "Connection Error",
        _ => "Unknown Error",
    };
    ProbeOutcome::failed(category, format!("{prefix}: {}", describe(err)), elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::{MonitorStatus, MonitorType};
    use chrono::Utc;
    use std::collections::HashMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn monitor(url: String) -> Monitor {
        let now = Utc::now();
        Monitor {
            id: 1,
            user_id: 1,
            url,
            monitor_type: MonitorType::Http,
            check_interval_seconds: 60,
            timeout_seconds: 5,
            status: MonitorStatus::Unknown,
            last_checked_at: None,
            last_status_change_at: None,
            next_check_at: now,
            content_match: None,
            http_method: None,
            http_headers: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Serves one canned response per accepted connection; preflight connections
    /// that send nothing are closed without a reply.
    async fn serve(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    match socket.read(&mut buf).await {
                        Ok(n) if n > 0 => {
                            let _ = socket.write_all(response.as_bytes()).await;
                            let _ = socket.shutdown().await;
                        }
                        _ => {}
                    }
                });
            }
        });
        format!("http://{addr}/health")
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().build().unwrap()
    }

    #[tokio::test]
    async fn success_with_matching_content_is_up() {
        let url = serve("HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\nall systems").await;
        let mut m = monitor(url);
        m.content_match = Some("systems".to_string());
        let outcome = probe_http(&client(), &m, Duration::from_secs(5)).await;
        assert!(outcome.is_up);
        assert_eq!(outcome.http_status, Some(200));
        assert_eq!(outcome.response_size_bytes, Some(11));
        assert_eq!(outcome.error_category, ErrorCategory::None);
        assert!(!outcome.latency.unwrap().exact);
    }

    #[tokio::test]
    async fn missing_content_is_a_mismatch() {
        let url = serve("HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello").await;
        let mut m = monitor(url);
        m.content_match = Some("welcome".to_string());
        let outcome = probe_http(&client(), &m, Duration::from_secs(5)).await;
        assert!(!outcome.is_up);
        assert_eq!(outcome.http_status, Some(200));
        assert_eq!(outcome.error_category, ErrorCategory::ContentMismatch);
    }

    #[tokio::test]
    async fn server_errors_are_down() {
        let url = serve("HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let mut m = monitor(url);
        m.http_headers = Some(HashMap::from([("X-Probe".to_string(), "1".to_string())]));
        let outcome = probe_http(&client(), &m, Duration::from_secs(5)).await;
        assert!(!outcome.is_up);
        assert_eq!(outcome.http_status, Some(503));
        assert_eq!(outcome.error_category, ErrorCategory::HttpServerError);
        assert_eq!(
            outcome.error_message.as_deref(),
            Some("HTTP Error 503: Service Unavailable")
        );
    }

    #[tokio::test]
    async fn refused_connection_is_a_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let outcome = probe_http(&client(), &monitor(format!("http://{addr}/")), Duration::from_secs(2)).await;
        assert!(!outcome.is_up);
        assert_eq!(outcome.error_category, ErrorCategory::NetworkError);
        assert_eq!(outcome.http_status, Some(-1));
    }

    #[tokio::test]
    async fn tls_words_in_url_do_not_make_a_refusal_an_ssl_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = format!("http://{addr}/ssl-certificate/tls-handshake");
        let outcome = probe_http(&client(), &monitor(url), Duration::from_secs(2)).await;
        assert_eq!(outcome.error_category, ErrorCategory::NetworkError);
        assert!(outcome
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("Connection Error:"));
    }

    #[tokio::test]
    async fn invalid_url_is_unknown() {
        let outcome = probe_http(&client(), &monitor("not a url".to_string()), Duration::from_secs(1)).await;
        assert_eq!(outcome.error_category, ErrorCategory::UnknownError);
        assert_eq!(outcome.http_status, Some(-2));
    }

    #[test]
    fn method_defaults_to_get() {
        let mut m = monitor("http://localhost".to_string());
        assert_eq!(request_method(&m), Method::GET);
        m.http_method = Some("head".to_string());
        assert_eq!(request_method(&m), Method::HEAD);
    }
}
