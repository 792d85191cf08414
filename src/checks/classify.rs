//! Maps probe failures and HTTP status codes onto [`ErrorCategory`].

use std::error::Error as StdError;
use std::io;

use crate::db::enums::ErrorCategory;
use crate::db::models::{TRANSPORT_FAILURE_STATUS, UNKNOWN_FAILURE_STATUS};

/// Up/down verdict and category for a received HTTP status code.
pub fn classify_status(status: u16) -> (bool, ErrorCategory) {
    match status {
        200..=399 => (true, ErrorCategory::None),
        400..=499 => (false, ErrorCategory::HttpClientError),
        500..=599 => (false, ErrorCategory::HttpServerError),
        _ => (false, ErrorCategory::UnknownError),
    }
}

/// `http_status` recorded for a probe that failed with `category` before a response arrived.
pub fn failure_status(category: ErrorCategory) -> Option<i32> {
    match category {
        ErrorCategory::NetworkError | ErrorCategory::SslError | ErrorCategory::TimeoutError => {
            Some(TRANSPORT_FAILURE_STATUS)
        }
        ErrorCategory::UnknownError => Some(UNKNOWN_FAILURE_STATUS),
        _ => None,
    }
}

pub fn classify_request_error(err: &reqwest::Error) -> ErrorCategory {
    if chain_has_tls_failure(err) {
        return ErrorCategory::SslError;
    }
    if err.is_timeout() {
        return ErrorCategory::TimeoutError;
    }
    if let Some(category) = chain_io_category(err) {
        return category;
    }
    if err.is_connect() || err.is_request() {
        return ErrorCategory::NetworkError;
    }
    ErrorCategory::UnknownError
}

pub fn classify_io_error(err: &io::Error) -> ErrorCategory {
    match err.kind() {
        io::ErrorKind::TimedOut => ErrorCategory::TimeoutError,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::AddrNotAvailable
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => ErrorCategory::NetworkError,
        _ => ErrorCategory::UnknownError,
    }
}

/// Walks the source chain looking for a rustls error, including one boxed
/// inside an `io::Error`. Message text is never inspected: reqwest errors
/// carry the request URL.
pub fn chain_has_tls_failure(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<rustls::Error>().is_some() {
            return true;
        }
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if io_err
                .get_ref()
                .is_some_and(|inner| inner.downcast_ref::<rustls::Error>().is_some())
            {
                return true;
            }
        }
        current = e.source();
    }
    false
}

fn chain_io_category(err: &(dyn StdError + 'static)) -> Option<ErrorCategory> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            match classify_io_error(io_err) {
                ErrorCategory::UnknownError => {}
                category => return Some(category),
            }
        }
        current = e.source();
    }
    None
}

/// Formats an error with its whole source chain, outermost first.
pub fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        let text = e.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        current = e.source();
    }
    message
}
