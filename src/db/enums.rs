use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a text-backed enum stored as its SCREAMING_SNAKE_CASE name.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident as $kind:literal {
            $( $variant:ident => $text:literal $(| $alias:literal)* ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $( $variant ),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $text ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $( $text $(| $alias)* => Ok(Self::$variant), )+
                    _ => Err(ParseEnumError {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum! {
    /// Kind of probe performed against a monitor's target.
    MonitorType as "monitor type" {
        Http => "HTTP" | "HTTPS" | "HTTP_HTTPS",
        Ping => "PING",
        Port => "PORT" | "TCP",
    }
}

text_enum! {
    MonitorStatus as "monitor status" {
        Unknown => "UNKNOWN",
        Up => "UP",
        Down => "DOWN",
        Paused => "PAUSED",
    }
}

text_enum! {
    /// Structured reason attached to every check result. `None` means the check passed.
    ErrorCategory as "error category" {
        HttpClientError => "HTTP_CLIENT_ERROR",
        HttpServerError => "HTTP_SERVER_ERROR",
        NetworkError => "NETWORK_ERROR",
        SslError => "SSL_ERROR",
        TimeoutError => "TIMEOUT_ERROR",
        ContentMismatch => "CONTENT_MISMATCH",
        UnknownError => "UNKNOWN_ERROR",
        None => "NONE",
    }
}

text_enum! {
    AlertType as "alert type" {
        Email => "EMAIL",
        DiscordWebhook => "DISCORD_WEBHOOK",
        Telegram => "TELEGRAM",
        GenericWebhook => "GENERIC_WEBHOOK" | "WEBHOOK",
    }
}

text_enum! {
    AlertOutcome as "alert outcome" {
        Sent => "SENT",
        Failed => "FAILED",
        Throttled => "THROTTLED",
    }
}

impl MonitorStatus {
    pub fn from_probe(is_up: bool) -> Self {
        if is_up {
            MonitorStatus::Up
        } else {
            MonitorStatus::Down
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_aliases() {
        assert_eq!("HTTP_HTTPS".parse::<MonitorType>().unwrap(), MonitorType::Http);
        assert_eq!("tcp".parse::<MonitorType>().unwrap(), MonitorType::Port);
        assert_eq!(
            "webhook".parse::<AlertType>().unwrap(),
            AlertType::GenericWebhook
        );
    }

    #[test]
    fn rejects_unknown_values() {
        let err = "SOMETIMES".parse::<MonitorStatus>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown monitor status value: SOMETIMES");
    }

    #[test]
    fn serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::ContentMismatch).unwrap();
        assert_eq!(json, "\"CONTENT_MISMATCH\"");
        let parsed: AlertType = serde_json::from_str("\"DISCORD_WEBHOOK\"").unwrap();
        assert_eq!(parsed, AlertType::DiscordWebhook);
    }
}
