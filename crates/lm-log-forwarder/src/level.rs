// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Severity levels understood by the forwarder.
//!
//! Levels are totally ordered from least to most severe:
//! `Trace < Debug < Info < Warn < Error < Fatal`. The sink's level gate is a
//! plain `>=` comparison against the configured minimum.
//!
//! `Fatal` has no `tracing` counterpart; it exists for callers driving a
//! [`RecordSink`](crate::sink::RecordSink) directly and is the only level above
//! the flush threshold.
//!
//! If no level is configured, or an invalid value is deserialized, the
//! forwarder defaults to **WARN**.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::error;

/// Minimum severity gate and per-record severity.
///
/// ```
/// use lm_log_forwarder::level::LogLevel;
/// use std::str::FromStr;
///
/// assert_eq!(LogLevel::from_str("INFO").unwrap(), LogLevel::Info);
/// assert!(LogLevel::Error > LogLevel::Warn);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
    /// The process is about to go down. Records at this level trigger a flush.
    Fatal,
}

impl LogLevel {
    /// Lowercase name, used for the `level` metadata tag and the encoders.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }

    /// Uppercase name, used by the console encoder.
    #[must_use]
    pub fn as_capital_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

/// Parses log levels with case-insensitive matching.
///
/// `"warning"` and `"critical"` are accepted as aliases of `warn` and `fatal`.
impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" | "critical" => Ok(LogLevel::Fatal),
            _ => Err(format!(
                "Invalid log level: '{s}'. Valid levels are: trace, debug, info, warn, error, fatal",
            )),
        }
    }
}

/// Lenient deserialization: an invalid or non-string value is logged and
/// replaced by the default `Warn` level instead of failing the whole config.
impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        if let Value::String(s) = value {
            match LogLevel::from_str(&s) {
                Ok(level) => Ok(level),
                Err(e) => {
                    error!("{}", e);
                    Ok(LogLevel::Warn)
                }
            }
        } else {
            error!("Expected a string for log level, got {:?}", value);
            Ok(LogLevel::Warn)
        }
    }
}
