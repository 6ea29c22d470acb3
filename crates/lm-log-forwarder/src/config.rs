// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ForwarderError;
use crate::level::LogLevel;
use crate::options::{
    with_async, with_blocking, with_client_batching_enabled, with_log_level, with_metadata,
    Params, SinkOption, DEFAULT_ASYNC, DEFAULT_BATCHING_INTERVAL,
};

/// Declarative forwarder configuration, e.g. loaded from a JSON or YAML file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Tags mapping the forwarded logs to one LogicMonitor resource
    pub resource_tags: HashMap<String, String>,
    /// Minimum level forwarded (trace, debug, info, warn, error, fatal)
    pub log_level: LogLevel,
    /// Static tags attached to every forwarded record
    pub metadata: HashMap<String, String>,
    /// Whether unbatched sends return before the ingest call completes
    #[serde(rename = "async")]
    pub async_enabled: bool,
    /// Whether the ingest client batches records
    #[serde(rename = "batching")]
    pub batching_enabled: bool,
    /// Batch interval in seconds
    pub batching_interval_secs: u64,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            resource_tags: HashMap::new(),
            log_level: LogLevel::default(),
            metadata: HashMap::new(),
            async_enabled: DEFAULT_ASYNC,
            batching_enabled: false,
            batching_interval_secs: DEFAULT_BATCHING_INTERVAL.as_secs(),
        }
    }
}

impl ForwarderConfig {
    pub fn validate(&self) -> Result<(), ForwarderError> {
        if self.resource_tags.is_empty() {
            return Err(ForwarderError::Configuration(
                "resource_tags must not be empty".to_string(),
            ));
        }

        if self.batching_enabled && self.batching_interval_secs == 0 {
            return Err(ForwarderError::Configuration(
                "batching_interval_secs must be greater than 0 when batching is enabled"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Validates and converts into the arguments of [`RecordSink::new`].
    ///
    /// Callers can append further options (a custom client, an encoder) to
    /// the returned list.
    ///
    /// [`RecordSink::new`]: crate::sink::RecordSink::new
    pub fn into_parts(self) -> Result<(Params, Vec<SinkOption>), ForwarderError> {
        self.validate()?;

        let mut options = vec![
            with_log_level(self.log_level),
            with_metadata(self.metadata),
            if self.async_enabled {
                with_async()
            } else {
                with_blocking()
            },
        ];
        if self.batching_enabled {
            options.push(with_client_batching_enabled(Duration::from_secs(
                self.batching_interval_secs,
            )));
        }

        Ok((
            Params {
                resource_tags: self.resource_tags,
            },
            options,
        ))
    }
}
