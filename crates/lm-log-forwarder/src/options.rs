// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Construction options for [`RecordSink::new`].
//!
//! Options are closures applied in order to the sink under construction;
//! later options override earlier ones. They only run while the root sink is
//! built, so the shared policy is fixed before the first record arrives.
//!
//! ```rust,ignore
//! let sink = RecordSink::new(
//!     Params::new([("system.displayname", "web-1")]),
//!     [
//!         with_log_level(LogLevel::Info),
//!         with_client_batching_enabled(Duration::from_secs(30)),
//!         with_metadata([("env", "staging")]),
//!     ],
//! )?;
//! ```
//!
//! [`RecordSink::new`]: crate::sink::RecordSink::new

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::encoder::{ConsoleEncoder, Encoder};
use crate::error::ForwarderError;
use crate::ingest::{AuthProvider, IngestSettings, IngesterClient, NopIngesterClient};
use crate::level::LogLevel;
use crate::metadata::Metadata;

pub const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Warn;
pub const DEFAULT_ASYNC: bool = true;
pub const DEFAULT_BATCHING_INTERVAL: Duration = Duration::from_secs(10);

/// Required construction parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    /// Tags mapping the forwarded logs to one LogicMonitor resource.
    pub resource_tags: HashMap<String, String>,
}

impl Params {
    pub fn new<K, V>(resource_tags: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            resource_tags: resource_tags
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ForwarderError> {
        if self.resource_tags.is_empty() {
            return Err(ForwarderError::Configuration(
                "sink initialization failed: resource tags are not set".to_string(),
            ));
        }
        Ok(())
    }
}

/// State of a sink under construction, mutated by [`SinkOption`]s.
pub struct SinkBuilder {
    pub(crate) settings: IngestSettings,
    pub(crate) async_enabled: bool,
    pub(crate) min_level: LogLevel,
    pub(crate) metadata: Metadata,
    pub(crate) encoder: Box<dyn Encoder>,
    pub(crate) client: Option<Arc<dyn IngesterClient>>,
    pub(crate) runtime: Option<Handle>,
}

impl SinkBuilder {
    pub(crate) fn new(params: Params) -> Self {
        Self {
            settings: IngestSettings {
                resource_tags: params.resource_tags,
                batching_enabled: false,
                batching_interval: DEFAULT_BATCHING_INTERVAL,
                auth_provider: None,
            },
            async_enabled: DEFAULT_ASYNC,
            min_level: DEFAULT_LOG_LEVEL,
            metadata: Metadata::new(),
            encoder: Box::new(ConsoleEncoder::new()),
            client: None,
            runtime: None,
        }
    }
}

impl std::fmt::Debug for SinkBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkBuilder")
            .field("settings", &self.settings)
            .field("async_enabled", &self.async_enabled)
            .field("min_level", &self.min_level)
            .field("metadata", &self.metadata)
            .field("encoder", &self.encoder)
            .field("client", &self.client.is_some())
            .finish_non_exhaustive()
    }
}

pub type SinkOption = Box<dyn FnOnce(&mut SinkBuilder) -> Result<(), ForwarderError> + Send>;

/// Forwards only records at `level` or above.
#[must_use]
pub fn with_log_level(level: LogLevel) -> SinkOption {
    Box::new(move |builder| {
        builder.min_level = level;
        Ok(())
    })
}

/// Enables client-side batching. A zero interval keeps the default interval.
///
/// While batching is enabled every send is synchronous, whatever the async
/// setting.
#[must_use]
pub fn with_client_batching_enabled(interval: Duration) -> SinkOption {
    Box::new(move |builder| {
        builder.settings.batching_enabled = true;
        if !interval.is_zero() {
            builder.settings.batching_interval = interval;
        }
        Ok(())
    })
}

/// Seeds the metadata tags attached to every forwarded record.
pub fn with_metadata<K, V>(metadata: impl IntoIterator<Item = (K, V)>) -> SinkOption
where
    K: Into<String>,
    V: Into<String>,
{
    let metadata: Metadata = metadata
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    Box::new(move |builder| {
        builder.metadata = metadata;
        Ok(())
    })
}

/// Sends without waiting for the outcome. No effect while batching is enabled.
#[must_use]
pub fn with_async() -> SinkOption {
    Box::new(|builder| {
        builder.async_enabled = true;
        Ok(())
    })
}

/// Waits for every send and reports its failure.
#[must_use]
pub fn with_blocking() -> SinkOption {
    Box::new(|builder| {
        builder.async_enabled = false;
        Ok(())
    })
}

#[must_use]
pub fn with_auth_provider(auth_provider: Arc<dyn AuthProvider>) -> SinkOption {
    Box::new(move |builder| {
        builder.settings.auth_provider = Some(auth_provider);
        Ok(())
    })
}

/// Replaces the HTTP client with one that sends nothing.
#[must_use]
pub fn with_nop_ingester_client() -> SinkOption {
    with_ingester_client(Arc::new(NopIngesterClient))
}

#[must_use]
pub fn with_ingester_client(client: Arc<dyn IngesterClient>) -> SinkOption {
    Box::new(move |builder| {
        builder.client = Some(client);
        Ok(())
    })
}

#[must_use]
pub fn with_encoder(encoder: impl Encoder + 'static) -> SinkOption {
    Box::new(move |builder| {
        builder.encoder = Box::new(encoder);
        Ok(())
    })
}

/// Runtime used for fire-and-forget sends and the batching task. Defaults to
/// the runtime the sink is constructed on.
#[must_use]
pub fn with_runtime(runtime: Handle) -> SinkOption {
    Box::new(move |builder| {
        builder.runtime = Some(runtime);
        Ok(())
    })
}
