// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client for the LogicMonitor log ingest API.
//!
//! Each message becomes one JSON entry:
//!
//! ```text
//! {"message": "...", "_lm.resourceId": {"system.displayname": "web-1"}, "level": "warn", ...}
//! ```
//!
//! Entries are POSTed as a JSON array to `{endpoint}/log/ingest`. When a
//! request signer is configured, its output becomes the `Authorization` header.
//! Failed requests are reported, never retried.

use std::collections::HashMap;
use std::env;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::batcher::{BatcherHandle, BatcherService};
use super::constants::{DEFAULT_REQUEST_TIMEOUT, INGEST_PATH, RESOURCE_ID_KEY};
use super::{AuthProvider, IngestError, IngestSettings, IngesterClient};

/// One element of the ingest payload array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestEntry {
    pub message: String,
    #[serde(rename = "_lm.resourceId")]
    pub resource_id: HashMap<String, String>,
    #[serde(flatten)]
    pub metadata: HashMap<String, String>,
}

impl IngestEntry {
    #[must_use]
    pub fn new(
        message: String,
        resource_tags: &HashMap<String, String>,
        mut metadata: HashMap<String, String>,
    ) -> Self {
        // Reserved keys would produce duplicate members once flattened.
        metadata.remove("message");
        metadata.remove(RESOURCE_ID_KEY);
        Self {
            message,
            resource_id: resource_tags.clone(),
            metadata,
        }
    }
}

pub struct IngestClientConfig {
    /// REST endpoint, e.g. `https://acme.logicmonitor.com/rest`.
    pub endpoint: String,
    pub timeout: Duration,
    pub batching_enabled: bool,
    pub batching_interval: Duration,
    pub auth_provider: Option<Arc<dyn AuthProvider>>,
}

impl IngestClientConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, settings: &IngestSettings) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            batching_enabled: settings.batching_enabled,
            batching_interval: settings.batching_interval,
            auth_provider: settings.auth_provider.clone(),
        }
    }

    /// Resolves the endpoint from the environment.
    ///
    /// `LM_INGEST_ENDPOINT` wins when set; otherwise the endpoint is derived
    /// from the `LM_ACCOUNT` company name.
    pub fn from_env(settings: &IngestSettings) -> Result<Self, IngestError> {
        let endpoint = match env::var("LM_INGEST_ENDPOINT") {
            Ok(endpoint) if !endpoint.trim().is_empty() => endpoint,
            _ => {
                let account = env::var("LM_ACCOUNT")
                    .ok()
                    .filter(|account| !account.trim().is_empty())
                    .ok_or(IngestError::MissingAccount)?;
                format!("https://{}.logicmonitor.com/rest", account.trim())
            }
        };
        Ok(Self::new(endpoint, settings))
    }

    fn ingest_url(&self) -> String {
        format!("{}{INGEST_PATH}", self.endpoint.trim_end_matches('/'))
    }
}

/// Builds the reqwest client with rustls.
fn create_reqwest_client(timeout: Duration) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ))?,
    );
    Ok(reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .default_headers(headers)
        .build()?)
}

/// Performs the actual POST. Shared by the inline path and the batcher.
#[derive(Clone)]
pub(crate) struct Shipper {
    client: reqwest::Client,
    url: String,
    auth_provider: Option<Arc<dyn AuthProvider>>,
}

impl Shipper {
    pub(crate) fn from_config(config: &IngestClientConfig) -> Result<Self, IngestError> {
        let client = create_reqwest_client(config.timeout)
            .map_err(|e| IngestError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: config.ingest_url(),
            auth_provider: config.auth_provider.clone(),
        })
    }

    pub(crate) async fn ship(
        &self,
        entries: &[IngestEntry],
        cancel: &CancellationToken,
    ) -> Result<(), IngestError> {
        let body = serde_json::to_vec(entries)?;
        self.ship_payload(body, entries.len(), cancel).await
    }

    /// POSTs an already serialized JSON array of `count` entries.
    pub(crate) async fn ship_payload(
        &self,
        body: Vec<u8>,
        count: usize,
        cancel: &CancellationToken,
    ) -> Result<(), IngestError> {
        let mut request = self.client.post(&self.url);
        if let Some(auth_provider) = &self.auth_provider {
            request = request.header(
                AUTHORIZATION,
                auth_provider.get_credentials("POST", INGEST_PATH, &body),
            );
        }
        let request = request.body(body);

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(IngestError::Cancelled),
            response = request.send() => response?,
        };

        let status = response.status();
        if status.is_success() {
            debug!("LOGS | Shipped {} log entries", count);
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(IngestError::Status { status, body })
    }
}

/// [`IngesterClient`] backed by the LogicMonitor ingest REST API.
#[derive(Clone)]
pub struct LogIngestClient {
    shipper: Shipper,
    batcher: Option<BatcherHandle>,
}

impl LogIngestClient {
    /// Creates the client. With batching enabled, the batcher task is spawned
    /// on `runtime`; it stops once every clone of the client is dropped.
    pub fn new(config: IngestClientConfig, runtime: &Handle) -> Result<Self, IngestError> {
        let shipper = Shipper::from_config(&config)?;

        let batcher = if config.batching_enabled {
            if config.batching_interval.is_zero() {
                return Err(IngestError::Client(
                    "batching interval must be greater than zero".to_string(),
                ));
            }
            let (service, handle) =
                BatcherService::new(shipper.clone(), config.batching_interval);
            runtime.spawn(service.run());
            Some(handle)
        } else {
            None
        };

        Ok(Self { shipper, batcher })
    }

    #[must_use]
    pub fn is_batching(&self) -> bool {
        self.batcher.is_some()
    }
}

#[async_trait]
impl IngesterClient for LogIngestClient {
    async fn send_logs(
        &self,
        cancel: &CancellationToken,
        message: String,
        resource_tags: &HashMap<String, String>,
        metadata: HashMap<String, String>,
    ) -> Result<(), IngestError> {
        let entry = IngestEntry::new(message, resource_tags, metadata);
        match &self.batcher {
            Some(batcher) => batcher.insert(entry),
            None => self.shipper.ship(std::slice::from_ref(&entry), cancel).await,
        }
    }

    async fn flush(&self) -> Result<(), IngestError> {
        match &self.batcher {
            Some(batcher) => batcher.flush().await,
            None => Ok(()),
        }
    }
}
