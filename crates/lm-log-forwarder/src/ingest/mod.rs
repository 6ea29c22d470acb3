// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ingest clients: the capability the dispatcher hands encoded records to.
//!
//! # Components
//!
//! - **[`IngesterClient`]**: the trait every client implements
//! - **[`NopIngesterClient`]**: accepts everything, sends nothing (tests)
//! - **[`client::LogIngestClient`]**: HTTP client for the LogicMonitor log
//!   ingest API, optionally batching internally
//! - **[`batcher`]**: actor owning the batch queue of the HTTP client
//! - **[`constants`]**: endpoint path and batch limits
//!
//! # Data Flow
//!
//! ```text
//!   Dispatcher::notify
//!          │
//!          v
//!   ┌─────────────────┐   batching off   ┌─────────────┐
//!   │ LogIngestClient │ ───────────────> │  HTTP POST  │
//!   └────────┬────────┘                  └─────────────┘
//!            │ batching on                      ^
//!            v                                  │
//!   ┌─────────────────┐  interval / size / flush│
//!   │ BatcherService  │ ────────────────────────┘
//!   └─────────────────┘
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

pub mod batcher;
pub mod client;
pub mod constants;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("LM_ACCOUNT is not set and no ingest endpoint was configured")]
    MissingAccount,

    #[error("Ingest client error: {0}")]
    Client(String),

    #[error("Failed to send logs: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Ingest endpoint rejected logs with {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Failed to serialize log payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Log send was cancelled")]
    Cancelled,

    #[error("Log batcher is no longer running")]
    BatcherClosed,

    #[error("Log batcher queue is full")]
    QueueFull,
}

/// Produces the `Authorization` header value for an ingest request.
///
/// Implemented by callers that sign requests (LMv1 tokens, bearer tokens). The
/// forwarder treats the returned string as opaque.
pub trait AuthProvider: Send + Sync {
    fn get_credentials(&self, method: &str, uri: &str, body: &[u8]) -> String;
}

impl<F> AuthProvider for F
where
    F: Fn(&str, &str, &[u8]) -> String + Send + Sync,
{
    fn get_credentials(&self, method: &str, uri: &str, body: &[u8]) -> String {
        self(method, uri, body)
    }
}

/// Shared ingest policy: which resource the logs belong to and how the client
/// delivers them.
///
/// Built once while a root sink is constructed and never mutated afterwards.
#[derive(Clone)]
pub struct IngestSettings {
    pub resource_tags: HashMap<String, String>,
    pub batching_enabled: bool,
    pub batching_interval: Duration,
    pub auth_provider: Option<Arc<dyn AuthProvider>>,
}

impl Debug for IngestSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestSettings")
            .field("resource_tags", &self.resource_tags)
            .field("batching_enabled", &self.batching_enabled)
            .field("batching_interval", &self.batching_interval)
            .field("auth_provider", &self.auth_provider.is_some())
            .finish()
    }
}

/// Sends one log message to the ingest endpoint.
///
/// Implementations must be safe to call concurrently. They may perform the
/// remote call inline or queue the message for batched delivery.
#[async_trait]
pub trait IngesterClient: Send + Sync {
    async fn send_logs(
        &self,
        cancel: &CancellationToken,
        message: String,
        resource_tags: &HashMap<String, String>,
        metadata: HashMap<String, String>,
    ) -> Result<(), IngestError>;

    /// Pushes out anything the client holds back. Clients that never buffer
    /// keep the default.
    async fn flush(&self) -> Result<(), IngestError> {
        Ok(())
    }
}

/// Client that drops every message and always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopIngesterClient;

#[async_trait]
impl IngesterClient for NopIngesterClient {
    async fn send_logs(
        &self,
        _cancel: &CancellationToken,
        _message: String,
        _resource_tags: &HashMap<String, String>,
        _metadata: HashMap<String, String>,
    ) -> Result<(), IngestError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_nop_client_always_succeeds() {
        let client = NopIngesterClient;
        let tags = HashMap::from([("system.displayname".to_string(), "test-device".to_string())]);
        let result = client
            .send_logs(
                &CancellationToken::new(),
                "test".to_string(),
                &tags,
                HashMap::new(),
            )
            .await;
        assert!(result.is_ok());
        assert!(client.flush().await.is_ok());
    }

    #[test]
    fn test_closure_auth_provider() {
        let provider: Arc<dyn AuthProvider> =
            Arc::new(|method: &str, uri: &str, body: &[u8]| format!("{method} {uri} {}", body.len()));
        assert_eq!(
            provider.get_credentials("POST", "/log/ingest", b"abc"),
            "POST /log/ingest 3"
        );
    }

    #[test]
    fn test_settings_debug_hides_auth_provider() {
        let settings = IngestSettings {
            resource_tags: HashMap::new(),
            batching_enabled: false,
            batching_interval: Duration::from_secs(10),
            auth_provider: Some(Arc::new(|_: &str, _: &str, _: &[u8]| "secret".to_string())),
        };
        let debug_str = format!("{settings:?}");
        assert!(debug_str.contains("auth_provider: true"));
        assert!(!debug_str.contains("secret"));
    }
}
