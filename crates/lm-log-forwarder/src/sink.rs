// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The forwarding sink.
//!
//! A [`RecordSink`] gates records by level, encodes them, enriches a copy of
//! its metadata and hands the result to the shared [`Dispatcher`]. Sinks
//! derived with [`RecordSink::with_fields`] share the dispatcher (and so the
//! ingest client and policy) with their root but own their metadata and
//! encoder context.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;
use crate::encoder::Encoder;
use crate::error::ForwarderError;
use crate::ingest::client::{IngestClientConfig, LogIngestClient};
use crate::ingest::{IngestSettings, IngesterClient};
use crate::level::LogLevel;
use crate::metadata::{add_metadata, Metadata};
use crate::options::{Params, SinkBuilder, SinkOption};
use crate::record::{Field, Record};

/// Records above this level are flushed right after they are sent.
const FLUSH_THRESHOLD: LogLevel = LogLevel::Error;

#[derive(Clone, Debug)]
pub struct RecordSink {
    dispatcher: Arc<Dispatcher>,
    min_level: LogLevel,
    encoder: Box<dyn Encoder>,
    metadata: Metadata,
}

impl RecordSink {
    /// Builds a root sink.
    ///
    /// Options are applied in order. Without [`with_ingester_client`] the
    /// HTTP client is configured from the environment, see
    /// [`IngestClientConfig::from_env`]. Without [`with_runtime`] this must be
    /// called from within a tokio runtime.
    ///
    /// [`with_ingester_client`]: crate::options::with_ingester_client
    /// [`with_runtime`]: crate::options::with_runtime
    pub fn new(
        params: Params,
        options: impl IntoIterator<Item = SinkOption>,
    ) -> Result<Self, ForwarderError> {
        params.validate()?;

        let mut builder = SinkBuilder::new(params);
        for option in options {
            option(&mut builder)?;
        }

        let runtime = match builder.runtime.take() {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| {
                ForwarderError::Configuration(format!("no tokio runtime available: {e}"))
            })?,
        };

        let client = match builder.client.take() {
            Some(client) => client,
            None => default_client(&builder.settings, &runtime)?,
        };

        Ok(Self {
            dispatcher: Arc::new(Dispatcher::new(
                client,
                builder.settings,
                builder.async_enabled,
                runtime,
            )),
            min_level: builder.min_level,
            encoder: builder.encoder,
            metadata: builder.metadata,
        })
    }

    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    /// Encodes and forwards one record. Does not apply the level gate.
    pub async fn accept(&self, record: &Record, fields: &[Field]) -> Result<(), ForwarderError> {
        self.accept_with_cancel(&CancellationToken::new(), record, fields)
            .await
    }

    /// Like [`accept`](Self::accept); `cancel` aborts a synchronous send.
    pub async fn accept_with_cancel(
        &self,
        cancel: &CancellationToken,
        record: &Record,
        fields: &[Field],
    ) -> Result<(), ForwarderError> {
        let mut metadata = self.metadata.clone();
        add_metadata(&mut metadata, record);

        let payload = self.encoder.encode_record(record, fields)?;
        self.dispatcher.notify(cancel, payload, metadata).await?;

        if record.level > FLUSH_THRESHOLD {
            self.flush().await?;
        }
        Ok(())
    }

    /// Returns a sink carrying `fields` as context, leaving `self` untouched.
    #[must_use]
    pub fn with_fields(&self, fields: &[Field]) -> RecordSink {
        let mut child = self.clone();
        child.encoder.add_fields(fields);
        child
    }

    pub async fn flush(&self) -> Result<(), ForwarderError> {
        self.dispatcher.flush().await
    }

    #[must_use]
    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    #[must_use]
    pub fn encoder(&self) -> &dyn Encoder {
        self.encoder.as_ref()
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn settings(&self) -> &IngestSettings {
        self.dispatcher.settings()
    }
}

fn default_client(
    settings: &IngestSettings,
    runtime: &Handle,
) -> Result<Arc<dyn IngesterClient>, ForwarderError> {
    let config = IngestClientConfig::from_env(settings)
        .map_err(|e| ForwarderError::Configuration(e.to_string()))?;
    let client = LogIngestClient::new(config, runtime)
        .map_err(|e| ForwarderError::Configuration(e.to_string()))?;
    Ok(Arc::new(client))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::encoder::JsonEncoder;
    use crate::ingest::IngestError;
    use crate::metadata::{CALLER_KEY, FUNCTION_KEY, LEVEL_KEY, LOGGER_KEY};
    use crate::options::{
        with_blocking, with_client_batching_enabled, with_encoder, with_ingester_client,
        with_log_level, with_metadata, with_nop_ingester_client,
    };
    use crate::record::Caller;
    use crate::test_support::{DelayedClient, RecordingClient};
    use serial_test::serial;
    use std::time::Duration;
    use tokio::time::Instant;

    fn params() -> Params {
        Params::new([("system.displayname", "test-device")])
    }

    fn info_record() -> Record {
        Record::new(LogLevel::Info, "test message")
            .with_logger_name("test-logger")
            .with_caller(Caller::new("/work/app/src/handler.rs", 42, "app::handler::run"))
    }

    #[tokio::test]
    async fn test_empty_resource_tags_rejected() {
        let result = RecordSink::new(Params::default(), [with_nop_ingester_client()]);
        assert!(matches!(result, Err(ForwarderError::Configuration(_))));
    }

    #[test]
    fn test_new_outside_runtime_requires_handle() {
        let result = RecordSink::new(params(), [with_nop_ingester_client()]);
        assert!(matches!(result, Err(ForwarderError::Configuration(ref msg)) if msg.contains("runtime")));
    }

    #[test]
    fn test_new_outside_runtime_with_explicit_handle() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let sink = RecordSink::new(
            params(),
            [
                with_nop_ingester_client(),
                crate::options::with_runtime(runtime.handle().clone()),
            ],
        );
        assert!(sink.is_ok());
    }

    #[tokio::test]
    async fn test_defaults() {
        let sink = RecordSink::new(params(), [with_nop_ingester_client()]).unwrap();
        assert_eq!(sink.min_level(), LogLevel::Warn);
        assert!(sink.dispatcher().async_enabled());
        assert!(!sink.settings().batching_enabled);
        assert_eq!(sink.settings().batching_interval, Duration::from_secs(10));
        assert!(sink.metadata().is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_default_client_from_env() {
        std::env::set_var("LM_ACCOUNT", "acme");
        std::env::remove_var("LM_INGEST_ENDPOINT");
        let sink = RecordSink::new(params(), []);
        std::env::remove_var("LM_ACCOUNT");
        assert!(sink.is_ok());
    }

    #[tokio::test]
    #[serial]
    async fn test_default_client_without_account_fails() {
        std::env::remove_var("LM_ACCOUNT");
        std::env::remove_var("LM_INGEST_ENDPOINT");
        let result = RecordSink::new(params(), []);
        assert!(matches!(result, Err(ForwarderError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_enabled_respects_min_level() {
        let sink = RecordSink::new(
            params(),
            [with_nop_ingester_client(), with_log_level(LogLevel::Error)],
        )
        .unwrap();
        for level in [LogLevel::Trace, LogLevel::Debug, LogLevel::Info, LogLevel::Warn] {
            assert!(!sink.enabled(level), "{level} should be gated");
        }
        assert!(sink.enabled(LogLevel::Error));
        assert!(sink.enabled(LogLevel::Fatal));
    }

    #[tokio::test]
    async fn test_with_fields_is_copy_on_write() {
        let parent = RecordSink::new(
            params(),
            [
                with_nop_ingester_client(),
                with_metadata([("env", "staging")]),
                with_encoder(JsonEncoder::new()),
            ],
        )
        .unwrap();
        let fields = [Field::i64("k", 42)];

        let mut child = parent.with_fields(&fields);

        let mut expected = parent.clone();
        expected.encoder.add_fields(&fields);
        assert_eq!(child.metadata(), expected.metadata());
        assert_eq!(
            child.encoder().context_fields(),
            expected.encoder().context_fields()
        );
        assert_eq!(child.min_level(), expected.min_level());
        assert!(Arc::ptr_eq(&child.dispatcher, &parent.dispatcher));

        child
            .metadata_mut()
            .insert("child".to_string(), "1".to_string());

        assert_eq!(
            parent.metadata(),
            &Metadata::from([("env".to_string(), "staging".to_string())])
        );
        assert!(parent.encoder().context_fields().is_empty());
        assert_eq!(child.metadata().len(), 2);
    }

    #[tokio::test]
    async fn test_accept_async_returns_before_failing_client() {
        let client = Arc::new(DelayedClient::failing(Duration::from_millis(500)));
        let sink = RecordSink::new(params(), [with_ingester_client(client.clone())]).unwrap();

        let start = Instant::now();
        let result = sink.accept(&info_record(), &[]).await;

        assert!(result.is_ok());
        assert!(start.elapsed() < Duration::from_millis(250));
        assert_eq!(client.completed(), 0);
    }

    #[tokio::test]
    async fn test_accept_batching_returns_client_error() {
        let client = Arc::new(DelayedClient::failing(Duration::from_millis(20)));
        let sink = RecordSink::new(
            params(),
            [
                with_ingester_client(client.clone()),
                with_client_batching_enabled(Duration::from_secs(5)),
            ],
        )
        .unwrap();

        let result = sink.accept(&info_record(), &[]).await;

        assert_eq!(client.completed(), 1);
        assert!(matches!(
            result,
            Err(ForwarderError::Transport(IngestError::Client(ref msg))) if msg == "injected failure"
        ));
    }

    #[tokio::test]
    async fn test_accept_round_trip() {
        let client = Arc::new(RecordingClient::default());
        let sink = RecordSink::new(
            params(),
            [
                with_ingester_client(client.clone()),
                with_log_level(LogLevel::Info),
                with_blocking(),
            ],
        )
        .unwrap();

        let record = info_record();
        assert!(sink.enabled(record.level));
        sink.accept(&record, &[Field::i64("attempt", 1)])
            .await
            .unwrap();

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        let sent = &calls[0];
        assert_eq!(sent.resource_tags, params().resource_tags);
        assert_eq!(sent.metadata.get(LEVEL_KEY).map(String::as_str), Some("info"));
        assert_eq!(
            sent.metadata.get(FUNCTION_KEY).map(String::as_str),
            Some("app::handler::run")
        );
        assert_eq!(
            sent.metadata.get(CALLER_KEY).map(String::as_str),
            Some("src/handler.rs:42")
        );
        assert_eq!(
            sent.metadata.get(LOGGER_KEY).map(String::as_str),
            Some("test-logger")
        );
        assert!(sent.message.contains("test message"));
        assert!(sent.message.contains("\"attempt\":1"));
        // Enrichment never leaks into the sink's own metadata.
        assert!(sink.metadata().is_empty());
        assert_eq!(client.flushes(), 0);
    }

    #[tokio::test]
    async fn test_accept_encodes_context_fields() {
        let client = Arc::new(RecordingClient::default());
        let sink = RecordSink::new(
            params(),
            [
                with_ingester_client(client.clone()),
                with_blocking(),
                with_encoder(JsonEncoder::new()),
            ],
        )
        .unwrap()
        .with_fields(&[Field::string("request_id", "r-1")]);

        sink.accept(&info_record(), &[]).await.unwrap();

        let calls = client.calls();
        let value: serde_json::Value = serde_json::from_str(&calls[0].message).unwrap();
        assert_eq!(value["request_id"], "r-1");
        assert_eq!(value["msg"], "test message");
    }

    #[tokio::test]
    async fn test_accept_encoding_failure_skips_send() {
        let client = Arc::new(RecordingClient::default());
        let sink = RecordSink::new(
            params(),
            [with_ingester_client(client.clone()), with_blocking()],
        )
        .unwrap();

        let result = sink
            .accept(&info_record(), &[Field::f64("ratio", f64::NAN)])
            .await;

        assert!(matches!(result, Err(ForwarderError::Encoding(_))));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fatal_record_flushes() {
        let client = Arc::new(RecordingClient::default());
        let sink = RecordSink::new(
            params(),
            [with_ingester_client(client.clone()), with_blocking()],
        )
        .unwrap();

        sink.accept(&Record::new(LogLevel::Error, "bad"), &[])
            .await
            .unwrap();
        assert_eq!(client.flushes(), 0);

        sink.accept(&Record::new(LogLevel::Fatal, "worse"), &[])
            .await
            .unwrap();
        assert_eq!(client.flushes(), 1);
    }

    #[tokio::test]
    async fn test_fatal_record_surfaces_flush_failure() {
        let client = Arc::new(RecordingClient::failing_flush());
        let sink = RecordSink::new(
            params(),
            [with_ingester_client(client.clone()), with_blocking()],
        )
        .unwrap();

        let result = sink.accept(&Record::new(LogLevel::Fatal, "worse"), &[]).await;

        assert_eq!(client.calls().len(), 1);
        assert!(matches!(
            result,
            Err(ForwarderError::Transport(IngestError::Client(ref msg))) if msg == "flush failed"
        ));
    }

    #[tokio::test]
    async fn test_cancelled_sync_send() {
        let client = Arc::new(DelayedClient::succeeding(Duration::from_secs(30)));
        let sink = RecordSink::new(
            params(),
            [with_ingester_client(client), with_blocking()],
        )
        .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = sink.accept_with_cancel(&cancel, &info_record(), &[]).await;

        assert!(matches!(
            result,
            Err(ForwarderError::Transport(IngestError::Cancelled))
        ));
    }

    #[tokio::test]
    async fn test_siblings_share_client() {
        let client = Arc::new(RecordingClient::default());
        let root = RecordSink::new(
            params(),
            [with_ingester_client(client.clone()), with_blocking()],
        )
        .unwrap();
        let a = root.with_fields(&[Field::string("worker", "a")]);
        let b = root.with_fields(&[Field::string("worker", "b")]);

        let (record_a, record_b) = (info_record(), info_record());
        let (ra, rb) = tokio::join!(a.accept(&record_a, &[]), b.accept(&record_b, &[]));
        ra.unwrap();
        rb.unwrap();

        let messages: Vec<String> = client.calls().into_iter().map(|c| c.message).collect();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().any(|m| m.contains("\"worker\":\"a\"")));
        assert!(messages.iter().any(|m| m.contains("\"worker\":\"b\"")));
    }
}
