// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ingest client doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::ingest::{IngestError, IngesterClient};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SentLog {
    pub(crate) message: String,
    pub(crate) resource_tags: HashMap<String, String>,
    pub(crate) metadata: HashMap<String, String>,
}

/// Records every call; optionally fails on flush.
#[derive(Debug, Default)]
pub(crate) struct RecordingClient {
    calls: Mutex<Vec<SentLog>>,
    flushes: AtomicUsize,
    fail_flush: bool,
}

impl RecordingClient {
    pub(crate) fn failing_flush() -> Self {
        Self {
            fail_flush: true,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<SentLog> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub(crate) fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Polls until at least `n` calls were recorded, for fire-and-forget sends.
    pub(crate) async fn wait_for_calls(&self, n: usize) -> Vec<SentLog> {
        for _ in 0..500 {
            let calls = self.calls();
            if calls.len() >= n {
                return calls;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.calls()
    }
}

#[async_trait]
impl IngesterClient for RecordingClient {
    async fn send_logs(
        &self,
        _cancel: &CancellationToken,
        message: String,
        resource_tags: &HashMap<String, String>,
        metadata: HashMap<String, String>,
    ) -> Result<(), IngestError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(SentLog {
                message,
                resource_tags: resource_tags.clone(),
                metadata,
            });
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), IngestError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        if self.fail_flush {
            return Err(IngestError::Client("flush failed".to_string()));
        }
        Ok(())
    }
}

/// Sleeps before answering, honouring cancellation while it waits.
#[derive(Debug)]
pub(crate) struct DelayedClient {
    delay: Duration,
    fail: bool,
    completed: AtomicUsize,
}

impl DelayedClient {
    pub(crate) fn failing(delay: Duration) -> Self {
        Self {
            delay,
            fail: true,
            completed: AtomicUsize::new(0),
        }
    }

    pub(crate) fn succeeding(delay: Duration) -> Self {
        Self {
            delay,
            fail: false,
            completed: AtomicUsize::new(0),
        }
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IngesterClient for DelayedClient {
    async fn send_logs(
        &self,
        cancel: &CancellationToken,
        _message: String,
        _resource_tags: &HashMap<String, String>,
        _metadata: HashMap<String, String>,
    ) -> Result<(), IngestError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(IngestError::Cancelled),
            () = tokio::time::sleep(self.delay) => {}
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(IngestError::Client("injected failure".to_string()));
        }
        Ok(())
    }
}
