// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sync/async dispatch policy.
//!
//! | batching | async | behaviour                                         |
//! |----------|-------|---------------------------------------------------|
//! | off      | on    | spawn the send, return `Ok` immediately           |
//! | off      | off   | await the send, return the client's result        |
//! | on       | any   | await the send, return the client's result        |
//!
//! Fire-and-forget sends are best effort: their errors are dropped, they are
//! not ordered relative to each other and they ignore cancellation. A batching
//! client already queues internally, so the async shortcut is never stacked on
//! top of it.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::error::ForwarderError;
use crate::ingest::{IngestSettings, IngesterClient};

/// Hands encoded records to the ingest client. Shared by every sink derived
/// from one root and never mutated after construction.
pub struct Dispatcher {
    client: Arc<dyn IngesterClient>,
    settings: Arc<IngestSettings>,
    async_enabled: bool,
    runtime: Handle,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        client: Arc<dyn IngesterClient>,
        settings: IngestSettings,
        async_enabled: bool,
        runtime: Handle,
    ) -> Self {
        Self {
            client,
            settings: Arc::new(settings),
            async_enabled,
            runtime,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    #[must_use]
    pub fn async_enabled(&self) -> bool {
        self.async_enabled
    }

    /// Whether `notify` returns before the send completes.
    #[must_use]
    pub fn is_fire_and_forget(&self) -> bool {
        !self.settings.batching_enabled && self.async_enabled
    }

    #[must_use]
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Sends one encoded record.
    ///
    /// `cancel` is passed to the client on the synchronous path only.
    pub async fn notify(
        &self,
        cancel: &CancellationToken,
        payload: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<(), ForwarderError> {
        let message = String::from_utf8_lossy(&payload).into_owned();

        if self.is_fire_and_forget() {
            let client = Arc::clone(&self.client);
            let settings = Arc::clone(&self.settings);
            self.runtime.spawn(async move {
                let _ = client
                    .send_logs(
                        &CancellationToken::new(),
                        message,
                        &settings.resource_tags,
                        metadata,
                    )
                    .await;
            });
            return Ok(());
        }

        self.client
            .send_logs(cancel, message, &self.settings.resource_tags, metadata)
            .await?;
        Ok(())
    }

    pub async fn flush(&self) -> Result<(), ForwarderError> {
        self.client.flush().await?;
        Ok(())
    }
}

impl Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("settings", &self.settings)
            .field("async_enabled", &self.async_enabled)
            .finish_non_exhaustive()
    }
}
