// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Actor owning the batch queue of a batching [`LogIngestClient`].
//!
//! ```text
//!    ┌──────────────┐
//!    │   Handles    │ (one per client clone)
//!    └──────┬───────┘
//!           │ Commands via channel
//!           v
//!    ┌──────────────┐
//!    │   Service    │ ── ships on interval tick, size limits, Flush
//!    └──────────────┘
//! ```
//!
//! Inserting never waits for the network. Entries are serialized on arrival
//! and batches are assembled as JSON arrays that stay within
//! [`MAX_BATCH_ENTRIES`] and [`MAX_BATCH_BYTES`]; an entry that would push the
//! queue over either limit ships the queue first. Ships triggered by the
//! interval or by size limits log their failures and drop the batch; only an
//! explicit flush reports the shipping result back to its caller.
//!
//! The command channel is bounded by [`MAX_QUEUED_COMMANDS`]. When it is full,
//! inserts fail with [`IngestError::QueueFull`] instead of growing memory
//! while a ship is stalled.
//!
//! [`LogIngestClient`]: super::client::LogIngestClient

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::client::{IngestEntry, Shipper};
use super::constants::{MAX_BATCH_BYTES, MAX_BATCH_ENTRIES, MAX_QUEUED_COMMANDS};
use super::IngestError;

#[derive(Debug)]
pub enum BatcherCommand {
    Insert(IngestEntry),
    Flush(oneshot::Sender<Result<(), IngestError>>),
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct BatcherHandle {
    tx: mpsc::Sender<BatcherCommand>,
}

impl BatcherHandle {
    pub fn insert(&self, entry: IngestEntry) -> Result<(), IngestError> {
        self.tx
            .try_send(BatcherCommand::Insert(entry))
            .map_err(|e| match e {
                TrySendError::Full(_) => IngestError::QueueFull,
                TrySendError::Closed(_) => IngestError::BatcherClosed,
            })
    }

    /// Ships everything queued so far and waits for the result.
    pub async fn flush(&self) -> Result<(), IngestError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(BatcherCommand::Flush(response_tx))
            .await
            .map_err(|_| IngestError::BatcherClosed)?;
        response_rx.await.map_err(|_| IngestError::BatcherClosed)?
    }

    pub async fn shutdown(&self) -> Result<(), IngestError> {
        self.tx
            .send(BatcherCommand::Shutdown)
            .await
            .map_err(|_| IngestError::BatcherClosed)
    }
}

/// Size of a JSON array holding `count` entries of `entry_bytes` in total.
fn payload_len(entry_bytes: usize, count: usize) -> usize {
    entry_bytes + count.saturating_sub(1) + 2
}

pub struct BatcherService {
    shipper: Shipper,
    interval: Duration,
    queue: VecDeque<Vec<u8>>,
    queued_bytes: usize,
    rx: mpsc::Receiver<BatcherCommand>,
}

impl BatcherService {
    pub(crate) fn new(shipper: Shipper, interval: Duration) -> (Self, BatcherHandle) {
        let (tx, rx) = mpsc::channel(MAX_QUEUED_COMMANDS);
        let service = Self {
            shipper,
            interval,
            queue: VecDeque::new(),
            queued_bytes: 0,
            rx,
        };
        (service, BatcherHandle { tx })
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(BatcherCommand::Insert(entry)) => self.insert(&entry).await,
                    Some(BatcherCommand::Flush(response_tx)) => {
                        let result = self.ship_queue().await;
                        if response_tx.send(result).is_err() {
                            debug!("LOGS | Flush requester went away before the result");
                        }
                    }
                    Some(BatcherCommand::Shutdown) | None => {
                        if let Err(e) = self.ship_queue().await {
                            error!("LOGS | Failed to ship final log batch: {}", e);
                        }
                        debug!("LOGS | Batcher stopped");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if let Err(e) = self.ship_queue().await {
                        error!("LOGS | Failed to ship log batch: {}", e);
                    }
                }
            }
        }
    }

    async fn insert(&mut self, entry: &IngestEntry) {
        let serialized = match serde_json::to_vec(entry) {
            Ok(serialized) => serialized,
            Err(e) => {
                error!("LOGS | Failed to serialize log entry: {}", e);
                return;
            }
        };
        if payload_len(serialized.len(), 1) > MAX_BATCH_BYTES {
            warn!(
                "LOGS | Dropping log entry of {} bytes, above the {} byte request limit",
                serialized.len(),
                MAX_BATCH_BYTES
            );
            return;
        }

        if payload_len(self.queued_bytes + serialized.len(), self.queue.len() + 1)
            > MAX_BATCH_BYTES
        {
            if let Err(e) = self.ship_queue().await {
                error!("LOGS | Failed to ship log batch: {}", e);
            }
        }

        self.queued_bytes += serialized.len();
        self.queue.push_back(serialized);

        if self.queue.len() >= MAX_BATCH_ENTRIES {
            if let Err(e) = self.ship_queue().await {
                error!("LOGS | Failed to ship log batch: {}", e);
            }
        }
    }

    /// Drains up to one request worth of entries into a JSON array.
    fn next_payload(&mut self) -> Option<(Vec<u8>, usize)> {
        let mut body = Vec::from(&b"["[..]);
        let mut count = 0;
        while count < MAX_BATCH_ENTRIES {
            let Some(entry) = self.queue.pop_front() else {
                break;
            };
            // Separator plus closing bracket.
            if count > 0 && body.len() + entry.len() + 2 > MAX_BATCH_BYTES {
                self.queue.push_front(entry);
                break;
            }
            if count > 0 {
                body.push(b',');
            }
            self.queued_bytes -= entry.len();
            body.extend_from_slice(&entry);
            count += 1;
        }
        if count == 0 {
            return None;
        }
        body.push(b']');
        Some((body, count))
    }

    async fn ship_queue(&mut self) -> Result<(), IngestError> {
        let mut result = Ok(());
        while let Some((body, count)) = self.next_payload() {
            if let Err(e) = self
                .shipper
                .ship_payload(body, count, &CancellationToken::new())
                .await
            {
                result = Err(e);
            }
        }
        self.queued_bytes = 0;
        result
    }
}
