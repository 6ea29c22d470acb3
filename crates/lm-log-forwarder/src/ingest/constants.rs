// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Limits and endpoint details of the LogicMonitor log ingest API.

use std::time::Duration;

/// Path of the ingest resource, relative to the REST endpoint.
pub(crate) const INGEST_PATH: &str = "/log/ingest";

/// Key holding the resource identity tags in each ingest entry.
pub(crate) const RESOURCE_ID_KEY: &str = "_lm.resourceId";

/// Maximum number of entries shipped in one batch request.
pub(crate) const MAX_BATCH_ENTRIES: usize = 100;

/// Maximum size of one request body, JSON array brackets and separators
/// included. Entries that cannot fit on their own are dropped.
///
/// The ingest API rejects payloads above 8 MiB.
pub(crate) const MAX_BATCH_BYTES: usize = 8 * 1_024 * 1_024;

/// Capacity of the batcher command channel. Inserts beyond it fail with
/// `IngestError::QueueFull` until the batcher catches up.
pub(crate) const MAX_QUEUED_COMMANDS: usize = 10_000;

/// Request timeout used when the caller does not configure one.
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
