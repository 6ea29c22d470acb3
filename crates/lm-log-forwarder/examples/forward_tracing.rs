// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sends `tracing` events to both stdout and LogicMonitor.
//!
//! ```text
//! LM_ACCOUNT=acme cargo run --example forward_tracing
//! ```
//!
//! Request signing is left to the caller through `with_auth_provider`. Sends
//! are fire-and-forget here, so rejected requests are dropped silently; use
//! `with_blocking` to have failures reported on stderr.

use std::time::Duration;

use lm_log_forwarder::{with_log_level, ForwardingLayer, LogLevel, Params, RecordSink};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tags mapping the log messages to one LogicMonitor resource.
    let sink = RecordSink::new(
        Params::new([("system.displayname", "test-device")]),
        [with_log_level(LogLevel::Info)],
    )?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(ForwardingLayer::new(sink))
        .init();

    tracing::info!(foo = "bar", "test log message");
    tracing::warn!(foo = "bar", "warning message with fields");

    // Sends are fire-and-forget by default.
    tokio::time::sleep(Duration::from_secs(3)).await;
    Ok(())
}
