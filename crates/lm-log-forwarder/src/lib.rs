// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # LM Log Forwarder
//!
//! Forwards `tracing` events to the LogicMonitor log ingest API.
//!
//! ## Overview
//!
//! A [`RecordSink`] receives log records, drops those below its minimum level,
//! encodes the rest and attaches metadata tags derived from each record
//! (level, logger, caller). The encoded message is handed to an
//! [`IngesterClient`] either synchronously or fire-and-forget, depending on
//! the sink's dispatch policy. [`ForwardingLayer`] plugs a sink into a
//! `tracing_subscriber` registry.
//!
//! ## Architecture
//!
//! - [`sink`]: level gate, encoding, metadata enrichment, derived contexts
//! - [`dispatcher`]: sync/async dispatch policy
//! - [`ingest`]: ingest client trait, HTTP client and its batcher
//! - [`encoder`]: console and JSON record encoders
//! - [`options`]: construction options
//! - [`config`]: serde-deserializable configuration
//! - [`layer`]: `tracing` integration
//!
//! ## Dispatch
//!
//! With client batching disabled and async enabled (the default) sends are
//! fire-and-forget: they return immediately and their failures are dropped.
//! Every other combination waits for the client and returns its result.

#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]

pub mod config;
pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod ingest;
pub mod layer;
pub mod level;
pub mod metadata;
pub mod options;
pub mod record;
pub mod sink;

#[cfg(test)]
mod test_support;

pub use config::ForwarderConfig;
pub use encoder::{ConsoleEncoder, Encoder, JsonEncoder};
pub use error::ForwarderError;
pub use ingest::client::{IngestClientConfig, LogIngestClient};
pub use ingest::{AuthProvider, IngestError, IngesterClient, NopIngesterClient};
pub use layer::ForwardingLayer;
pub use level::LogLevel;
pub use options::{
    with_async, with_auth_provider, with_blocking, with_client_batching_enabled, with_encoder,
    with_ingester_client, with_log_level, with_metadata, with_nop_ingester_client, with_runtime,
    Params, SinkOption,
};
pub use record::{Caller, Field, FieldValue, Record};
pub use sink::RecordSink;
