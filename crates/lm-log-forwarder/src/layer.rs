// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `tracing` integration.
//!
//! [`ForwardingLayer`] forwards every event that passes the sink's level gate
//! to a [`RecordSink`]. Fields recorded on the spans the event happens in
//! become context fields of a derived sink, root span first, so nested spans
//! behave like nested logging contexts.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lm_log_forwarder::{with_log_level, ForwardingLayer, LogLevel, Params, RecordSink};
//! use tracing_subscriber::prelude::*;
//!
//! let sink = RecordSink::new(
//!     Params::new([("system.displayname", "web-1")]),
//!     [with_log_level(LogLevel::Info)],
//! )?;
//!
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(ForwardingLayer::new(sink))
//!     .init();
//! ```
//!
//! # Mapping
//!
//! | event                 | record                     |
//! |-----------------------|----------------------------|
//! | level                 | level                      |
//! | `message` field       | message                    |
//! | target                | logger name                |
//! | module path           | caller function            |
//! | file and line         | caller                     |
//! | other fields          | record fields              |
//!
//! `tracing` callbacks are synchronous. When the sink's send is synchronous the
//! layer blocks the emitting thread until it completes, except on a
//! current-thread runtime, where the send is handed to the runtime and its
//! failure reported once it finishes.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::field::{Field as TracingField, Visit};
use tracing::span::{Attributes, Id, Record as SpanValues};
use tracing_core::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::error::ForwarderError;
use crate::level::LogLevel;
use crate::record::{Caller, Field, Record};
use crate::sink::RecordSink;

const OWN_TARGET: &str = "lm_log_forwarder";
const DEFAULT_IGNORED_TARGETS: &[&str] = &["hyper", "hyper_util", "h2", "reqwest", "rustls"];
const MESSAGE_FIELD: &str = "message";

pub type ErrorHandler = Arc<dyn Fn(&ForwarderError) + Send + Sync>;

pub struct ForwardingLayer {
    sink: RecordSink,
    ignored_targets: Vec<String>,
    on_error: ErrorHandler,
}

impl ForwardingLayer {
    #[must_use]
    pub fn new(sink: RecordSink) -> Self {
        Self {
            sink,
            ignored_targets: DEFAULT_IGNORED_TARGETS
                .iter()
                .map(ToString::to_string)
                .collect(),
            on_error: Arc::new(|e| eprintln!("lm-log-forwarder: failed to forward log: {e}")),
        }
    }

    /// Called with every forwarding failure. Defaults to printing on stderr.
    #[must_use]
    pub fn with_error_handler(
        mut self,
        handler: impl Fn(&ForwarderError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Arc::new(handler);
        self
    }

    /// Replaces the modules whose events are never forwarded. A module covers
    /// its submodules, so `hyper` ignores `hyper::proto` but not `hyperion`.
    /// This crate's own target is always ignored.
    #[must_use]
    pub fn with_ignored_targets<I, T>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.ignored_targets = targets.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn sink(&self) -> &RecordSink {
        &self.sink
    }

    fn is_ignored(&self, target: &str) -> bool {
        is_within(target, OWN_TARGET)
            || self
                .ignored_targets
                .iter()
                .any(|prefix| is_within(target, prefix))
    }

    fn forward(&self, sink: RecordSink, record: Record, fields: Vec<Field>) {
        let result = match Handle::try_current() {
            Ok(current) if current.runtime_flavor() == RuntimeFlavor::CurrentThread => {
                let on_error = Arc::clone(&self.on_error);
                current.spawn(async move {
                    if let Err(e) = sink.accept(&record, &fields).await {
                        on_error(&e);
                    }
                });
                return;
            }
            Ok(_) => tokio::task::block_in_place(|| {
                sink.dispatcher()
                    .runtime()
                    .block_on(sink.accept(&record, &fields))
            }),
            Err(_) => sink
                .dispatcher()
                .runtime()
                .block_on(sink.accept(&record, &fields)),
        };

        if let Err(e) = result {
            (self.on_error)(&e);
        }
    }
}

/// Whether `target` is the module `prefix` or one of its submodules.
fn is_within(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

impl fmt::Debug for ForwardingLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardingLayer")
            .field("sink", &self.sink)
            .field("ignored_targets", &self.ignored_targets)
            .finish_non_exhaustive()
    }
}

/// Fields recorded on a span, kept in its extensions.
struct SpanFields(Vec<Field>);

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<Field>,
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &TracingField, value: f64) {
        self.fields.push(Field::f64(field.name(), value));
    }

    fn record_i64(&mut self, field: &TracingField, value: i64) {
        self.fields.push(Field::i64(field.name(), value));
    }

    fn record_u64(&mut self, field: &TracingField, value: u64) {
        self.fields.push(Field::u64(field.name(), value));
    }

    fn record_bool(&mut self, field: &TracingField, value: bool) {
        self.fields.push(Field::bool(field.name(), value));
    }

    fn record_str(&mut self, field: &TracingField, value: &str) {
        if field.name() == MESSAGE_FIELD {
            self.message = Some(value.to_string());
        } else {
            self.fields.push(Field::string(field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &TracingField, value: &dyn fmt::Debug) {
        if field.name() == MESSAGE_FIELD {
            self.message = Some(format!("{value:?}"));
        } else {
            self.fields.push(Field::string(field.name(), format!("{value:?}")));
        }
    }
}

impl<S> Layer<S> for ForwardingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut().insert(SpanFields(visitor.fields));
    }

    fn on_record(&self, id: &Id, values: &SpanValues<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);

        let mut extensions = span.extensions_mut();
        if let Some(recorded) = extensions.get_mut::<SpanFields>() {
            recorded.0.extend(visitor.fields);
        } else {
            extensions.insert(SpanFields(visitor.fields));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = LogLevel::from(*metadata.level());
        if !self.sink.enabled(level) || self.is_ignored(metadata.target()) {
            return;
        }

        let mut context_fields = Vec::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(recorded) = span.extensions().get::<SpanFields>() {
                    context_fields.extend_from_slice(&recorded.0);
                }
            }
        }
        let sink = if context_fields.is_empty() {
            self.sink.clone()
        } else {
            self.sink.with_fields(&context_fields)
        };

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let record = Record::new(level, visitor.message.unwrap_or_default())
            .with_logger_name(metadata.target())
            .with_caller(Caller {
                file: metadata.file().map(ToString::to_string),
                line: metadata.line(),
                function: metadata.module_path().unwrap_or_default().to_string(),
            });

        self.forward(sink, record, visitor.fields);
    }
}
