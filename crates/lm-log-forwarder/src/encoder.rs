// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Record encoders.
//!
//! An [`Encoder`] turns a [`Record`] plus its ad-hoc fields into the message
//! bytes shipped to the ingest endpoint. Each encoder also carries the fields
//! accumulated by enclosing logging contexts; [`RecordSink::with_fields`]
//! clones the encoder and merges new context fields into the clone, so the
//! parent's accumulator is never touched.
//!
//! Two encoders are provided:
//!
//! - [`ConsoleEncoder`] (default): tab-separated, human readable
//!   ```text
//!   2024-05-01T10:00:00.000Z	INFO	main	src/main.rs:12	started	{"port":8080}
//!   ```
//! - [`JsonEncoder`]: one JSON object per record
//!   ```text
//!   {"caller":"src/main.rs:12","level":"info","logger":"main","msg":"started","port":8080,"ts":"2024-05-01T10:00:00.000Z"}
//!   ```
//!
//! [`RecordSink::with_fields`]: crate::sink::RecordSink::with_fields

use std::fmt;

use serde_json::{Map, Value};

use crate::record::{Field, Record};

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("field '{key}' cannot be encoded: {reason}")]
    UnsupportedValue { key: String, reason: String },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Turns records into wire bytes and accumulates context fields.
pub trait Encoder: Send + Sync + fmt::Debug {
    /// Returns an independent copy, including the accumulated context fields.
    fn clone_encoder(&self) -> Box<dyn Encoder>;

    /// Appends fields to the context accumulator.
    fn add_fields(&mut self, fields: &[Field]);

    fn context_fields(&self) -> &[Field];

    fn encode_record(&self, record: &Record, fields: &[Field]) -> Result<Vec<u8>, EncodeError>;
}

impl Clone for Box<dyn Encoder> {
    fn clone(&self) -> Self {
        self.clone_encoder()
    }
}

/// Merges context and record fields into one JSON object; record fields win on
/// key collisions.
fn fields_object(context: &[Field], fields: &[Field]) -> Result<Map<String, Value>, EncodeError> {
    let mut object = Map::new();
    for field in context.iter().chain(fields) {
        let value =
            serde_json::to_value(&field.value).map_err(|e| EncodeError::UnsupportedValue {
                key: field.key.clone(),
                reason: e.to_string(),
            })?;
        object.insert(field.key.clone(), value);
    }
    Ok(object)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsoleEncoder {
    context: Vec<Field>,
}

impl ConsoleEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder for ConsoleEncoder {
    fn clone_encoder(&self) -> Box<dyn Encoder> {
        Box::new(self.clone())
    }

    fn add_fields(&mut self, fields: &[Field]) {
        self.context.extend_from_slice(fields);
    }

    fn context_fields(&self) -> &[Field] {
        &self.context
    }

    fn encode_record(&self, record: &Record, fields: &[Field]) -> Result<Vec<u8>, EncodeError> {
        let mut columns = vec![
            record.time.format(TIME_FORMAT).to_string(),
            record.level.as_capital_str().to_string(),
        ];
        if !record.logger_name.is_empty() {
            columns.push(record.logger_name.clone());
        }
        let caller = record.caller.trimmed_path();
        if !caller.is_empty() {
            columns.push(caller);
        }
        columns.push(record.message.clone());

        let object = fields_object(&self.context, fields)?;
        if !object.is_empty() {
            columns.push(serde_json::to_string(&object)?);
        }

        let mut line = columns.join("\t");
        if let Some(stack) = &record.stack {
            line.push('\n');
            line.push_str(stack);
        }
        Ok(line.into_bytes())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonEncoder {
    context: Vec<Field>,
}

impl JsonEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder for JsonEncoder {
    fn clone_encoder(&self) -> Box<dyn Encoder> {
        Box::new(self.clone())
    }

    fn add_fields(&mut self, fields: &[Field]) {
        self.context.extend_from_slice(fields);
    }

    fn context_fields(&self) -> &[Field] {
        &self.context
    }

    fn encode_record(&self, record: &Record, fields: &[Field]) -> Result<Vec<u8>, EncodeError> {
        let mut object = fields_object(&self.context, fields)?;
        object.insert(
            "ts".to_string(),
            Value::String(record.time.format(TIME_FORMAT).to_string()),
        );
        object.insert(
            "level".to_string(),
            Value::String(record.level.as_str().to_string()),
        );
        if !record.logger_name.is_empty() {
            object.insert(
                "logger".to_string(),
                Value::String(record.logger_name.clone()),
            );
        }
        let caller = record.caller.trimmed_path();
        if !caller.is_empty() {
            object.insert("caller".to_string(), Value::String(caller));
        }
        object.insert("msg".to_string(), Value::String(record.message.clone()));
        if let Some(stack) = &record.stack {
            object.insert("stacktrace".to_string(), Value::String(stack.clone()));
        }
        Ok(serde_json::to_vec(&object)?)
    }
}
