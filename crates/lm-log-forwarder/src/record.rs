// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The log event handed to a [`RecordSink`](crate::sink::RecordSink) and the
//! typed fields that travel with it.

use chrono::{DateTime, Utc};
use serde::ser::{Error as _, Serialize, Serializer};

use crate::level::LogLevel;

/// Source location of the statement that produced a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: String,
}

impl Caller {
    #[must_use]
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            line: Some(line),
            function: function.into(),
        }
    }

    /// `dir/file:line`, keeping only the last two path components.
    ///
    /// Returns an empty string when the file is unknown.
    #[must_use]
    pub fn trimmed_path(&self) -> String {
        let Some(file) = self.file.as_deref() else {
            return String::new();
        };
        let file = file.replace('\\', "/");
        let trimmed = match file.rfind('/') {
            Some(last) => match file[..last].rfind('/') {
                Some(prev) => &file[prev + 1..],
                None => file.as_str(),
            },
            None => file.as_str(),
        };
        match self.line {
            Some(line) => format!("{trimmed}:{line}"),
            None => trimmed.to_string(),
        }
    }
}

/// Fixed attributes of one log event.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub level: LogLevel,
    pub time: DateTime<Utc>,
    pub message: String,
    pub logger_name: String,
    pub caller: Caller,
    pub stack: Option<String>,
}

impl Record {
    /// A record stamped with the current time and no logger name or caller.
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            time: Utc::now(),
            message: message.into(),
            logger_name: String::new(),
            caller: Caller::default(),
            stack: None,
        }
    }

    #[must_use]
    pub fn with_logger_name(mut self, logger_name: impl Into<String>) -> Self {
        self.logger_name = logger_name.into();
        self
    }

    #[must_use]
    pub fn with_caller(mut self, caller: Caller) -> Self {
        self.caller = caller;
        self
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::String(v) => serializer.serialize_str(v),
            FieldValue::I64(v) => serializer.serialize_i64(*v),
            FieldValue::U64(v) => serializer.serialize_u64(*v),
            FieldValue::F64(v) if v.is_finite() => serializer.serialize_f64(*v),
            FieldValue::F64(v) => Err(S::Error::custom(format!("non-finite float {v}"))),
            FieldValue::Bool(v) => serializer.serialize_bool(*v),
        }
    }
}

/// A typed key/value pair attached to a record or accumulated on a context.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: String,
    pub value: FieldValue,
}

impl Field {
    #[must_use]
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::String(value.into()),
        }
    }

    #[must_use]
    pub fn i64(key: impl Into<String>, value: i64) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::I64(value),
        }
    }

    #[must_use]
    pub fn u64(key: impl Into<String>, value: u64) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::U64(value),
        }
    }

    #[must_use]
    pub fn f64(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::F64(value),
        }
    }

    #[must_use]
    pub fn bool(key: impl Into<String>, value: bool) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::Bool(value),
        }
    }
}
