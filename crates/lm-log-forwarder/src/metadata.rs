// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use crate::record::Record;

pub type Metadata = HashMap<String, String>;

pub const LEVEL_KEY: &str = "level";
pub const FUNCTION_KEY: &str = "function";
pub const LOGGER_KEY: &str = "logger";
pub const CALLER_KEY: &str = "caller";

/// Writes the record-derived tags into `metadata`.
///
/// Must only be called on the per-send copy of a sink's metadata.
pub fn add_metadata(metadata: &mut Metadata, record: &Record) {
    metadata.insert(LEVEL_KEY.to_string(), record.level.as_str().to_string());
    metadata.insert(FUNCTION_KEY.to_string(), record.caller.function.clone());
    if !record.logger_name.is_empty() {
        metadata.insert(LOGGER_KEY.to_string(), record.logger_name.clone());
    }
    let caller = record.caller.trimmed_path();
    if !caller.is_empty() {
        metadata.insert(CALLER_KEY.to_string(), caller);
    }
}
