// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::encoder::EncodeError;
use crate::ingest::IngestError;

/// Errors surfaced by sink construction and by the per-record forwarding path.
///
/// Failures of fire-and-forget sends never reach this type: they are dropped
/// by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Failed to encode log record: {0}")]
    Encoding(#[from] EncodeError),

    #[error(transparent)]
    Transport(#[from] IngestError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ForwarderError::Configuration("resource tags are not set".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: resource tags are not set"
        );
    }

    #[test]
    fn test_transport_error_is_transparent() {
        let error = ForwarderError::from(IngestError::Cancelled);
        assert_eq!(error.to_string(), IngestError::Cancelled.to_string());
    }

    #[test]
    fn test_encoding_error_display() {
        let error = ForwarderError::from(EncodeError::UnsupportedValue {
            key: "ratio".to_string(),
            reason: "non-finite float".to_string(),
        });
        assert!(error.to_string().starts_with("Failed to encode log record"));
        assert!(error.to_string().contains("ratio"));
    }
}
