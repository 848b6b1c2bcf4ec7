//! Custom error types for the library.
//!
//! This module defines the primary error type, `TwainError`, shared by every
//! layer of the scanner session. Using the `thiserror` crate, it provides a
//! single place where marshaling, sequencing, protocol and output failures are
//! described.
//!
//! ## Error Hierarchy
//!
//! - **Sequencing** (`NoSourceSelected`, `NotFound`, `OutOfRange`, `NoSources`,
//!   `InvalidTransition`): an operation was attempted in a state that does not
//!   allow it. Reported immediately; the caller corrects and re-invokes.
//! - **Marshaling** (`UnknownType`, `TypeMismatch`, `Truncated`, ...): a value
//!   has no wire representation, or native bytes do not decode.
//! - **`Protocol`**: a native call returned a non-success code. Carries the
//!   operation name, the return code, the condition code reported by the
//!   manager and its human-readable description.
//! - **Output** (`UnsupportedFormat`, `InvalidBitmap`, `Image`, `Io`): fatal
//!   for one saved file only.
//! - **Environment** (`BindingUnavailable`, `FeatureNotEnabled`, `Config`).

use crate::config::ConfigError;
use crate::protocol::{ConditionCode, ReturnCode};
use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type TwainResult<T> = std::result::Result<T, TwainError>;

/// Errors raised by the scanner session and its collaborators.
#[derive(Error, Debug)]
pub enum TwainError {
    #[error("No wire type for {0}")]
    UnknownType(String),

    #[error("Value {value} does not match wire type {expected}")]
    TypeMismatch { expected: String, value: String },

    #[error("Wire data too short: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("Wire type {0} cannot be stored in a container")]
    UnsupportedContainerItem(String),

    #[error("Unknown container shape {0:#06x}")]
    UnknownContainer(u16),

    #[error("Value out of range for {0}")]
    ValueOutOfRange(String),

    #[error("No scanner selected")]
    NoSourceSelected,

    #[error("Scanner '{0}' not found")]
    NotFound(String),

    #[error("Scanner index {index} out of range (0..{count})")]
    OutOfRange { index: usize, count: usize },

    #[error("No scanners available")]
    NoSources,

    #[error("Cannot {event} while {from}")]
    InvalidTransition { from: String, event: String },

    #[error("{operation} failed ({code:?}): {message}")]
    Protocol {
        /// Session operation that issued the call.
        operation: &'static str,
        /// Return code of the call.
        code: ReturnCode,
        /// Condition code reported afterwards.
        condition: ConditionCode,
        /// Description of the condition.
        message: String,
    },

    #[error("Unknown picture format for extension '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid native bitmap: {0}")]
    InvalidBitmap(String),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data source manager unavailable: {0}")]
    BindingUnavailable(String),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TwainError {
    /// Condition code of a protocol failure, if this is one.
    pub fn condition(&self) -> Option<ConditionCode> {
        match self {
            TwainError::Protocol { condition, .. } => Some(*condition),
            _ => None,
        }
    }

    /// Whether the error is a sequencing error the caller can fix locally.
    pub fn is_sequencing(&self) -> bool {
        matches!(
            self,
            TwainError::NoSourceSelected
                | TwainError::NotFound(_)
                | TwainError::OutOfRange { .. }
                | TwainError::NoSources
                | TwainError::InvalidTransition { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = TwainError::Protocol {
            operation: "OpenSource",
            code: ReturnCode::Failure,
            condition: ConditionCode::PaperJam,
            message: ConditionCode::PaperJam.description().to_string(),
        };
        assert_eq!(
            err.to_string(),
            "OpenSource failed (Failure): The feeder is jammed."
        );
        assert_eq!(err.condition(), Some(ConditionCode::PaperJam));
        assert!(!err.is_sequencing());
    }

    #[test]
    fn test_sequencing_errors() {
        assert!(TwainError::NoSourceSelected.is_sequencing());
        assert!(TwainError::NotFound("X".into()).is_sequencing());
        assert_eq!(TwainError::NoSourceSelected.condition(), None);
    }

    #[test]
    fn test_feature_not_enabled_display() {
        let err = TwainError::FeatureNotEnabled("twain_hardware".into());
        assert!(err.to_string().contains("--features twain_hardware"));
    }
}
