//! # Indexing Error Classification
//!
//! Decides whether a failure is worth retrying.
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ IndexingError   │────▶│ ErrorClassifier │────▶│ Transient /     │
//! │ or message      │     │                 │     │ NonTransient    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! Rules, first match wins:
//!
//! 1. A not-found, validation, permission, trashed or stub signal is
//!    non-transient.
//! 2. A lock, timeout, connection, network, temporary or deadlock signal is
//!    transient.
//! 3. Anything else is non-transient, so unknown failure modes never loop.
//!
//! Within each rule the error's type is checked before its message, so a
//! transient type carrying a non-transient message is non-transient. The
//! classifier is total and never fails.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ErrorType, IndexingError};

const NON_TRANSIENT_SIGNALS: &[&str] = &[
    "not found",
    "does not exist",
    "invalid",
    "validation",
    "permission",
    "forbidden",
    "trashed",
    "stub",
];

const TRANSIENT_SIGNALS: &[&str] = &[
    "lock",
    "timeout",
    "timed out",
    "connection",
    "network",
    "temporary",
    "deadlock",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    NonTransient,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::NonTransient => write!(f, "non_transient"),
        }
    }
}

/// What decided a classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum ClassificationBasis {
    ErrorType(ErrorType),
    MessageSignal(String),
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub class: ErrorClass,
    pub basis: ClassificationBasis,
}

impl ErrorClassification {
    pub fn is_retryable(&self) -> bool {
        self.class.is_retryable()
    }
}

pub trait ErrorClassifier: Send + Sync {
    fn classify_error(&self, error: &IndexingError) -> ErrorClassification;

    fn classify_message(&self, message: &str) -> ErrorClassification;

    fn classifier_name(&self) -> &'static str;
}

/// Default rules for indexing failures
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexingErrorClassifier;

impl IndexingErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    fn type_class(error_type: ErrorType) -> Option<ErrorClass> {
        match error_type {
            ErrorType::PermissionDenied
            | ErrorType::Trashed
            | ErrorType::NotFound
            | ErrorType::Stub
            | ErrorType::LockHeld
            | ErrorType::ValidationError => Some(ErrorClass::NonTransient),
            ErrorType::LockError
            | ErrorType::ConnectionError
            | ErrorType::Timeout
            | ErrorType::BrokerUnavailable => Some(ErrorClass::Transient),
            ErrorType::SchedulingError
            | ErrorType::PipelineError
            | ErrorType::ConfigurationError
            | ErrorType::InternalError
            | ErrorType::Unknown => None,
        }
    }
}

impl ErrorClassifier for IndexingErrorClassifier {
    fn classify_error(&self, error: &IndexingError) -> ErrorClassification {
        let error_type = error.error_type();
        let by_type = |class| ErrorClassification {
            class,
            basis: ClassificationBasis::ErrorType(error_type),
        };

        let type_class = Self::type_class(error_type);
        if type_class == Some(ErrorClass::NonTransient) {
            return by_type(ErrorClass::NonTransient);
        }

        // A non-transient message signal outranks a transient type
        let by_message = self.classify_message(&error.to_string());
        if matches!(by_message.basis, ClassificationBasis::MessageSignal(_))
            && by_message.class == ErrorClass::NonTransient
        {
            return by_message;
        }

        match type_class {
            Some(class) => by_type(class),
            None => by_message,
        }
    }

    fn classify_message(&self, message: &str) -> ErrorClassification {
        classify_message(message)
    }

    fn classifier_name(&self) -> &'static str {
        "IndexingErrorClassifier"
    }
}

/// Classify a bare error message
pub fn classify_message(message: &str) -> ErrorClassification {
    let lowered = message.to_lowercase();
    let find = |signals: &[&str]| {
        signals
            .iter()
            .find(|signal| lowered.contains(*signal))
            .map(|signal| signal.to_string())
    };

    if let Some(signal) = find(NON_TRANSIENT_SIGNALS) {
        return ErrorClassification {
            class: ErrorClass::NonTransient,
            basis: ClassificationBasis::MessageSignal(signal),
        };
    }
    if let Some(signal) = find(TRANSIENT_SIGNALS) {
        return ErrorClassification {
            class: ErrorClass::Transient,
            basis: ClassificationBasis::MessageSignal(signal),
        };
    }
    ErrorClassification {
        class: ErrorClass::NonTransient,
        basis: ClassificationBasis::Default,
    }
}
