//! Error types shared by the engines and the operation pipeline.
//!
//! Engine failures carry a structured [`FailureKind`] so the pipeline can
//! pick the user-facing alert without inspecting error text. Errors that only
//! carry a message (for example from a third-party engine) fall back to
//! [`FailureKind::classify`].

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Failures raised by a [`DocumentEngine`](crate::engine::DocumentEngine) or
/// an [`ArchiveEngine`](crate::archive::ArchiveEngine).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    #[error("no interactive form: {0}")]
    FormUnavailable(String),

    #[error("failed to decode image {name}: {reason}")]
    Image { name: String, reason: String },

    #[error("unsupported image format for {0}")]
    UnsupportedImage(String),

    #[error("invalid bookmark: {0}")]
    InvalidBookmark(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// The user-facing category for this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            EngineError::FormUnavailable(_) => FailureKind::NoFormFields,
            EngineError::Other(message) => FailureKind::classify(message),
            _ => FailureKind::Generic,
        }
    }
}

impl From<lopdf::Error> for EngineError {
    fn from(err: lopdf::Error) -> Self {
        EngineError::Parse(err.to_string())
    }
}

impl From<zip::result::ZipError> for EngineError {
    fn from(err: zip::result::ZipError) -> Self {
        EngineError::Archive(err.to_string())
    }
}

/// Category of a failed operation, used to choose the alert shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The document has no retrievable interactive form.
    NoFormFields,
    /// Anything else.
    Generic,
}

static FORM_RETRIEVAL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(getform|form\s+retrieval|no\s+form\s+fields?)").expect("static regex")
});

impl FailureKind {
    /// Best-effort classification of a bare error message.
    ///
    /// ```
    /// use pdftools::error::FailureKind;
    ///
    /// assert_eq!(FailureKind::classify("Error: getForm failed"), FailureKind::NoFormFields);
    /// assert_eq!(FailureKind::classify("Network timeout"), FailureKind::Generic);
    /// ```
    pub fn classify(message: &str) -> FailureKind {
        if FORM_RETRIEVAL_MARKER.is_match(message) {
            FailureKind::NoFormFields
        } else {
            FailureKind::Generic
        }
    }

    pub fn alert_title(&self) -> &'static str {
        match self {
            FailureKind::NoFormFields => "No form fields",
            FailureKind::Generic => "Operation failed",
        }
    }

    pub fn alert_message(&self) -> &'static str {
        match self {
            FailureKind::NoFormFields => {
                "This PDF does not contain any form fields that can be flattened."
            }
            FailureKind::Generic => {
                "The operation could not be completed. Check the log for details."
            }
        }
    }
}
