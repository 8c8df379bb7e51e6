//! Error types for the service helpers.
//!
//! # Design
//! None of these escape the lossy public operations: `RestService::call`
//! turns a `CallError` into `None`, the `parse_*` methods turn a
//! `ParseError` into an error-annotated result, and the message formatter
//! falls back to `Debug` output on a `FormatError`. They exist so the
//! failure can be attached to the log entry and so the `try_*` variants
//! have something precise to return.

use thiserror::Error;

/// Boxed error produced by a caller-supplied work function.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The work function passed to `RestService::call` did not produce a response.
#[derive(Debug, Error)]
pub enum CallError {
    /// The future resolved to an error.
    #[error("transport failed: {0}")]
    Transport(#[source] BoxError),

    /// The work function or its future panicked.
    #[error("work panicked: {0}")]
    Panicked(String),
}

/// A response body could not be turned into the requested type.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The response carried no content.
    #[error("response has no content")]
    MissingContent,

    /// The content is not valid UTF-8 text.
    #[error("content is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid XML: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// The document's root element is not the one the target type is named after.
    #[error("<{found}> was not expected, the root element must be <{expected}>")]
    UnexpectedRoot { expected: &'static str, found: String },
}

/// A log message could not be serialized.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Map keys must render as JSON strings.
    #[error("map key must be a string or a number")]
    KeyMustBeString,

    /// 128-bit integers outside the 64-bit range have no JSON number form.
    #[error("number out of range: {0}")]
    NumberOutOfRange(String),

    /// Raised by a `Serialize` implementation.
    #[error("{0}")]
    Custom(String),
}

impl serde::ser::Error for FormatError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        FormatError::Custom(msg.to_string())
    }
}

/// The synchronous bridge could not run the work.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The dedicated runtime failed to start.
    #[error("failed to start the bridge runtime: {0}")]
    Runtime(String),

    /// The runtime shut down before the work finished.
    #[error("work was cancelled before completion")]
    Cancelled,
}
