//! Helpers for calling REST services and for structured logging.
//!
//! # Overview
//! - [`RestService`] runs one HTTP round-trip supplied by the caller,
//!   classifies the outcome, and decodes JSON or XML bodies into result
//!   types that carry an error message instead of failing.
//! - [`logging`] provides a capability-style [`Logger`] with leveled and
//!   lazy helpers. Messages are rendered as filtered JSON so rich-text
//!   blobs stay out of the logs.
//! - [`sync::run_sync`] blocks on async work from synchronous code.
//!
//! # Design
//! - The crate owns no transport. Callers execute requests and describe the
//!   outcome as an [`HttpResponse`].
//! - Every public operation on the call path is infallible: failures are
//!   logged once and turned into `None` or an error-annotated result.
//!   `try_*` variants expose the typed errors for callers who want them.

pub mod error;
pub mod http;
pub mod logging;
pub mod response;
pub mod rest;
pub mod sync;

pub use error::{BoxError, BridgeError, CallError, FormatError, ParseError};
pub use http::HttpResponse;
pub use logging::{
    format_message, Level, LoggableMessage, Logger, LoggerExt, MemoryLogger, MessageFormatter,
    TracingLogger, TypeFilter,
};
pub use response::{create_error_result, ServiceResponse, ServiceResponseBase};
pub use rest::{
    build_optional_query_string, build_query_string, RestService, RestServiceConfig, SuccessPolicy,
};
pub use sync::run_sync;
