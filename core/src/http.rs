//! HTTP response envelope handed to the REST helper.
//!
//! # Design
//! The helper never owns a transport. Callers run the request with whatever
//! client they use and describe the outcome as an `HttpResponse`: a status
//! code, headers and an optional body. `None` content means the service
//! answered without a body, which the helper treats as its own failure
//! stage.
//!
//! The body is kept as `Bytes` so the JSON fast path can read it in place
//! and cloning a response stays cheap.

use bytes::Bytes;

use crate::error::ParseError;

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content: Option<Bytes>,
}

impl HttpResponse {
    /// A response with the given status and no body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<Bytes>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// True for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup; first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The body as UTF-8 text.
    pub fn text(&self) -> Result<&str, ParseError> {
        let content = self.content.as_ref().ok_or(ParseError::MissingContent)?;
        Ok(std::str::from_utf8(content)?)
    }
}
