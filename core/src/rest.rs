//! One-shot REST calls with uniform failure handling.
//!
//! # Design
//! `RestService` owns no transport. `call` runs a caller-supplied work
//! function, classifies the outcome and logs every failure exactly once:
//!
//! | outcome                     | log     | result                          |
//! |-----------------------------|---------|---------------------------------|
//! | work errors or panics       | error   | `None`                          |
//! | status rejected by policy   | warning | `None`, or the response if verbose |
//! | no content                  | warning | `None`, or the response if verbose |
//! | otherwise                   | none    | the response                    |
//!
//! The `parse_*` methods never fail either. A body that cannot be decoded
//! yields `T::default()` carrying an error message naming the failed stage.
//! The `try_parse_*` variants return the underlying `ParseError` instead.

use std::any::type_name;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use quick_xml::events::Event;
use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

use crate::error::{BoxError, CallError, ParseError};
use crate::http::HttpResponse;
use crate::logging::{Logger, LoggerExt};
use crate::response::{create_error_result, ServiceResponse};

pub const JSON_FAILED: &str = "Deserializing json failed";
pub const JSON_ARRAY_FAILED: &str = "Deserializing json array failed";
pub const XML_FAILED: &str = "Deserializing xml failed";

/// Which status codes count as a successful call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// Any 2xx status.
    #[default]
    AnySuccess,
    /// Only `200 OK`.
    OkOnly,
}

impl SuccessPolicy {
    pub fn accepts(self, status: u16) -> bool {
        match self {
            SuccessPolicy::AnySuccess => (200..300).contains(&status),
            SuccessPolicy::OkOnly => status == 200,
        }
    }
}

/// Settings for a [`RestService`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestServiceConfig {
    /// Name used in log messages.
    pub service_name: String,
    pub success_policy: SuccessPolicy,
}

impl RestServiceConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            success_policy: SuccessPolicy::default(),
        }
    }

    pub fn with_success_policy(mut self, success_policy: SuccessPolicy) -> Self {
        self.success_policy = success_policy;
        self
    }
}

/// Shared plumbing for clients of one REST service.
///
/// Concrete clients hold a `RestService`, build their requests, hand the
/// round-trip to [`call`](Self::call) and decode the body with one of the
/// `parse_*` methods.
#[derive(Clone)]
pub struct RestService {
    config: RestServiceConfig,
    logger: Arc<dyn Logger>,
}

impl std::fmt::Debug for RestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RestService {
    pub fn new(service_name: impl Into<String>, logger: Arc<dyn Logger>) -> Self {
        Self::with_config(RestServiceConfig::new(service_name), logger)
    }

    pub fn with_config(config: RestServiceConfig, logger: Arc<dyn Logger>) -> Self {
        Self { config, logger }
    }

    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    pub fn config(&self) -> &RestServiceConfig {
        &self.config
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    /// Runs `work` once and classifies the response.
    ///
    /// Returns `None` when the work fails. When the status is rejected or
    /// the body is missing, returns the response only if `verbose` is set,
    /// so callers can still inspect e.g. a 404 body.
    pub async fn call<F, Fut, E>(&self, work: F, verbose: bool) -> Option<HttpResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<HttpResponse, E>>,
        E: Into<BoxError>,
    {
        let method = type_name::<F>();
        let outcome = AssertUnwindSafe(async move { work().await })
            .catch_unwind()
            .await;

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                self.call_failed(method, &CallError::Transport(error.into()));
                return None;
            }
            Err(panic) => {
                self.call_failed(method, &CallError::Panicked(panic_message(panic.as_ref())));
                return None;
            }
        };

        if !self.config.success_policy.accepts(response.status) {
            self.logger.warning(&format!(
                "Expected HTTP status code OK from {} when fetching data. Actual: {}. Method: {method}.",
                self.config.service_name, response.status
            ));
            return verbose.then_some(response);
        }

        if response.content.is_none() {
            self.logger.warning(&format!(
                "Could not fetch data from {}. Service returned NULL. Method: {method}.",
                self.config.service_name
            ));
            return verbose.then_some(response);
        }

        Some(response)
    }

    /// [`call`](Self::call) with `verbose` set.
    pub async fn call_verbose<F, Fut, E>(&self, work: F) -> Option<HttpResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<HttpResponse, E>>,
        E: Into<BoxError>,
    {
        self.call(work, true).await
    }

    fn call_failed(&self, method: &str, error: &CallError) {
        self.logger.error_with(
            &format!(
                "{} call failed horribly. Method: {method}.",
                self.config.service_name
            ),
            error,
        );
    }

    /// Decodes the body as one JSON object.
    pub fn parse_json<T>(&self, response: &HttpResponse) -> T
    where
        T: ServiceResponse + DeserializeOwned,
    {
        self.try_parse_json(response).unwrap_or_else(|error| {
            self.logger.error_with("Deserializing json failed.", &error);
            create_error_result(JSON_FAILED)
        })
    }

    /// Decodes the body as a JSON array.
    ///
    /// On failure the result is a single-element vector holding the error
    /// result, not an empty vector.
    pub fn parse_json_array<T>(&self, response: &HttpResponse) -> Vec<T>
    where
        T: ServiceResponse + DeserializeOwned,
    {
        self.try_parse_json_array(response).unwrap_or_else(|error| {
            self.logger.error_with("Deserializing json array failed.", &error);
            vec![create_error_result(JSON_ARRAY_FAILED)]
        })
    }

    /// Decodes the body as XML.
    ///
    /// The root element must carry the serde name of `T`. The error message
    /// embeds the raw body.
    pub fn parse_xml<T>(&self, response: &HttpResponse) -> T
    where
        T: ServiceResponse + DeserializeOwned,
    {
        self.try_parse_xml(response).unwrap_or_else(|error| {
            self.logger.error_with("Deserializing xml failed.", &error);
            let xml = response.text().unwrap_or_default();
            create_error_result(format!("{XML_FAILED}: {xml}"))
        })
    }

    pub fn try_parse_json<T: DeserializeOwned>(&self, response: &HttpResponse) -> Result<T, ParseError> {
        self.parse_json_content(response)
    }

    pub fn try_parse_json_array<T: DeserializeOwned>(
        &self,
        response: &HttpResponse,
    ) -> Result<Vec<T>, ParseError> {
        self.parse_json_content(response)
    }

    pub fn try_parse_xml<T: DeserializeOwned>(&self, response: &HttpResponse) -> Result<T, ParseError> {
        let xml = response.text()?;
        if self.logger.is_debug_enabled() {
            self.logger.debug(&format!("Raw XML: {xml}"));
        }
        if let (Some(expected), Some(found)) = (container_name::<T>(), root_element(xml)) {
            if found != expected {
                return Err(ParseError::UnexpectedRoot { expected, found });
            }
        }
        Ok(quick_xml::de::from_str(xml)?)
    }

    fn parse_json_content<T: DeserializeOwned>(&self, response: &HttpResponse) -> Result<T, ParseError> {
        if self.logger.is_debug_enabled() {
            let json = response.text()?;
            self.logger.debug(&format!("Raw JSON: {json}"));
            return Ok(serde_json::from_str(json)?);
        }
        let content = response.content.as_ref().ok_or(ParseError::MissingContent)?;
        Ok(serde_json::from_reader(content.as_ref())?)
    }
}

/// Joins pairs as `key=value` with `&`, in iteration order.
///
/// Keys and values are written as-is; callers must URL-encode them first.
pub fn build_query_string<I, K, V>(pairs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Display,
    V: Display,
{
    pairs
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Like [`build_query_string`], but an absent mapping stays absent.
pub fn build_optional_query_string<I, K, V>(pairs: Option<I>) -> Option<String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Display,
    V: Display,
{
    pairs.map(build_query_string)
}

/// Local name of the first element in `xml`.
fn root_element(xml: &str) -> Option<String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) | Ok(Event::Empty(start)) => {
                return Some(String::from_utf8_lossy(start.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

/// Serde name of `T` when it deserializes from a struct.
fn container_name<T: DeserializeOwned>() -> Option<&'static str> {
    let mut name = None;
    let _ = T::deserialize(ContainerName(&mut name));
    name
}

/// Deserializer that records the name a struct asks for and then gives up.
struct ContainerName<'n>(&'n mut Option<&'static str>);

impl<'de> Deserializer<'de> for ContainerName<'_> {
    type Error = de::value::Error;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        Err(de::Error::custom("not a struct"))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        *self.0 = Some(name);
        Err(de::Error::custom("struct name recorded"))
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map enum identifier ignored_any
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
