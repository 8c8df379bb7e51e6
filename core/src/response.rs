//! Result envelopes for deserialized service responses.
//!
//! # Design
//! Every parse either yields a populated value or a `Default` value whose
//! error message names the failed stage. There is no separate status flag:
//! callers inspect `error_message()` to tell the two apart.

use serde::{Deserialize, Serialize};

/// A deserialized service result that can carry a single error message.
///
/// Implement it with [`service_response!`](crate::service_response) for
/// structs holding an `error_message: Option<String>` field.
pub trait ServiceResponse: Default {
    fn error_message(&self) -> Option<&str>;

    fn set_error_message(&mut self, message: String);

    /// True when an error message is present and non-empty.
    fn is_error(&self) -> bool {
        self.error_message().is_some_and(|message| !message.is_empty())
    }
}

/// Implements [`ServiceResponse`] for structs with an
/// `error_message: Option<String>` field.
///
/// ```
/// use service_infra::{service_response, ServiceResponse};
///
/// #[derive(Default)]
/// struct Weather {
///     temperature: f32,
///     error_message: Option<String>,
/// }
///
/// service_response!(Weather);
///
/// let mut weather = Weather::default();
/// weather.set_error_message("offline".to_string());
/// assert!(weather.is_error());
/// assert_eq!(weather.temperature, 0.0);
/// ```
#[macro_export]
macro_rules! service_response {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::ServiceResponse for $ty {
                fn error_message(&self) -> ::core::option::Option<&str> {
                    self.error_message.as_deref()
                }

                fn set_error_message(&mut self, message: ::std::string::String) {
                    self.error_message = ::core::option::Option::Some(message);
                }
            }
        )+
    };
}

/// Builds a default `T` whose only populated field is the error message.
pub fn create_error_result<T: ServiceResponse>(message: impl Into<String>) -> T {
    let mut result = T::default();
    result.set_error_message(message.into());
    result
}

/// Error list for results that accumulate several messages instead of one.
///
/// Starts empty and only grows. Embed it in a response struct and push to it
/// from the service that owns the struct.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceResponseBase {
    #[serde(default)]
    error_list: Vec<String>,
}

impl ServiceResponseBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.error_list.push(message.into());
    }

    pub fn error_list(&self) -> &[String] {
        &self.error_list
    }

    pub fn has_errors(&self) -> bool {
        !self.error_list.is_empty()
    }
}
