//! End-to-end calls against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port and drives `RestService` over
//! real HTTP. ureq is blocking, so each round-trip runs inside
//! `spawn_blocking` to give `call` the async work function it expects.

use std::sync::Arc;

use serde::Deserialize;
use service_infra::{
    build_query_string, service_response, BoxError, HttpResponse, Level, MemoryLogger, RestService,
    RestServiceConfig, ServiceResponse, SuccessPolicy,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Sample {
    foo: String,
    bar: i32,
    #[serde(skip)]
    error_message: Option<String>,
}

service_response!(Sample);

/// Execute a GET with ureq and describe the outcome as an `HttpResponse`.
///
/// Status codes are returned as data rather than errors so the helper does
/// the classification. An empty body becomes absent content.
fn execute(url: &str) -> Result<HttpResponse, BoxError> {
    let agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build()
        .new_agent();

    let mut response = agent.get(url).call()?;
    let mut result = HttpResponse::new(response.status().as_u16());
    for (name, value) in response.headers() {
        if let Ok(value) = value.to_str() {
            result = result.with_header(name.as_str(), value);
        }
    }
    let body = response.body_mut().read_to_vec()?;
    if !body.is_empty() {
        result = result.with_content(body);
    }
    Ok(result)
}

async fn fetch(url: String) -> Result<HttpResponse, BoxError> {
    tokio::task::spawn_blocking(move || execute(&url)).await?
}

fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

/// A concrete client built on `RestService`.
struct SampleService {
    rest: RestService,
    base_url: String,
}

impl SampleService {
    fn new(base_url: String, logger: Arc<MemoryLogger>) -> Self {
        Self {
            rest: RestService::new("SampleService", logger),
            base_url,
        }
    }

    async fn get_sample(&self, index: usize) -> Option<Sample> {
        let url = format!("{}/samples/{index}", self.base_url);
        let response = self.rest.call(|| fetch(url), false).await?;
        Some(self.rest.parse_json(&response))
    }

    async fn get_sample_xml(&self, index: usize) -> Option<Sample> {
        let url = format!("{}/samples/{index}/xml", self.base_url);
        let response = self.rest.call(|| fetch(url), false).await?;
        Some(self.rest.parse_xml(&response))
    }

    async fn list_samples(&self) -> Option<Vec<Sample>> {
        let url = format!("{}/samples", self.base_url);
        let response = self.rest.call(|| fetch(url), false).await?;
        Some(self.rest.parse_json_array(&response))
    }
}

#[tokio::test]
async fn sample_lifecycle_over_http() {
    let logger = Arc::new(MemoryLogger::new(Level::Information));
    let service = SampleService::new(start_server(), logger.clone());

    // Step 1: single object as JSON.
    let sample = service.get_sample(0).await.expect("sample");
    assert_eq!(sample.foo, "x");
    assert_eq!(sample.bar, 5);
    assert!(!sample.is_error());

    // Step 2: the same record as XML.
    let sample = service.get_sample_xml(0).await.expect("xml sample");
    assert_eq!(sample.foo, "x");
    assert_eq!(sample.bar, 5);
    assert!(!sample.is_error());

    // Step 3: array.
    let samples = service.list_samples().await.expect("samples");
    assert_eq!(samples.len(), 1);

    // Step 4: missing record is dropped with one warning.
    assert!(service.get_sample(9).await.is_none());
    assert_eq!(logger.count(Level::Warning), 1);
    assert_eq!(logger.count(Level::Error), 0);
}

#[tokio::test]
async fn verbose_call_returns_the_error_body() {
    let logger = Arc::new(MemoryLogger::new(Level::Information));
    let rest = RestService::new("StatusService", logger.clone());
    let url = format!("{}/status/404", start_server());

    let response = rest.call_verbose(|| fetch(url)).await.expect("verbose response");
    assert_eq!(response.status, 404);
    assert_eq!(response.text().unwrap(), "status 404");
    assert_eq!(logger.count(Level::Warning), 1);
}

#[tokio::test]
async fn created_passes_unless_policy_is_strict() {
    let base_url = start_server();

    let lenient = RestService::new("Lenient", Arc::new(MemoryLogger::new(Level::Information)));
    let url = format!("{base_url}/status/201");
    assert!(lenient.call(|| fetch(url), false).await.is_some());

    let logger = Arc::new(MemoryLogger::new(Level::Information));
    let strict = RestService::with_config(
        RestServiceConfig::new("Strict").with_success_policy(SuccessPolicy::OkOnly),
        logger.clone(),
    );
    let url = format!("{base_url}/status/201");
    assert!(strict.call(|| fetch(url), false).await.is_none());
    assert_eq!(logger.count(Level::Warning), 1);
}

#[tokio::test]
async fn no_content_is_dropped_with_a_warning() {
    let logger = Arc::new(MemoryLogger::new(Level::Information));
    let rest = RestService::new("EmptyService", logger.clone());
    let url = format!("{}/empty", start_server());

    assert!(rest.call(|| fetch(url), false).await.is_none());
    let messages = logger.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("WARNING: Could not fetch data from EmptyService."));
}

#[tokio::test]
async fn malformed_body_becomes_an_error_result() {
    let logger = Arc::new(MemoryLogger::new(Level::Information));
    let rest = RestService::new("MalformedService", logger.clone());
    let url = format!("{}/malformed", start_server());

    let response = rest.call(|| fetch(url), false).await.expect("response");
    let sample: Sample = rest.parse_json(&response);
    assert_eq!(sample.error_message(), Some("Deserializing json failed"));

    let samples: Vec<Sample> = rest.parse_json_array(&response);
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].error_message(), Some("Deserializing json array failed"));
    assert_eq!(logger.count(Level::Error), 2);
}

#[tokio::test]
async fn unreachable_server_is_logged_as_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let logger = Arc::new(MemoryLogger::new(Level::Information));
    let rest = RestService::new("DownService", logger.clone());
    let url = format!("http://127.0.0.1:{port}/samples");

    assert!(rest.call(|| fetch(url), true).await.is_none());
    let entries = logger.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].level, Level::Error);
    assert!(entries[0].message.starts_with("DownService call failed horribly."));
    assert!(entries[0].error.is_some());
}

#[test]
fn query_string_builds_request_urls() {
    let query = build_query_string([("page", "2"), ("size", "10")]);
    assert_eq!(format!("/samples?{query}"), "/samples?page=2&size=10");
}
