use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, Sample};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

// --- json ---

#[tokio::test]
async fn list_samples_has_the_seed() {
    let resp = app().oneshot(get("/samples")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let samples: Vec<Sample> = body_json(resp).await;
    assert_eq!(
        samples,
        vec![Sample {
            foo: "x".to_string(),
            bar: 5
        }]
    );
}

#[tokio::test]
async fn get_sample_returns_pascal_case_json() {
    let resp = app().oneshot(get("/samples/0")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(&body_bytes(resp).await[..], br#"{"Foo":"x","Bar":5}"#);
}

#[tokio::test]
async fn get_sample_out_of_range_returns_404() {
    let resp = app().oneshot(get("/samples/9")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- xml ---

#[tokio::test]
async fn get_sample_xml() {
    let resp = app().oneshot(get("/samples/0/xml")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(http::header::CONTENT_TYPE).unwrap(),
        "application/xml"
    );
    assert_eq!(
        &body_bytes(resp).await[..],
        b"<Sample><Foo>x</Foo><Bar>5</Bar></Sample>"
    );
}

// --- canned failures ---

#[tokio::test]
async fn malformed_is_not_json() {
    let resp = app().oneshot(get("/malformed")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body_bytes(resp).await;
    assert!(serde_json::from_slice::<serde_json::Value>(&bytes).is_err());
}

#[tokio::test]
async fn empty_returns_204_without_body() {
    let resp = app().oneshot(get("/empty")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());
}

#[tokio::test]
async fn status_echoes_the_code() {
    for code in [201u16, 202, 400, 404, 500] {
        let resp = app().oneshot(get(&format!("/status/{code}"))).await.unwrap();
        assert_eq!(resp.status().as_u16(), code);
        assert_eq!(body_bytes(resp).await, format!("status {code}"));
    }
}
