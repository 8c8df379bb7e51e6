use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// The record served by every endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename = "Sample", rename_all = "PascalCase")]
pub struct Sample {
    pub foo: String,
    pub bar: i32,
}

pub type Db = Arc<Vec<Sample>>;

pub fn app() -> Router {
    let db: Db = Arc::new(vec![Sample {
        foo: "x".to_string(),
        bar: 5,
    }]);
    Router::new()
        .route("/samples", get(list_samples))
        .route("/samples/{index}", get(get_sample))
        .route("/samples/{index}/xml", get(get_sample_xml))
        .route("/malformed", get(malformed))
        .route("/empty", get(empty))
        .route("/status/{code}", get(status))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn list_samples(State(db): State<Db>) -> Json<Vec<Sample>> {
    Json(db.to_vec())
}

async fn get_sample(
    State(db): State<Db>,
    Path(index): Path<usize>,
) -> Result<Json<Sample>, StatusCode> {
    db.get(index).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn get_sample_xml(State(db): State<Db>, Path(index): Path<usize>) -> Response {
    let Some(sample) = db.get(index) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match quick_xml::se::to_string(sample) {
        Ok(xml) => ([(header::CONTENT_TYPE, "application/xml")], xml).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn malformed() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        r#""Foo": "x", "Bar": 5"#,
    )
}

async fn empty() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn status(Path(code): Path<u16>) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, format!("status {}", status.as_u16())).into_response()
}
