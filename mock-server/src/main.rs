use tokio::net::TcpListener;

/// Serves the canned sample endpoints, e.g. for manual checks with curl.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let port = std::env::var("MOCK_SERVER_PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    println!("mock service listening on http://{addr}");
    mock_server::run(listener).await
}
