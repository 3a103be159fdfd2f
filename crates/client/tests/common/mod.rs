//! Shared helpers for client integration tests.
//!
//! Each test runs its own in-process backend built from an axum
//! [`Router`] bound to an ephemeral localhost port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use lumo_client::{ApiClient, ClientConfig, Session};

/// Serve `app` on `127.0.0.1:0` and return its base URL.
pub async fn spawn_backend(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr: SocketAddr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test backend");
    });
    format!("http://{addr}")
}

/// A base URL nothing is listening on.
pub async fn dead_backend() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

/// Build a client for `api_url` whose session starts with `token`.
pub fn client_for(api_url: &str, token: Option<&str>) -> ApiClient {
    let session = match token {
        Some(token) => Session::with_token(token),
        None => Session::new(),
    };
    let config = ClientConfig {
        api_url: api_url.to_string(),
        request_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    };
    ApiClient::new(&config, Arc::new(session)).expect("build client")
}
