//! Local upstream servers for tests

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FONT_BYTES: &[u8] = b"font bytes";
pub const LAST_MODIFIED: &str = "Wed, 21 Oct 2015 07:28:00 GMT";

/// Conditional headers seen by the upstream, one entry per request
#[derive(Clone, Default)]
pub struct Seen(Arc<Mutex<Vec<(Option<String>, Option<String>)>>>);

impl Seen {
    pub fn requests(&self) -> Vec<(Option<String>, Option<String>)> {
        self.0.lock().unwrap().clone()
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Serves `FONT_BYTES` with `ETag: "v1"` and answers 304 to a matching
/// `If-None-Match`
async fn versioned(State(seen): State<Seen>, headers: HeaderMap) -> Response {
    let if_none_match = header_str(&headers, header::IF_NONE_MATCH);
    let if_modified_since = header_str(&headers, header::IF_MODIFIED_SINCE);
    seen.0
        .lock()
        .unwrap()
        .push((if_none_match.clone(), if_modified_since));

    if if_none_match.as_deref() == Some("\"v1\"") {
        return StatusCode::NOT_MODIFIED.into_response();
    }

    (
        [
            (header::ETAG, "\"v1\""),
            (header::LAST_MODIFIED, LAST_MODIFIED),
        ],
        FONT_BYTES,
    )
        .into_response()
}

/// Sends an ETag on the first response only
async fn forgetful(State(seen): State<Seen>, headers: HeaderMap) -> Response {
    let first = {
        let mut requests = seen.0.lock().unwrap();
        requests.push((header_str(&headers, header::IF_NONE_MATCH), None));
        requests.len() == 1
    };

    if first {
        ([(header::ETAG, "\"once\"")], FONT_BYTES).into_response()
    } else {
        FONT_BYTES.into_response()
    }
}

async fn always_not_modified() -> StatusCode {
    StatusCode::NOT_MODIFIED
}

async fn missing() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn slow() -> &'static [u8] {
    tokio::time::sleep(Duration::from_secs(5)).await;
    FONT_BYTES
}

pub fn upstream_router(seen: Seen) -> Router {
    Router::new()
        .route("/font.woff2", get(versioned))
        .route("/forgetful", get(forgetful))
        .route("/stale", get(always_not_modified))
        .route("/missing", get(missing))
        .route("/slow", get(slow))
        .with_state(seen)
}

/// Start the upstream on an ephemeral port and return its base URL
pub async fn spawn_upstream(seen: Seen) -> String {
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, upstream_router(seen)).await.unwrap();
    });
    format!("http://{}", addr)
}
