//! Stub HTTP classifier
//!
//! Serves one canned status and body on `POST /analyze` and records what it
//! received, so the real `HttpDefectClassifier` can be exercised end to end.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One request as seen by the stub
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ReceivedRequest {
    pub fn body_contains(&self, needle: &str) -> bool {
        String::from_utf8_lossy(&self.body).contains(needle)
    }
}

#[derive(Clone)]
struct StubState {
    status: StatusCode,
    body: String,
    delay: Duration,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
}

pub struct StubServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
}

impl StubServer {
    pub fn endpoint(&self) -> String {
        format!("http://{}/analyze", self.addr)
    }

    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.received.lock().unwrap().clone()
    }
}

async fn analyze(
    State(state): State<StubState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, [(&'static str, &'static str); 1], String) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.received.lock().unwrap().push(ReceivedRequest {
        authorization: header("authorization"),
        content_type: header("content-type"),
        body: body.to_vec(),
    });

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    (state.status, [("content-type", "application/json")], state.body.clone())
}

/// Start a stub classifier on an ephemeral port
pub async fn spawn_stub_classifier(status: StatusCode, body: &str, delay: Duration) -> StubServer {
    let received = Arc::new(Mutex::new(Vec::new()));
    let state = StubState {
        status,
        body: body.to_string(),
        delay,
        received: Arc::clone(&received),
    };

    let app = Router::new().route("/analyze", post(analyze)).with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub classifier");
    let addr = listener.local_addr().expect("stub classifier address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub classifier server");
    });

    StubServer { addr, received }
}
