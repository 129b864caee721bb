//! Mock egress endpoints for integration tests.
//!
//! Each mock is an HTTP proxy that answers platform requests itself: clients
//! use the `http` proxy scheme, so requests for `http://api.test/...` arrive
//! here in absolute form and are routed by path.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use xtoken_engine::{
    ClientOptions, EgressClientFactory, EgressEndpoint, Negotiator, PlatformApi, ProxyScheme,
};

pub const BASE_URL: &str = "http://api.test";
pub const BEARER: &str = "test-bearer";
pub const GUEST_TOKEN: &str = "guest-123";
pub const FLOW_TOKEN: &str = "flow-456";

/// How a mock endpoint answers.
#[derive(Debug, Clone)]
pub enum Behavior {
    Success { token: String, secret: String },
    /// Stage 1 answers with a JSON object lacking `guest_token`.
    GuestMissingToken,
    /// Stage 1 answers with a body that is not JSON.
    GuestNotJson,
    /// Stage 2 answers with `flow_token` as a number.
    FlowWrongType,
    /// Stage 3 answers without `open_account`.
    OAuthMissingAccount,
    /// Stage 2 answers only after the delay, then succeeds.
    SlowFlow {
        delay: Duration,
        token: String,
        secret: String,
    },
}

impl Behavior {
    pub fn success(token: &str, secret: &str) -> Self {
        Self::Success {
            token: token.to_string(),
            secret: secret.to_string(),
        }
    }

    pub fn slow_flow(delay: Duration, token: &str, secret: &str) -> Self {
        Self::SlowFlow {
            delay,
            token: token.to_string(),
            secret: secret.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Hits {
    pub guest: AtomicUsize,
    pub flow: AtomicUsize,
    pub oauth: AtomicUsize,
}

impl Hits {
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.guest.load(Ordering::SeqCst),
            self.flow.load(Ordering::SeqCst),
            self.oauth.load(Ordering::SeqCst),
        )
    }
}

/// What the mock saw on each stage request.
#[derive(Debug, Default, Clone)]
pub struct Seen {
    pub authorization: Vec<String>,
    pub guest_token_headers: Vec<String>,
    pub user_agents: Vec<String>,
    pub flow_names: Vec<String>,
    pub bodies: Vec<Value>,
}

struct MockState {
    behavior: Behavior,
    hits: Arc<Hits>,
    seen: Arc<Mutex<Seen>>,
}

pub struct MockEndpoint {
    pub addr: SocketAddr,
    pub hits: Arc<Hits>,
    pub seen: Arc<Mutex<Seen>>,
}

impl MockEndpoint {
    pub fn endpoint(&self) -> EgressEndpoint {
        EgressEndpoint::new(self.addr.to_string())
    }
}

pub async fn spawn_endpoint(behavior: Behavior) -> MockEndpoint {
    let hits = Arc::new(Hits::default());
    let seen = Arc::new(Mutex::new(Seen::default()));
    let state = Arc::new(MockState {
        behavior,
        hits: hits.clone(),
        seen: seen.clone(),
    });

    let app = Router::new()
        .route("/1.1/guest/activate.json", post(guest_activate))
        .route("/1.1/onboarding/task.json", post(onboarding_task))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockEndpoint { addr, hits, seen }
}

/// An address with nothing listening on it.
pub async fn dead_endpoint() -> EgressEndpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    EgressEndpoint::new(addr.to_string())
}

pub fn negotiator() -> Negotiator {
    let api = PlatformApi::with_base_url(BASE_URL, BEARER).unwrap();
    let factory = EgressClientFactory::new(ClientOptions {
        scheme: ProxyScheme::Http,
        request_timeout: Duration::from_secs(10),
        connect_timeout: Duration::from_secs(2),
    });
    Negotiator::new(api, factory)
}

fn header(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn record(state: &MockState, headers: &HeaderMap, body: &str) {
    let mut seen = state.seen.lock();
    seen.authorization.push(header(headers, "authorization"));
    seen.guest_token_headers.push(header(headers, "x-guest-token"));
    seen.user_agents.push(header(headers, "user-agent"));
    seen.bodies
        .push(serde_json::from_str(body).unwrap_or(Value::Null));
}

async fn guest_activate(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.hits.guest.fetch_add(1, Ordering::SeqCst);
    record(&state, &headers, &body);

    match state.behavior {
        Behavior::GuestMissingToken => {
            axum::Json(json!({"errors": [{"code": 88, "message": "Rate limit exceeded"}]}))
                .into_response()
        }
        Behavior::GuestNotJson => {
            (StatusCode::BAD_GATEWAY, "<html>bad gateway</html>").into_response()
        }
        _ => axum::Json(json!({"guest_token": GUEST_TOKEN})).into_response(),
    }
}

async fn onboarding_task(
    State(state): State<Arc<MockState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    record(&state, &headers, &body);

    if let Some(flow_name) = query.get("flow_name") {
        state.hits.flow.fetch_add(1, Ordering::SeqCst);
        state.seen.lock().flow_names.push(flow_name.clone());
        return flow_response(&state.behavior).await;
    }

    state.hits.oauth.fetch_add(1, Ordering::SeqCst);
    match &state.behavior {
        Behavior::OAuthMissingAccount => {
            axum::Json(json!({"flow_token": FLOW_TOKEN, "subtasks": [{"subtask_id": "LoginEnterUserIdentifier"}]}))
                .into_response()
        }
        Behavior::Success { token, secret } | Behavior::SlowFlow { token, secret, .. } => {
            axum::Json(json!({
                "flow_token": FLOW_TOKEN,
                "status": "success",
                "subtasks": [{
                    "subtask_id": "OpenAccount",
                    "open_account": {
                        "oauth_token": token,
                        "oauth_token_secret": secret,
                        "known_device_token": "kdt"
                    }
                }]
            }))
            .into_response()
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn flow_response(behavior: &Behavior) -> Response {
    match behavior {
        Behavior::FlowWrongType => axum::Json(json!({"flow_token": 456})).into_response(),
        Behavior::SlowFlow { delay, .. } => {
            tokio::time::sleep(*delay).await;
            axum::Json(json!({"flow_token": FLOW_TOKEN})).into_response()
        }
        _ => axum::Json(json!({"flow_token": FLOW_TOKEN, "status": "success"})).into_response(),
    }
}
