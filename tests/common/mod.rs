//! Shared harness for the HTTP-level tests.
//!
//! Builds the real router over a [`MemoryStore`] seeded with one active and
//! one inactive API key, an in-memory access log and a fixed-window limiter.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tower::ServiceExt;

use theorio_api::api;
use theorio_api::audit::{self, AccessLogRow, AccessLogStore, AccessQuery};
use theorio_api::rate_limit::FixedWindowLimiter;
use theorio_api::store::collections::API_KEYS;
use theorio_api::store::MemoryStore;
use theorio_api::AppState;

pub const KEY: &str = "tqk_test0000active0000key";
pub const INACTIVE_KEY: &str = "tqk_test0000inactive0key";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    log_store: Arc<AccessLogStore>,
    log_task: JoinHandle<()>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub fn new(store: MemoryStore) -> Self {
        Self::with_rate_limit(store, 1000)
    }

    pub fn with_rate_limit(store: MemoryStore, max_requests: u64) -> Self {
        Self::build(store, max_requests, false)
    }

    /// App that reads client addresses from `x-forwarded-for`.
    pub fn behind_proxy(store: MemoryStore, max_requests: u64) -> Self {
        Self::build(store, max_requests, true)
    }

    fn build(store: MemoryStore, max_requests: u64, trust_proxy: bool) -> Self {
        let store = Arc::new(
            store
                .with_document(API_KEYS, KEY, json!({"active": true, "name": "Test"}))
                .with_document(API_KEYS, INACTIVE_KEY, json!({"active": false, "name": "Revoked"})),
        );

        let log_store = Arc::new(AccessLogStore::open_in_memory().unwrap());
        let (writer, task) = audit::writer::create(log_store.clone(), Duration::from_secs(3600));
        let log_task = tokio::spawn(task);

        let limiter = Arc::new(FixedWindowLimiter::new(max_requests, Duration::from_secs(60)));
        let state = AppState::new(store.clone(), limiter, writer).trusting_proxy(trust_proxy);
        let router = api::router(state, 1024 * 1024);

        Self {
            router,
            store,
            log_store,
            log_task,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// GET with the active key.
    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(empty(authed(Method::GET, uri))).await
    }

    /// Request with the active key and a JSON body.
    pub async fn send_json(&self, method: Method, uri: &str, body: Value) -> TestResponse {
        self.send(json_body(authed(method, uri), body)).await
    }

    /// Shut the app down and return everything the access log recorded.
    pub async fn access_log(self) -> Vec<AccessLogRow> {
        let TestApp {
            router,
            log_store,
            log_task,
            ..
        } = self;
        drop(router);
        log_task.await.unwrap();
        log_store
            .query(&AccessQuery {
                limit: Some(1000),
                ..Default::default()
            })
            .unwrap()
    }
}

pub fn request(method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder().method(method).uri(uri)
}

pub fn authed(method: Method, uri: &str) -> axum::http::request::Builder {
    request(method, uri).header("x-api-key", KEY)
}

pub fn empty(builder: axum::http::request::Builder) -> Request<Body> {
    builder.body(Body::empty()).unwrap()
}

pub fn json_body(builder: axum::http::request::Builder, body: Value) -> Request<Body> {
    builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Attach the socket peer address the server would see.
pub fn from_peer(mut req: Request<Body>, peer: &str) -> Request<Body> {
    let addr: SocketAddr = peer.parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}
