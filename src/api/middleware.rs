use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::Operation;
use crate::api_keys::{types::key_prefix, validate_key, KeyRejection};
use crate::audit::AccessEntry;
use crate::error::ApiError;
use crate::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Caller identity attached to requests that passed key validation.
#[derive(Clone, Debug)]
pub struct AuthenticatedClient {
    pub api_key: String,
    pub client_ip: String,
    pub operation: Operation,
}

/// Client address used for rate limiting and the access log.
///
/// The socket peer by default. With `trust_proxy` the right-most
/// `x-forwarded-for` hop wins: that is the one the proxy appended, every
/// hop left of it is whatever the caller sent.
pub fn client_ip(req: &Request, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = req
            .headers()
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit(',').map(str::trim).find(|ip| !ip.is_empty()));
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn api_key_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let ip = client_ip(&req, state.trust_proxy);

    // HEAD is served by the GET handler
    let route_method = if method == Method::HEAD {
        Method::GET
    } else {
        method.clone()
    };
    let Some(operation) = Operation::resolve(&route_method, &path) else {
        return ApiError::NotFound("Unknown endpoint".into()).into_response();
    };

    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let record = match validate_key(state.keys.as_ref(), presented.as_deref()).await {
        Ok(record) => record,
        Err(KeyRejection::Store(e)) => {
            log::error!("Key lookup failed for {}: {}", operation.name(), e);
            return ApiError::Internal { operation }.into_response();
        }
        Err(rejection) => {
            log::warn!(
                "AUDIT DENIED key={} ip={} method={} path={} reason={}",
                presented.as_deref().map(key_prefix).unwrap_or("-"),
                ip,
                method,
                path,
                match rejection {
                    KeyRejection::Missing => "missing_key",
                    _ => "invalid_key",
                }
            );
            return ApiError::Unauthorized(rejection.to_string()).into_response();
        }
    };

    req.extensions_mut().insert(AuthenticatedClient {
        api_key: record.key.clone(),
        client_ip: ip.clone(),
        operation,
    });

    let response = next.run(req).await;
    let status = response.status();

    if status.is_success() {
        state
            .access_log
            .record(AccessEntry::now(&record.key, &ip, operation.name()));
    }

    log::info!(
        "AUDIT key={} ip={} op={} status={}",
        record.prefix(),
        ip,
        operation.name(),
        status.as_u16()
    );

    response
}
