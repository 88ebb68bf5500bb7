//! Admission middleware for rate limited routes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{debug, error};

use crate::ratelimit::{client_key, AdmissionControl};

/// Reject requests from clients that exhausted their quota.
///
/// The key is the peer host. Requests without connection info cannot be
/// attributed to a client and fail with 500.
pub async fn rate_limit<L: AdmissionControl + 'static>(
    State(limiter): State<Arc<L>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ConnectInfo(addr)) = connect_info else {
        error!("Could not determine peer address for rate limiting");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let key = client_key(&addr);
    if !limiter.is_allowed(&key, Utc::now()) {
        debug!(ip = %key, "Rate limit exceeded");
        return (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response();
    }

    next.run(request).await
}
