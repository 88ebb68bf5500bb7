//! HTTP server exposing a rate limited admission check.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::middleware::rate_limit;
use crate::error::Result;
use crate::ratelimit::{AdmissionControl, RateLimiter};

/// Build the service routes.
///
/// `/check` sits behind the rate limit middleware; a proxy calls it before
/// forwarding to protected endpoints. `/health` is never limited.
pub fn router<L: AdmissionControl + 'static>(limiter: Arc<L>) -> Router {
    let limited = Router::new()
        .route("/check", post(check))
        .route_layer(middleware::from_fn_with_state(limiter, rate_limit::<L>));

    Router::new().route("/health", get(health)).merge(limited)
}

async fn health() -> &'static str {
    "ok"
}

async fn check() -> StatusCode {
    StatusCode::OK
}

/// HTTP server for the rate limit service.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    rate_limiter: Arc<RateLimiter>,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, rate_limiter: Arc<RateLimiter>) -> Self {
        Self { addr, rate_limiter }
    }

    /// Bind the configured address and serve until `cancel` fires.
    pub async fn serve_with_shutdown(self, cancel: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_on(listener, cancel).await
    }

    /// Serve on an already bound listener.
    ///
    /// The limiter's reaper runs alongside the server. Cancelling stops both;
    /// a server failure cancels the reaper too.
    pub async fn serve_on(self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        info!(addr = %listener.local_addr()?, "Starting HTTP server");

        let app = router(self.rate_limiter.clone());
        let shutdown = cancel.clone();
        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await });

        let serve = async {
            let result = server.await;
            if let Err(ref e) = result {
                error!(error = %e, "HTTP server failed");
            }
            cancel.cancel();
            result
        };

        let (served, reaped) = tokio::join!(serve, self.rate_limiter.run(cancel.clone()));
        served?;
        reaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitingConfig;
    use axum::{body::Body, extract::ConnectInfo, http::Request};
    use std::time::Duration;
    use tower::ServiceExt;

    fn limiter(max_events: u32) -> Arc<RateLimiter> {
        let config = RateLimitingConfig {
            max_events,
            ..Default::default()
        };
        Arc::new(RateLimiter::new(&config).unwrap())
    }

    fn request(method: &str, uri: &str, peer: Option<&str>) -> Request<Body> {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    #[tokio::test]
    async fn test_check_rejects_after_quota() {
        let app = router(limiter(2));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(request("POST", "/check", Some("1.2.3.4:5000")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(request("POST", "/check", Some("1.2.3.4:5001")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        // A different client is unaffected
        let response = app
            .oneshot(request("POST", "/check", Some("5.6.7.8:5000")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_is_not_limited() {
        let rate_limiter = limiter(1);
        let app = router(rate_limiter.clone());

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(request("GET", "/health", Some("1.2.3.4:5000")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(rate_limiter.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_missing_peer_address_is_server_error() {
        let app = router(limiter(5));

        let response = app.oneshot(request("POST", "/check", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = HttpServer::new(listener.local_addr().unwrap(), limiter(5));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(server.serve_on(listener, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server should shut down")
            .unwrap();
        assert!(result.is_ok());
    }
}
