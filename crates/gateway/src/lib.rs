//! HTTP gateway for Mimir.
//!
//! A thin Axum surface over the face login, chat, source listing, upload
//! and administrative operations. Routing and presentation live here; the
//! decisions live in `mimir-security` and `mimir-agent`.

pub mod admin;
pub mod error;
pub mod state;
pub mod user;

use axum::extract::{ConnectInfo, DefaultBodyLimit};
use axum::{
    Router,
    extract::State,
    http::{HeaderName, Method, StatusCode, header},
    middleware::{self, Next},
    response::Json,
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub use error::{ApiError, ErrorResponse};
pub use state::{AppState, SharedState, Stores};

/// Limits applied around every route.
#[derive(Debug, Clone, Copy)]
pub struct RouterLimits {
    pub body_limit_bytes: usize,
    pub requests_per_minute: usize,
}

impl From<&mimir_config::GatewayConfig> for RouterLimits {
    fn from(config: &mimir_config::GatewayConfig) -> Self {
        Self {
            body_limit_bytes: config.body_limit_bytes,
            requests_per_minute: config.rate_limit_per_minute,
        }
    }
}

/// Build the full router.
///
/// Layers, innermost first: admin key on `/admin`, body limit, rate
/// limiting (`/health` exempt), CORS, HTTP trace logging.
pub fn build_router(state: SharedState, limits: RouterLimits) -> Router {
    let admin = admin::admin_router()
        .layer(middleware::from_fn_with_state(state.clone(), admin::admin_key_middleware));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-admin-key"),
        ])
        .max_age(Duration::from_secs(3600));

    let rate_limiter = Arc::new(RateLimiter::new(limits.requests_per_minute, Duration::from_secs(60)));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/user", user::user_router())
        .nest("/admin", admin)
        .with_state(state)
        .layer(DefaultBodyLimit::max(limits.body_limit_bytes))
        .layer(middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            rate_limit_middleware(limiter, req, next)
        }))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: mimir_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    if config.gateway.admin_key.is_none() {
        warn!("No admin key configured; /admin routes are disabled");
    }

    let state = Arc::new(AppState::from_config(&config).await?);
    let app = build_router(state, RouterLimits::from(&config.gateway));

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

// --- Rate Limiter ---

/// In-memory sliding-window rate limiter keyed by client credential.
struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: std::sync::Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if the client is within its limit.
    fn check(&self, client_key: &str) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if clients.len() > 10_000 {
            clients.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

/// Keys on the bearer credential, then the admin key, then the peer address.
/// Only requests with none of these share the "anonymous" window.
async fn rate_limit_middleware(
    limiter: Arc<RateLimiter>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let client_key = ["Authorization", "X-Admin-Key"]
        .iter()
        .find_map(|h| req.headers().get(*h).and_then(|v| v.to_str().ok()))
        .map(|s| s.to_string())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(peer)| format!("peer:{}", peer.ip()))
        })
        .unwrap_or_else(|| "anonymous".to_string());

    if !limiter.check(&client_key) {
        warn!(client = %client_key.chars().take(20).collect::<String>(), "Rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(req).await)
}

// --- Handlers ---

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: i64,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: (chrono::Utc::now() - state.start_time).num_seconds(),
    })
}
