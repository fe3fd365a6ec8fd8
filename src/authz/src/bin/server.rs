//! # Classgate Gate Server
//!
//! Serves the platform's protected views behind the access gate, plus a few
//! endpoints around it.
//!
//! ## Endpoints
//!
//! - `POST /v1/evaluate` - Evaluate a requirement for a principal state
//! - `GET|PUT /v1/settings` - Accessibility settings of the signed-in user
//! - `GET /dashboard`, `/students`, `/school`, `/admin`, `/grading` - Protected views
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics
//!
//! Identity is read from `x-principal-*` headers set by the authenticating
//! proxy in front of this server. See [`classgate_authz::config`] for the
//! configuration variables; `RUST_LOG` sets the log filter (default: info).

use anyhow::Context;
use axum::{
    extract::{Extension, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use classgate_authz::{
    http::{header_identity, protect},
    redirect::Outcome,
    settings::JsonFileSettingsBackend,
    AccessGate, AccessRequirement, AccessibilitySettings, AppConfig, AuthzError, Decision,
    MetricsCollector, PrincipalState, RedirectPolicy, SettingsRegistry, SettingsStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shared application state
#[derive(Clone)]
struct AppState {
    gate: Arc<AccessGate>,
    policy: Arc<RedirectPolicy>,
    settings: Arc<SettingsRegistry>,
    start_time: std::time::Instant,
}

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

/// Application error type
#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Unauthorized,
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "no signed-in principal".to_string(),
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Configuration(_) | AuthzError::Settings(_) => {
                AppError::BadRequest(err.to_string())
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EvaluateRequest {
    principal: PrincipalState,
    requirement: AccessRequirement,
    #[serde(default = "default_from")]
    from: String,
}

fn default_from() -> String {
    "/".to_string()
}

#[derive(Debug, Serialize)]
struct EvaluateResponse {
    decision: Decision,
    outcome: Outcome,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    version: String,
}

/// POST /v1/evaluate
async fn evaluate(
    State(state): State<AppState>,
    Json(req): Json<EvaluateRequest>,
) -> Json<EvaluateResponse> {
    let decision = state.gate.evaluate(&req.principal, &req.requirement);
    let outcome = state.policy.resolve(&decision, req.principal.principal(), &req.from);

    Json(EvaluateResponse { decision, outcome })
}

/// Settings store of the requesting principal
async fn principal_settings(
    state: &AppState,
    identity: &PrincipalState,
) -> Result<Arc<SettingsStore>, AppError> {
    let principal = identity.principal().ok_or(AppError::Unauthorized)?;
    Ok(state.settings.for_principal(&principal.id).await?)
}

/// GET /v1/settings
async fn get_settings(
    State(state): State<AppState>,
    Extension(identity): Extension<PrincipalState>,
) -> Result<Json<AccessibilitySettings>, AppError> {
    let store = principal_settings(&state, &identity).await?;
    Ok(Json(store.get().await))
}

/// PUT /v1/settings
async fn put_settings(
    State(state): State<AppState>,
    Extension(identity): Extension<PrincipalState>,
    Json(settings): Json<AccessibilitySettings>,
) -> Result<Json<AccessibilitySettings>, AppError> {
    let store = principal_settings(&state, &identity).await?;
    Ok(Json(store.set(settings).await?))
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: classgate_authz::VERSION.to_string(),
    })
}

/// GET /metrics
async fn metrics(State(state): State<AppState>) -> Response {
    let body = state
        .gate
        .metrics()
        .map(|m| m.to_prometheus())
        .unwrap_or_default();

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

/// Placeholder body for a protected view
fn view(name: &'static str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "view": name }))
}

/// Protected views with their requirements
fn view_routes(state: &AppState) -> anyhow::Result<Router<AppState>> {
    let guarded = |path: &str, name: &'static str, requirement: AccessRequirement| -> Router<AppState> {
        protect(
            Router::new().route(path, get(move || async move { view(name) })),
            state.gate.clone(),
            state.policy.clone(),
            requirement,
        )
    };

    let settings: Router<AppState> = protect(
        Router::new().route("/v1/settings", get(get_settings).put(put_settings)),
        state.gate.clone(),
        state.policy.clone(),
        AccessRequirement::authenticated(),
    );

    Ok(Router::new()
        .merge(guarded(
            "/dashboard",
            "dashboard",
            AccessRequirement::builder().role("teacher").build()?,
        ))
        .merge(guarded(
            "/students",
            "students",
            AccessRequirement::builder().role("student").build()?,
        ))
        .merge(guarded(
            "/school",
            "school",
            AccessRequirement::builder().role("school").build()?,
        ))
        .merge(guarded(
            "/admin",
            "admin",
            AccessRequirement::builder()
                .role("admin")
                .deny_role("suspended")
                .build()?,
        ))
        .merge(guarded(
            "/grading",
            "grading",
            AccessRequirement::builder()
                .permission("grade")
                .deny_role("suspended")
                .build()?,
        ))
        .merge(settings))
}

/// Create the HTTP router with all endpoints
fn create_router(state: AppState) -> anyhow::Result<Router> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http().on_response(DefaultOnResponse::new().level(Level::INFO));

    Ok(view_routes(&state)?
        .route("/v1/evaluate", post(evaluate))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn(header_identity))
        .layer(ServiceBuilder::new().layer(trace).layer(cors))
        .with_state(state))
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Classgate Gate Server v{}", classgate_authz::VERSION);

    let config = match std::env::var("CLASSGATE_CONFIG") {
        Ok(path) => AppConfig::from_file(&path)
            .with_context(|| format!("failed to read config file {}", path))?,
        Err(_) => AppConfig::default(),
    }
    .with_env()
    .context("invalid environment configuration")?;

    info!("Configuration:");
    info!("  Bind: {}", config.server.bind_address());
    info!("  Cache checks: {}", config.gate.cache_checks);
    info!("  Cache TTL: {:?}", config.gate.cache_timeout);
    info!("  Settings dir: {}", config.server.settings_dir.display());

    let gate = AccessGate::new(config.gate.clone()).with_metrics(MetricsCollector::new());
    let settings = SettingsRegistry::new(Arc::new(JsonFileSettingsBackend::new(
        &config.server.settings_dir,
    )));

    let state = AppState {
        gate: Arc::new(gate),
        policy: Arc::new(config.redirect.clone()),
        settings: Arc::new(settings),
        start_time: std::time::Instant::now(),
    };

    let app = create_router(state)?;
    let addr = config.server.bind_address();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("Listening on {}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shut down gracefully");
    Ok(())
}
