//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared services every request handler uses
//! - Create the Axum router (RPC, health, admin)
//! - Wire up middleware (request id, tracing, timeout, body limit)
//! - Hot-swap origin policy and admin key on config reload
//! - Serve until the shutdown signal, then drain

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::auth::{SessionBinder, StoreTokenValidator};
use crate::cache::CacheStore;
use crate::capabilities::CapabilitySettings;
use crate::config::validation::validate_config;
use crate::config::{AdminConfig, GatewayConfig};
use crate::http::rpc;
use crate::observability::GatewayStats;
use crate::security::{OriginGuard, RateLimiter, SanitizationMonitor};
use crate::store::{CredentialStore, GraphStore};

/// Backends the gateway talks to but does not own.
pub struct ExternalServices {
    pub credentials: Arc<dyn CredentialStore>,
    pub graphs: Arc<dyn GraphStore>,
    /// `None` runs sessions in development mode and rate limits in-process.
    pub cache: Option<Arc<dyn CacheStore>>,
}

/// Settings that follow config reloads.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub origin_guard: OriginGuard,
    pub admin: AdminConfig,
}

impl RuntimeSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            origin_guard: OriginGuard::from_config(&config.origin),
            admin: config.admin.clone(),
        }
    }
}

/// Long-lived components shared by every request.
pub struct Services {
    pub tokens: StoreTokenValidator,
    pub sessions: SessionBinder,
    pub rate_limiter: Arc<RateLimiter>,
    pub graphs: Arc<dyn GraphStore>,
    pub monitor: SanitizationMonitor,
    pub stats: GatewayStats,
    pub capability_settings: CapabilitySettings,
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<RuntimeSettings>>,
    pub services: Arc<Services>,
}

/// HTTP server for the workflow gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig, external: ExternalServices) -> Self {
        let services = Services {
            tokens: StoreTokenValidator::new(external.credentials),
            sessions: SessionBinder::new(external.cache.clone(), &config.session),
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit, external.cache)),
            graphs: external.graphs,
            monitor: SanitizationMonitor::new(config.sanitizer.alert_threshold),
            stats: GatewayStats::new(),
            capability_settings: CapabilitySettings {
                http_timeout: Duration::from_secs(config.timeouts.capability_http_secs),
            },
        };

        let state = AppState {
            inner: Arc::new(ArcSwap::from_pointee(RuntimeSettings::from_config(&config))),
            services: Arc::new(services),
        };

        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            state,
            config,
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// The body limit sits outside the timeout: `TimeoutLayer` needs a
    /// response body with a `Default`, which the limited body lacks.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route(
                "/rpc",
                post(rpc::handle_rpc)
                    .delete(rpc::handle_logout)
                    .options(rpc::handle_preflight),
            )
            .route("/health", get(health));

        if config.admin.enabled {
            router = router.merge(admin::admin_router(state.clone()));
        }

        router.with_state(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    Duration::from_secs(config.timeouts.request_secs),
                )),
        )
    }

    /// Shared state, for embedding and tests.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            admin = self.config.admin.enabled,
            persistent_sessions = self.state.services.sessions.is_persistent(),
            "HTTP server starting"
        );

        let sweeper = self.state.services.rate_limiter.clone().spawn_sweeper(
            Duration::from_secs(self.config.rate_limit.sweep_interval_secs.max(1)),
            shutdown_rx.resubscribe(),
        );

        let inner = self.state.inner.clone();
        let reloader = tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                match validate_config(&new_config) {
                    Ok(()) => {
                        inner.store(Arc::new(RuntimeSettings::from_config(&new_config)));
                        tracing::info!("Origin policy and admin settings reloaded");
                    }
                    Err(errors) => {
                        for e in &errors {
                            tracing::warn!(field = e.field, error = %e.message, "Rejected config reload");
                        }
                    }
                }
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        reloader.abort();
        let _ = sweeper.await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
