//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the dispatcher, throttle and request log once (composition root)
//! - Create the Axum router with proxy, health and admin handlers
//! - Wire up middleware (request ID, tracing, throttle, request log)
//! - Run background tasks and serve until shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::Request,
    middleware,
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin;
use crate::config::{AdminConfig, GatewayConfig};
use crate::dispatch::ServiceDispatcher;
use crate::http::proxy::{health_handler, proxy_handler};
use crate::http::request::{request_id, UuidRequestId};
use crate::lifecycle::Shutdown;
use crate::observability::request_log::{record_requests, RequestLog};
use crate::security::{rate_limit_middleware, AdmissionThrottle, MemoryCounterStore};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<ServiceDispatcher>,
    pub request_log: Arc<RequestLog>,
    pub admin: Arc<AdminConfig>,
    pub max_body_bytes: usize,
}

/// The gateway HTTP server.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
    state: AppState,
    store: Arc<MemoryCounterStore>,
}

impl GatewayServer {
    /// Build every subsystem from `config`.
    pub fn new(config: GatewayConfig) -> Self {
        let state = AppState {
            dispatcher: Arc::new(ServiceDispatcher::new(&config.services)),
            request_log: Arc::new(RequestLog::new(config.request_log.capacity)),
            admin: Arc::new(config.admin.clone()),
            max_body_bytes: config.listener.max_body_bytes,
        };

        let store = Arc::new(MemoryCounterStore::new());
        let throttle = Arc::new(AdmissionThrottle::new(store.clone(), &config.rate_limit));

        let router = Self::build_router(state.clone(), throttle);
        Self {
            router,
            config,
            state,
            store,
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers, outermost first: request ID, trace span, throttle, request log.
    pub fn build_router(state: AppState, throttle: Arc<AdmissionThrottle<MemoryCounterStore>>) -> Router {
        let mut routes = Router::new()
            .route("/api/{service}", any(proxy_handler))
            .route("/api/{service}/{*path}", any(proxy_handler))
            .route("/health", get(health_handler));

        if state.admin.enabled {
            routes = routes.merge(admin::admin_router(state.clone()));
        }

        routes
            .with_state(state.clone())
            .layer(middleware::from_fn_with_state(state.request_log.clone(), record_requests))
            .layer(middleware::from_fn_with_state(
                throttle,
                rate_limit_middleware::<MemoryCounterStore>,
            ))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id(request.headers()),
                )
            }))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// A clone of the fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn dispatcher(&self) -> &Arc<ServiceDispatcher> {
        &self.state.dispatcher
    }

    pub fn request_log(&self) -> &Arc<RequestLog> {
        &self.state.request_log
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires, then drain.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            services = ?self.state.dispatcher.service_names(),
            admin = self.config.admin.enabled,
            "HTTP server starting"
        );

        let sweeper = if self.config.rate_limit.enabled {
            let store = self.store.clone();
            let interval = Duration::from_secs(self.config.rate_limit.sweep_interval_secs.max(1));
            let rx = shutdown.subscribe();
            Some(tokio::spawn(async move { store.run_sweeper(interval, rx).await }))
        } else {
            None
        };

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.signalled())
            .await;

        // The sweeper may still be waiting if serving ended on an error
        shutdown.trigger();
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Counter sweeper task failed");
            }
        }

        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
