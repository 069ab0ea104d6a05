//! HTTP API for Scythe.
//!
//! Provides an [`ApiServer`] exposing an axum-based JSON API:
//!
//! - `GET /ping`: liveness
//! - `GET /healthcheck`: storage connectivity
//! - `POST /cluster`, `GET /cluster`, `GET /cluster/{name}`: register and list clusters
//! - `POST /table`, `GET /table/{cluster}/{keyspace}/{table}`: register tables
//! - `POST /repair_run`: create a run (and optionally start it)
//! - `GET /repair_run/{id}`: run with per-state segment counts
//! - `GET /repair_run/cluster/{name}`: runs of a cluster
//! - `PUT /repair_run/{id}/start`, `PUT /repair_run/{id}/pause`
//! - `GET /repair_run/{id}/segments`: segments with rendered ranges

mod error;
mod handlers;


use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use scythe_repair::RepairRunner;
use scythe_store::RepairStore;

pub use error::ApiError;

/// Values applied when a request leaves them out.
#[derive(Debug, Clone)]
pub struct RunDefaults {
    /// Segments per run for newly registered tables.
    pub segment_count: u64,
    /// Fraction of time spent repairing.
    pub intensity: f64,
    /// Whether newly registered tables snapshot before repair.
    pub snapshot_repair: bool,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            segment_count: 100,
            intensity: 0.9,
            snapshot_repair: false,
        }
    }
}

/// Shared application state for all handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub store: Arc<dyn RepairStore>,
    pub runner: Arc<RepairRunner>,
    pub defaults: Arc<RunDefaults>,
}

/// Configuration for creating an [`ApiServer`].
pub struct ApiServerConfig {
    /// Drives runs; its store backs every endpoint.
    pub runner: Arc<RepairRunner>,
    /// Request defaults.
    pub defaults: RunDefaults,
}

/// JSON HTTP server in front of a [`RepairRunner`].
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Create a new server.
    pub fn new(config: ApiServerConfig) -> Self {
        let state = AppState {
            store: Arc::clone(config.runner.store()),
            runner: config.runner,
            defaults: Arc::new(config.defaults),
        };
        Self {
            router: Self::build_router(state),
        }
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/ping", get(handlers::ping))
            .route("/healthcheck", get(handlers::healthcheck))
            .route(
                "/cluster",
                post(handlers::add_cluster).get(handlers::list_clusters),
            )
            .route("/cluster/{name}", get(handlers::get_cluster))
            .route("/table", post(handlers::add_table))
            .route(
                "/table/{cluster}/{keyspace}/{table}",
                get(handlers::get_table),
            )
            .route("/repair_run", post(handlers::add_repair_run))
            .route("/repair_run/{id}", get(handlers::get_repair_run))
            .route(
                "/repair_run/cluster/{cluster_name}",
                get(handlers::list_cluster_runs),
            )
            .route("/repair_run/{id}/start", put(handlers::start_repair_run))
            .route("/repair_run/{id}/pause", put(handlers::pause_repair_run))
            .route("/repair_run/{id}/segments", get(handlers::list_segments))
            .with_state(state)
    }

    /// Return the inner [`Router`] (useful for testing with `tower::ServiceExt`).
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve the API with graceful shutdown triggered by the given future.
    ///
    /// When `shutdown` completes, the server stops accepting new connections
    /// and waits for in-flight requests to finish.
    pub async fn serve_with_shutdown(
        self,
        addr: &str,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "HTTP API listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
