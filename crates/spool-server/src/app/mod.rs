//! HTTP application wiring (router + state).
//!
//! - `handlers.rs`: one handler per route of the queue API
//! - `errors.rs`: consistent JSON error responses
//!
//! The engine is injected as trait-object state, so the same router serves
//! the Redis engine in production and the in-memory engine in tests.

use std::sync::Arc;

use axum::routing::{get, put};
use axum::Router;

use spool_core::Engine;

pub mod errors;
pub mod handlers;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn Engine>,
    /// TTL applied when a publish or respawn names none.
    pub default_ttl: u32,
}

/// Build the full router (public entrypoint used by `main.rs` and tests).
pub fn build_app(engine: Arc<dyn Engine>, default_ttl: u32) -> Router {
    let state = AppState {
        engine,
        default_ttl,
    };

    // NOTE: the second segment of the consume route is a comma-separated
    // queue list, but the router requires one parameter name per position,
    // so every route spells it `:queue`.
    Router::new()
        .route(
            "/:namespace/:queue",
            put(handlers::publish)
                .get(handlers::consume)
                .delete(handlers::destroy_queue),
        )
        .route("/:namespace/:queue/peek", get(handlers::peek_queue))
        .route("/:namespace/:queue/size", get(handlers::size))
        .route(
            "/:namespace/:queue/job/:job_id",
            get(handlers::peek_job).delete(handlers::delete_job),
        )
        .route(
            "/:namespace/:queue/deadletter",
            get(handlers::peek_deadletter)
                .put(handlers::respawn_deadletter)
                .delete(handlers::delete_deadletter),
        )
        .with_state(state)
}
