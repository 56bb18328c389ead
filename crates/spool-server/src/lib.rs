//! spool-server
//!
//! HTTP surface of the spool task queue: a thin translation layer from the
//! REST API to [`spool_core::Engine`] calls.

pub mod app;
pub mod config;

pub use app::build_app;
pub use config::ServerConfig;
