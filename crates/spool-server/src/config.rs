//! Configuration for the spool server.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Store connection.
    pub redis: RedisConfig,
    /// Listener.
    #[serde(default)]
    pub service: ServiceConfig,
    /// Request-parameter defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DefaultsConfig {
    /// Job TTL in seconds applied when a publish names none; 0 means jobs
    /// never expire on their own.
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self { ttl: default_ttl() }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    7777
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

const fn default_ttl() -> u32 {
    86_400
}

impl ServerConfig {
    /// Load configuration from files and environment.
    ///
    /// # Errors
    ///
    /// Returns error if configuration cannot be loaded or parsed.
    pub fn load() -> anyhow::Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Toml::file("config/local.toml"))
            .merge(Env::prefixed("SPOOL_").split("__"));

        let config: Self = figment.extract()?;
        Ok(config)
    }
}
