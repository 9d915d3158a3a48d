//! Runtime configuration loaded from the environment.
//!
//! Every setting has a default suited to a local MinIO setup, so a bare
//! `webmux-server` starts against `http://localhost:9000` with the
//! `mediawiki` bucket. Variables:
//!
//! | Variable        | Default                 |
//! |-----------------|-------------------------|
//! | `S3_BUCKET`     | `mediawiki`             |
//! | `S3_ENDPOINT`   | `http://localhost:9000` |
//! | `S3_ACCESS_KEY` | `minioadmin`            |
//! | `S3_SECRET_KEY` | `minioadmin`            |
//! | `S3_REGION`     | `us-east-1`             |
//! | `LISTEN_ADDR`   | `0.0.0.0:8080`          |

use std::net::SocketAddr;
use thiserror::Error;

/// Default socket address the proxy listens on.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `LISTEN_ADDR` could not be parsed as a socket address.
    #[error("invalid listen address {value:?}: {message}")]
    InvalidListenAddr { value: String, message: String },
}

/// Complete proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,
    /// Object store connection settings.
    pub store: StoreConfig,
}

/// Connection settings for the S3-compatible object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

impl Config {
    /// Loads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an injectable variable lookup.
    ///
    /// Empty values are treated the same as unset ones and fall back to the
    /// documented defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen = or_default(&lookup, "LISTEN_ADDR", DEFAULT_LISTEN_ADDR);
        let listen_addr = listen
            .parse()
            .map_err(|err: std::net::AddrParseError| ConfigError::InvalidListenAddr {
                value: listen.clone(),
                message: err.to_string(),
            })?;

        Ok(Self {
            listen_addr,
            store: StoreConfig {
                endpoint: or_default(&lookup, "S3_ENDPOINT", "http://localhost:9000"),
                region: or_default(&lookup, "S3_REGION", "us-east-1"),
                bucket: or_default(&lookup, "S3_BUCKET", "mediawiki"),
                access_key: or_default(&lookup, "S3_ACCESS_KEY", "minioadmin"),
                secret_key: or_default(&lookup, "S3_SECRET_KEY", "minioadmin"),
            },
        })
    }
}

fn or_default(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    match lookup(key) {
        Some(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}
