//! Startup configuration (spec §1.1): read once from environment
//! variables, optionally preceded by a `.env` file. No CLI flag parsing.
//!
//! Grounded in the donor's `ferrex-server/src/infra/config.rs`
//! `Config::from_env` shape, layered through the `config` crate instead
//! of raw `env::var` calls since this workspace already depends on it.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use mediaqueue_model::Label;
use serde::Deserialize;

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_scheduler_tick_ms() -> u64 {
    1_000
}

fn default_registrar_tick_ms() -> u64 {
    15_000
}

fn default_max_concurrent_tasks() -> u32 {
    4
}

fn default_db_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub database_url: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,

    #[serde(default = "default_scheduler_tick_ms")]
    pub scheduler_tick_ms: u64,

    #[serde(default = "default_registrar_tick_ms")]
    pub registrar_tick_ms: u64,

    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: u32,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Defaults to the host name the way the original system and
    /// `ferrex-server` both fall back to an OS-derived identity when
    /// the operator doesn't set one explicitly.
    #[serde(default)]
    pub client_identifier: Option<String>,

    /// Comma-separated (`CLIENT_LABELS=gpu,4k`), split in [`labels`] the
    /// same way the donor splits `CORS_ALLOWED_ORIGINS` by hand rather
    /// than through the config crate's list parsing.
    #[serde(default)]
    pub client_labels: String,

    #[serde(default)]
    pub basic_auth_user: Option<String>,
    #[serde(default)]
    pub basic_auth_pass: Option<String>,
}

impl ServerConfig {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to assemble server configuration")?;

        settings
            .try_deserialize()
            .context("missing or invalid environment configuration (DATABASE_URL is required)")
    }

    pub fn bind_socket_addr(&self) -> Result<SocketAddr> {
        self.bind_addr
            .parse()
            .with_context(|| format!("invalid bind_addr: {}", self.bind_addr))
    }

    pub fn resolved_identifier(&self) -> String {
        self.client_identifier.clone().unwrap_or_else(|| {
            hostname()
                .unwrap_or_else(|| "mediaqueue-server".to_string())
        })
    }

    pub fn labels(&self) -> Vec<Label> {
        self.client_labels
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Label::new)
            .collect()
    }
}

fn hostname() -> Option<String> {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            #[cfg(unix)]
            {
                nix::unistd::gethostname()
                    .ok()
                    .and_then(|h| h.into_string().ok())
            }
            #[cfg(not(unix))]
            {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_identifier_falls_back_without_panicking() {
        let cfg = ServerConfig {
            database_url: "postgres://localhost/test".to_string(),
            bind_addr: default_bind_addr(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            scheduler_tick_ms: default_scheduler_tick_ms(),
            registrar_tick_ms: default_registrar_tick_ms(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            db_max_connections: default_db_max_connections(),
            client_identifier: None,
            client_labels: String::new(),
            basic_auth_user: None,
            basic_auth_pass: None,
        };
        assert!(!cfg.resolved_identifier().is_empty());
    }

    #[test]
    fn labels_splits_and_trims_comma_separated_list() {
        let mut cfg = ServerConfig {
            database_url: "postgres://localhost/test".to_string(),
            bind_addr: default_bind_addr(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            scheduler_tick_ms: default_scheduler_tick_ms(),
            registrar_tick_ms: default_registrar_tick_ms(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            db_max_connections: default_db_max_connections(),
            client_identifier: None,
            client_labels: String::new(),
            basic_auth_user: None,
            basic_auth_pass: None,
        };
        assert!(cfg.labels().is_empty());

        cfg.client_labels = "gpu, 4k,  ,encode".to_string();
        let labels = cfg.labels();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels[0], Label::new("gpu"));
        assert_eq!(labels[1], Label::new("4k"));
        assert_eq!(labels[2], Label::new("encode"));
    }
}
