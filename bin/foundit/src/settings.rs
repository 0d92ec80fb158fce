//! Runtime settings, read from `FOUNDIT_*` environment variables (a `.env`
//! file is honoured) on top of built-in defaults.

use std::time::Duration;

use config::{Config, ConfigError, Environment};
use fi_core::config::{
    BoardSettings, DEFAULT_EMAIL_DOMAIN, DEFAULT_GRACE_PERIOD, DEFAULT_MAX_FILES,
    DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_SESSION_TTL, DEFAULT_SWEEP_INTERVAL,
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub bind_addr: String,
    pub port: u16,
    pub database_url: String,
    pub upload_dir: String,
    pub url_prefix: String,
    pub grace_period_secs: u64,
    pub sweep_interval_secs: u64,
    pub sweeper_enabled: bool,
    pub allowed_email_domain: String,
    pub max_files: usize,
    pub max_request_bytes: usize,
    pub session_ttl_secs: u64,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("bind_addr", "127.0.0.1")?
            .set_default("port", 8080)?
            .set_default("database_url", "sqlite://foundit.db")?
            .set_default("upload_dir", "./data/uploads")?
            .set_default("url_prefix", "/static/uploads")?
            .set_default("grace_period_secs", DEFAULT_GRACE_PERIOD.as_secs())?
            .set_default("sweep_interval_secs", DEFAULT_SWEEP_INTERVAL.as_secs())?
            .set_default("sweeper_enabled", true)?
            .set_default("allowed_email_domain", DEFAULT_EMAIL_DOMAIN)?
            .set_default("max_files", DEFAULT_MAX_FILES as u64)?
            .set_default("max_request_bytes", DEFAULT_MAX_UPLOAD_BYTES as u64)?
            .set_default("session_ttl_secs", DEFAULT_SESSION_TTL.as_secs())?
            .add_source(Environment::with_prefix("FOUNDIT").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn board(&self) -> BoardSettings {
        BoardSettings {
            allowed_email_domain: self.allowed_email_domain.clone(),
            max_files: self.max_files,
            max_upload_bytes: self.max_request_bytes,
            session_ttl: Duration::from_secs(self.session_ttl_secs),
        }
    }
}
