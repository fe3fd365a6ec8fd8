//! Application configuration
//!
//! Loaded from a JSON document, then overridden by environment variables:
//!
//! - `CLASSGATE_CACHE_CHECKS` - cache role/permission checks (default: true)
//! - `CLASSGATE_CACHE_TTL_MS` - check cache TTL in milliseconds (default: 30000)
//! - `CLASSGATE_LOGIN_PATH` - redirect for signed-out users (default: /login)
//! - `CLASSGATE_UNAUTHORIZED_PATH` - redirect for denied users (default: /unauthorized)
//! - `CLASSGATE_SETTINGS_DIR` - directory of persisted settings (default: ./data)
//! - `HOST` / `PORT` - server bind address (default: 0.0.0.0:8080)

use crate::engine::GateConfig;
use crate::error::{AuthzError, Result};
use crate::redirect::RedirectPolicy;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Directory of persisted settings documents
    pub settings_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            settings_dir: PathBuf::from("./data"),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gate: GateConfig,
    pub redirect: RedirectPolicy,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Parse a JSON document
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Read a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Apply overrides from the process environment
    pub fn with_env(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CLASSGATE_CACHE_CHECKS") {
            self.gate.cache_checks = parse("CLASSGATE_CACHE_CHECKS", &value)?;
        }
        if let Some(value) = lookup("CLASSGATE_CACHE_TTL_MS") {
            let ms: u64 = parse("CLASSGATE_CACHE_TTL_MS", &value)?;
            self.gate.cache_timeout = Duration::from_millis(ms);
        }
        if let Some(value) = lookup("CLASSGATE_LOGIN_PATH") {
            self.redirect.login_path = value;
        }
        if let Some(value) = lookup("CLASSGATE_UNAUTHORIZED_PATH") {
            self.redirect.unauthorized_path = value;
        }
        if let Some(value) = lookup("CLASSGATE_SETTINGS_DIR") {
            self.server.settings_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("HOST") {
            self.server.host = value;
        }
        if let Some(value) = lookup("PORT") {
            self.server.port = parse("PORT", &value)?;
        }
        Ok(self)
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AuthzError::Configuration(format!("{}: invalid value {:?}", key, value)))
}
