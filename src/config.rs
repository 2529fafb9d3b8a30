use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::auth::AuthConfig;
use crate::cache::CacheConfig;
use crate::db::DatabaseConfig;
use crate::mailer::MailConfig;
use crate::ratelimit::RateLimitConfig;

/// Top-level service configuration.
///
/// Every section falls back to its defaults when absent, so an empty `{}`
/// file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub mail: MailConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the HTTP API binds to.
    pub bind: String,
    /// Upper bound on a single request, in seconds.
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: env::var("SOCIAL_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            request_timeout_seconds: 60,
        }
    }
}

/// Locate the configuration file, if any.
///
/// `SOCIAL_CONFIG` wins when set (and must then exist); otherwise
/// `./social.json` is used when present.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = env::var("SOCIAL_CONFIG") {
        return Some(PathBuf::from(p));
    }

    let candidate = PathBuf::from("social.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

pub fn load_config() -> anyhow::Result<AppConfig> {
    match resolve_config_path() {
        Some(path) => load_config_from(&path),
        None => Ok(AppConfig::default()),
    }
}

pub fn load_config_from(path: &Path) -> anyhow::Result<AppConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let mut value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    expand_value(&mut value);

    let config = serde_json::from_value(value)
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(config)
}

fn expand_value(value: &mut Value) {
    match value {
        Value::String(s) => *s = expand_env_vars(s),
        Value::Array(items) => items.iter_mut().for_each(expand_value),
        Value::Object(map) => map.values_mut().for_each(expand_value),
        _ => {}
    }
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Ok(val) = env::var(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}
