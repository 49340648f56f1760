//! Session configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_COOKIE_NAME: &str = "jwt";
pub const DEFAULT_COOKIE_PATH: &str = "/";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting: env var {var} not set")]
    Missing { var: &'static str },
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("config parse failed: {0}")]
    Parse(String),
}

/// Body encoding used for `POST {base}/login/email`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginEncoding {
    /// `application/x-www-form-urlencoded` with `username` + `password`.
    #[default]
    Form,
    /// `application/json` with `email` + `password`.
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Backend base URL without a trailing slash.
    pub api_base_url: String,
    pub cookie_name: String,
    pub cookie_path: String,
    pub session_ttl: Duration,
    pub login_encoding: LoginEncoding,
    pub request_timeout: Duration,
}

impl SessionConfig {
    /// Config with defaults for everything except the backend URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if `api_base_url` is not an
    /// absolute http(s) URL.
    pub fn new(api_base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_base_url: normalize_base_url(api_base_url)?,
            cookie_name: DEFAULT_COOKIE_NAME.to_owned(),
            cookie_path: DEFAULT_COOKIE_PATH.to_owned(),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            login_encoding: LoginEncoding::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    /// Build typed session config from environment variables.
    ///
    /// Required:
    /// - `ROOMSYNC_API_BASE_URL`
    ///
    /// Optional:
    /// - `ROOMSYNC_SESSION_COOKIE`: default `jwt`
    /// - `ROOMSYNC_SESSION_TTL_SECS`: default 86400
    /// - `ROOMSYNC_LOGIN_ENCODING`: `form` (default) or `json`
    /// - `ROOMSYNC_REQUEST_TIMEOUT_SECS`: default 30
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the base URL is missing or any value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SessionConfig::from_env`] but reading through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the base URL is missing or any value fails to parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = lookup("ROOMSYNC_API_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing { var: "ROOMSYNC_API_BASE_URL" })?;
        let mut config = Self::new(&base)?;

        if let Some(name) = lookup("ROOMSYNC_SESSION_COOKIE") {
            let name = name.trim();
            if name.is_empty() || name.contains([';', '=', ' ']) {
                return Err(ConfigError::Parse(format!("invalid ROOMSYNC_SESSION_COOKIE: {name:?}")));
            }
            name.clone_into(&mut config.cookie_name);
        }
        if let Some(raw) = lookup("ROOMSYNC_SESSION_TTL_SECS") {
            config.session_ttl = Duration::from_secs(parse_secs("ROOMSYNC_SESSION_TTL_SECS", &raw)?);
        }
        config.login_encoding = parse_login_encoding(lookup("ROOMSYNC_LOGIN_ENCODING").as_deref())?;
        if let Some(raw) = lookup("ROOMSYNC_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_secs("ROOMSYNC_REQUEST_TIMEOUT_SECS", &raw)?);
        }

        Ok(config)
    }

    /// Absolute URL for an API path such as `/login/email`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base_url, path.trim_start_matches('/'))
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = reqwest::Url::parse(trimmed).map_err(|e| ConfigError::InvalidBaseUrl(format!("{trimmed}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ConfigError::InvalidBaseUrl(trimmed.to_owned()));
    }
    Ok(trimmed.to_owned())
}

fn parse_secs(key: &str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::Parse(format!("{key} must be a positive integer, got {raw:?}"))),
    }
}

fn parse_login_encoding(raw: Option<&str>) -> Result<LoginEncoding, ConfigError> {
    match raw.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        None | Some("" | "form") => Ok(LoginEncoding::Form),
        Some("json") => Ok(LoginEncoding::Json),
        Some(other) => Err(ConfigError::Parse(format!(
            "unsupported ROOMSYNC_LOGIN_ENCODING '{other}' (expected 'form' or 'json')"
        ))),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
