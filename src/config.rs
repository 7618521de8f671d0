//! Client configuration.
//!
//! Values come from an optional TOML file and are then overridden by
//! environment variables. `management_api`, `gateway`, `function_id` and
//! `api_key` are required; everything else has a default.

use std::path::Path;
use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;

use crate::error::{ClientError, Result};

pub const ENV_MANAGEMENT_API: &str = "MANAGEMENT_API_ENDPOINT";
pub const ENV_GATEWAY: &str = "GATEWAY_ENDPOINT";
pub const ENV_FUNCTION_ID: &str = "CLOUD_FUNCTION_ID";
pub const ENV_API_KEY: &str = "API_KEY";
pub const ENV_FUNCTION_PATH: &str = "CLOUD_FUNCTION_PATH";
pub const ENV_AUTH_TOKEN: &str = "AUTH_TOKEN";
pub const ENV_REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT_SECS";

/// Shape of the TOML file. Every field is optional so a file can carry only
/// the non-secret part and leave the API key to the environment.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    management_api: Option<String>,
    gateway: Option<String>,
    function_id: Option<String>,
    api_key: Option<String>,
    function_path: Option<String>,
    auth_token: Option<String>,
    submit_method: Option<String>,
    request_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
}

/// Resolved configuration for one client session.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the token-issuing management API, without trailing slash.
    pub management_api: String,
    /// Base URL of the function gateway, without trailing slash.
    pub gateway: String,
    pub function_id: String,
    /// Static key used only against the token endpoint.
    pub api_key: String,
    /// Path suffix invoked on submission (e.g. `/chat`).
    pub function_path: String,
    /// When set, the token endpoint is never called.
    pub override_token: Option<String>,
    pub submit_method: Method,
    /// Deadline around each resolve-then-call sequence. `None` waits forever.
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("management_api", &self.management_api)
            .field("gateway", &self.gateway)
            .field("function_id", &self.function_id)
            .field("api_key", &"<redacted>")
            .field("function_path", &self.function_path)
            .field("override_token", &self.override_token.as_ref().map(|_| "<redacted>"))
            .field("submit_method", &self.submit_method)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ClientConfig {
    /// Build a config directly, with defaults for the optional parts.
    pub fn new(
        management_api: impl Into<String>,
        gateway: impl Into<String>,
        function_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            management_api: trim_base(management_api.into()),
            gateway: trim_base(gateway.into()),
            function_id: function_id.into(),
            api_key: api_key.into(),
            function_path: "/".to_string(),
            override_token: None,
            submit_method: Method::POST,
            request_timeout: None,
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_function_path(mut self, path: impl Into<String>) -> Self {
        self.function_path = normalize_path(path.into());
        self
    }

    pub fn with_override_token(mut self, token: impl Into<String>) -> Self {
        self.override_token = Some(token.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_submit_method(mut self, method: Method) -> Self {
        self.submit_method = method;
        self
    }

    /// Load from an optional TOML file, then the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let contents = match file {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|e| {
                ClientError::Config(format!("cannot read {}: {e}", path.display()))
            })?),
            None => None,
        };
        Self::from_sources(contents.as_deref(), |key| std::env::var(key).ok())
    }

    /// Merge TOML `contents` with variables looked up through `env`.
    /// Environment values win. Empty environment values count as unset.
    pub fn from_sources<F>(contents: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file: FileConfig = match contents {
            Some(raw) => toml::from_str(raw)
                .map_err(|e| ClientError::Config(format!("invalid config file: {e}")))?,
            None => FileConfig::default(),
        };
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let required = |env_key: &str, from_file: Option<String>| {
            env(env_key)
                .or(from_file)
                .ok_or_else(|| ClientError::Config(format!("{env_key} is not set")))
        };

        let management_api = required(ENV_MANAGEMENT_API, file.management_api)?;
        let gateway = required(ENV_GATEWAY, file.gateway)?;
        let function_id = required(ENV_FUNCTION_ID, file.function_id)?;
        let api_key = required(ENV_API_KEY, file.api_key)?;

        let mut cfg = Self::new(management_api, gateway, function_id, api_key);

        if let Some(path) = env(ENV_FUNCTION_PATH).or(file.function_path) {
            cfg = cfg.with_function_path(path);
        }
        cfg.override_token = env(ENV_AUTH_TOKEN).or(file.auth_token);

        if let Some(m) = file.submit_method {
            cfg.submit_method = parse_method(&m)?;
        }

        let timeout_secs = match env(ENV_REQUEST_TIMEOUT) {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                ClientError::Config(format!("{ENV_REQUEST_TIMEOUT} must be whole seconds, got {raw:?}"))
            })?),
            None => file.request_timeout_secs,
        };
        cfg.request_timeout = timeout_secs.filter(|s| *s > 0).map(Duration::from_secs);
        if let Some(secs) = file.connect_timeout_secs {
            cfg.connect_timeout = Duration::from_secs(secs.max(1));
        }

        Ok(cfg)
    }

    /// `{management_api}/v1/codeservices/{function_id}/token`
    pub fn token_url(&self) -> String {
        format!("{}/v1/codeservices/{}/token", self.management_api, self.function_id)
    }

    /// `{gateway}/functions/{function_id}{path}`
    pub fn function_url(&self, path: &str) -> String {
        format!("{}/functions/{}{}", self.gateway, self.function_id, path)
    }
}

/// Parse an HTTP method name case-insensitively.
pub fn parse_method(raw: &str) -> Result<Method> {
    Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| ClientError::Config(format!("invalid HTTP method {raw:?}")))
}

fn trim_base(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn normalize_path(path: String) -> String {
    let path = path.trim();
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
