use std::path::Path;
use std::time::Duration;

use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use reqwest::Url;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "ECHO_PROBE_CONFIG";
pub const ROUTER_URL_ENV: &str = "MCPROUTER_API_URL";
pub const ROUTER_TIMEOUT_ENV: &str = "MCPROUTER_TIMEOUT";
pub const ROUTER_PROXY_ENV: &str = "MCPROUTER_PROXY_URL";
pub const ROUTER_AUTH_ENV: &str = "MCPROUTER_AUTH";
pub const BACKEND_URL_ENV: &str = "ECHO_BACKEND_URL";
pub const BACKEND_TIMEOUT_ENV: &str = "ECHO_BACKEND_TIMEOUT";
pub const BACKEND_USERNAME_ENV: &str = "ECHO_BACKEND_USERNAME";
pub const BACKEND_PASSWORD_ENV: &str = "ECHO_BACKEND_PASSWORD";

pub const ENV_KEYS: &[&str] = &[
    CONFIG_PATH_ENV,
    ROUTER_URL_ENV,
    ROUTER_TIMEOUT_ENV,
    ROUTER_PROXY_ENV,
    ROUTER_AUTH_ENV,
    BACKEND_URL_ENV,
    BACKEND_TIMEOUT_ENV,
    BACKEND_USERNAME_ENV,
    BACKEND_PASSWORD_ENV,
];

/// How requests to the router identify themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <server-name>`
    #[default]
    ServerName,
    /// `Authorization: Bearer <router.auth_token>`
    Token,
    None,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct RouterConfig {
    pub api_url: String,
    pub proxy_url: String,
    /// Request timeout in seconds
    pub timeout_secs: f64,
    pub auth: AuthScheme,
    /// Bearer token used when `auth = "token"`
    pub auth_token: Option<String>,
    /// Optional direct `/v1/call-tool` invocation made by the router check
    pub smoke_call: Option<SmokeCall>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8027".into(),
            proxy_url: "http://127.0.0.1:8025".into(),
            timeout_secs: 30.0,
            auth: AuthScheme::ServerName,
            auth_token: None,
            smoke_call: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct SmokeCall {
    pub server: String,
    pub name: String,
    #[serde(default = "empty_object")]
    pub arguments: JsonValue,
}

fn empty_object() -> JsonValue {
    JsonValue::Object(Default::default())
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: f64,
    pub health_path: String,
    /// Listing that requires credentials (expected to answer 401 anonymously)
    pub tools_path: String,
    pub tools_public_path: String,
    pub intent_path: String,
    pub execute_path: String,
    pub confirm_path: String,
    /// Form-encoded login returning `{"access_token": ...}`
    pub token_path: String,
    /// Bearer token attached to intent/confirm/execute calls when present
    pub access_token: Option<String>,
    /// Login credentials; used only when no `access_token` is set
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".into(),
            timeout_secs: 30.0,
            health_path: "/health".into(),
            tools_path: "/api/v1/tools".into(),
            tools_public_path: "/api/v1/tools/public".into(),
            intent_path: "/api/v1/intent/interpret".into(),
            execute_path: "/execute".into(),
            confirm_path: "/api/v1/intent/confirm".into(),
            token_path: "/api/v1/auth/token".into(),
            access_token: None,
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Router server whose tools are listed
    pub server: String,
    /// Free-text query sent to intent interpretation
    pub query: String,
    pub user_id: i64,
    /// Fixed session id; a random one is generated per run when unset
    pub session_id: Option<String>,
    /// Reply sent to confirm a `tool_call` intent; no confirmation step when unset
    pub confirm_input: Option<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            server: "time".into(),
            query: "What time is it now?".into(),
            user_id: 1,
            session_id: None,
            confirm_input: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct PortsConfig {
    /// Program and arguments that print the OS connection table
    pub command: Vec<String>,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            command: crate::port::DEFAULT_COMMAND
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    pub router: RouterConfig,
    pub backend: BackendConfig,
    pub workflow: WorkflowConfig,
    pub ports: PortsConfig,
}

static CONFIG_SCHEMA: Lazy<std::result::Result<Validator, String>> = Lazy::new(|| {
    let schema_value = config_schema_json();
    validator_for(&schema_value).map_err(|e| e.to_string())
});

/// Returns the JSON schema describing the configuration structure.
pub fn config_schema_json() -> JsonValue {
    let schema = schemars::schema_for!(Config);
    serde_json::to_value(&schema).unwrap_or(JsonValue::Null)
}

/// Parse and validate a TOML config file. Missing keys take defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    parse_config(&content).map_err(|e| match e {
        Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
        other => other,
    })
}

pub fn parse_config(content: &str) -> Result<Config> {
    let raw: toml::Value = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
    let json_value = serde_json::to_value(&raw).map_err(|e| Error::Config(e.to_string()))?;
    let validator = CONFIG_SCHEMA.as_ref().map_err(|e| Error::Config(e.clone()))?;
    let validation_errors: Vec<_> = validator
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(Error::Config(validation_errors.join(", ")));
    }
    serde_json::from_value(json_value).map_err(|e| Error::Config(e.to_string()))
}

impl Config {
    /// Defaults, then the file named by `ECHO_PROBE_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = match lookup(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            Some(path) => load_config(path.trim())?,
            None => Config::default(),
        };
        cfg.apply_overrides(lookup)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        if let Some(url) = get(ROUTER_URL_ENV) {
            self.router.api_url = url;
        }
        if let Some(url) = get(ROUTER_PROXY_ENV) {
            self.router.proxy_url = url;
        }
        if let Some(raw) = get(ROUTER_TIMEOUT_ENV) {
            self.router.timeout_secs = parse_timeout(ROUTER_TIMEOUT_ENV, &raw)?;
        }
        if let Some(raw) = get(ROUTER_AUTH_ENV) {
            self.apply_auth(&raw)?;
        }
        if let Some(url) = get(BACKEND_URL_ENV) {
            self.backend.base_url = url;
        }
        if let Some(raw) = get(BACKEND_TIMEOUT_ENV) {
            self.backend.timeout_secs = parse_timeout(BACKEND_TIMEOUT_ENV, &raw)?;
        }
        if let Some(user) = get(BACKEND_USERNAME_ENV) {
            self.backend.username = Some(user);
        }
        if let Some(password) = get(BACKEND_PASSWORD_ENV) {
            self.backend.password = Some(password);
        }
        Ok(())
    }

    fn apply_auth(&mut self, raw: &str) -> Result<()> {
        match raw {
            "server-name" => self.router.auth = AuthScheme::ServerName,
            "none" => self.router.auth = AuthScheme::None,
            other => match other.strip_prefix("token:") {
                Some(token) if !token.is_empty() => {
                    self.router.auth = AuthScheme::Token;
                    self.router.auth_token = Some(token.to_string());
                }
                _ => {
                    return Err(Error::Config(format!(
                        "{ROUTER_AUTH_ENV} must be server-name, none or token:<value> \
                         (got {other:?})"
                    )))
                }
            },
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (label, url) in [
            ("router.api_url", &self.router.api_url),
            ("router.proxy_url", &self.router.proxy_url),
            ("backend.base_url", &self.backend.base_url),
        ] {
            let parsed =
                Url::parse(url).map_err(|e| Error::Config(format!("{label} {url:?}: {e}")))?;
            if parsed.port_or_known_default().is_none() {
                return Err(Error::Config(format!("{label} {url:?} has no port")));
            }
        }
        check_timeout("router.timeout_secs", self.router.timeout_secs)?;
        check_timeout("backend.timeout_secs", self.backend.timeout_secs)?;
        if self.router.auth == AuthScheme::Token && self.router.auth_token.is_none() {
            return Err(Error::Config(
                "router.auth = \"token\" requires router.auth_token".into(),
            ));
        }
        if self.backend.username.is_some() != self.backend.password.is_some() {
            return Err(Error::Config(
                "backend.username and backend.password must be set together".into(),
            ));
        }
        Ok(())
    }

    /// Username and password when a login is needed to obtain a token.
    pub fn backend_login(&self) -> Option<(&str, &str)> {
        if self.backend.access_token.is_some() {
            return None;
        }
        match (&self.backend.username, &self.backend.password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }

    pub fn router_base(&self) -> &str {
        self.router.api_url.trim_end_matches('/')
    }

    pub fn backend_base(&self) -> &str {
        self.backend.base_url.trim_end_matches('/')
    }

    pub fn router_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.router.timeout_secs)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.backend.timeout_secs)
    }

    pub fn router_port(&self) -> Option<u16> {
        url_port(&self.router.api_url)
    }

    pub fn proxy_port(&self) -> Option<u16> {
        url_port(&self.router.proxy_url)
    }

    pub fn backend_port(&self) -> Option<u16> {
        url_port(&self.backend.base_url)
    }

    /// Join a backend path onto the configured base URL.
    pub fn backend_url(&self, path: &str) -> String {
        join_url(self.backend_base(), path)
    }

    pub fn router_url(&self, path: &str) -> String {
        join_url(self.router_base(), path)
    }
}

pub fn url_port(url: &str) -> Option<u16> {
    Url::parse(url).ok()?.port_or_known_default()
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base, path.trim_start_matches('/'))
}

fn parse_timeout(key: &str, raw: &str) -> Result<f64> {
    let secs: f64 = raw
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a number of seconds (got {raw:?})")))?;
    check_timeout(key, secs)?;
    Ok(secs)
}

fn check_timeout(key: &str, secs: f64) -> Result<()> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(Error::Config(format!(
            "{key} must be a positive number of seconds (got {secs})"
        )));
    }
    Ok(())
}
