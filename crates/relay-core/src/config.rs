use anyhow::Result;
use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "RELAY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// When a topic gets a new remote session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct SessionPolicy {
    /// Open a session for a topic's first automatic location.
    pub start_automatically: bool,
    /// Open a fresh session whenever the user pushes a location by hand.
    pub start_on_manual_trigger: bool,
    /// Stop the previous session before replacing it.
    pub stop_prior_session_on_new_start: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            start_automatically: true,
            start_on_manual_trigger: true,
            stop_prior_session_on_new_start: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// Subscription filter, e.g. `owntracks/#`.
    pub topic: String,
    pub user: String,
    pub password: String,
    pub tls: bool,
    pub anonymous: bool,
    /// Fixed client id; a random one is generated when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            topic: "owntracks/#".into(),
            user: String::new(),
            password: String::new(),
            tls: false,
            anonymous: true,
            client_id: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct HaukConfig {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub user: String,
    pub password: String,
    pub anonymous: bool,
    /// Session lifetime in seconds.
    pub duration: u32,
    /// Expected update interval in seconds.
    pub interval: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HaukConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 80,
            tls: false,
            user: String::new(),
            password: String::new(),
            anonymous: true,
            duration: 3600,
            interval: 1,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct GotifyConfig {
    pub enabled: bool,
    /// Base URL of the Gotify server.
    pub url: String,
    pub app_token: String,
    pub priority: i64,
}

impl Default for GotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            app_token: String::new(),
            priority: 5,
        }
    }
}

/// Mail sent through an SMTP relay. STARTTLS is used when the server offers it.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// PLAIN login; no authentication when empty.
    pub login: String,
    pub password: String,
    pub from: String,
    pub to: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".into(),
            port: 25,
            login: String::new(),
            password: String::new(),
            from: String::new(),
            to: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct NotificationConfig {
    pub gotify: GotifyConfig,
    pub smtp: SmtpConfig,
}

/// Read-only session listing page.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct FrontendConfig {
    pub enabled: bool,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub anonymous: bool,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
            user: String::new(),
            password: String::new(),
            anonymous: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub hauk: HaukConfig,
    #[serde(default)]
    pub sessions: SessionPolicy,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub frontend: FrontendConfig,
}

static CONFIG_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    let schema = schemars::schema_for!(Config);
    let schema_value = serde_json::to_value(&schema).expect("schema value");
    validator_for(&schema_value).expect("valid schema")
});

/// Returns the JSON schema describing the configuration structure.
///
/// # Panics
///
/// Panics if schema generation fails; this indicates a programming error.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(Config);
    serde_json::to_value(&schema).expect("schema json")
}

/// Config file location: `$RELAY_CONFIG` or `config.toml`.
pub fn config_path_from_env() -> String {
    std::env::var(CONFIG_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

pub fn parse_config(content: &str) -> Result<Config> {
    let raw: toml::Value = toml::from_str(content)?;
    let json_value = serde_json::to_value(&raw)?;
    let validation_errors: Vec<_> = CONFIG_SCHEMA
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(anyhow::anyhow!(validation_errors.join(", ")));
    }
    let cfg: Config = toml::from_str(content)?;
    Ok(cfg)
}

pub fn load_config(path: &str) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}
