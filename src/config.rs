//! Configuration handling (spec §6 "Configuration"): one JSON document,
//! layered with `I3X_`-prefixed environment variables via the `config`
//! crate, held in a [`concread::cowcell`] so the ingest/HTTP tasks read a
//! stable snapshot while an admin reload swaps it atomically. Mirrors the
//! teacher's `config.rs` `ConfigFile`/`try_from`/`try_as_cowcell` shape,
//! generalized from a DNS server's fields to spec §6's abstract document.

use crate::error::BridgeError;
use crate::model::{Namespace, ObjectType};
use crate::schema_mapper::MappingRule;
use concread::cowcell::asynch::CowCell;
use config::Config;
use gethostname::gethostname;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;

const CONFIG_LOCATIONS: [&str; 2] = ["~/.config/i3x-bridge.json", "./i3x-bridge.json"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Listen address for the REST + SSE surface, default `127.0.0.1`.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Bearer/API-key check, external to the core per spec §1 — a no-op
/// middleware when `enabled` is false.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MqttTlsConfig {
    #[serde(default)]
    pub ca_file: Option<String>,
    #[serde(default)]
    pub insecure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MqttConfig {
    pub broker_url: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: Option<MqttTlsConfig>,
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
    #[serde(default = "default_reconnect_period")]
    pub reconnect_period_secs: u64,
    /// Advisory only — `rumqttc` speaks MQTT v3.1.1/v4; recorded so a
    /// config targeting v5 fails `check_config` loudly rather than silently
    /// downgrading.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_url: "tcp://localhost:1883".to_string(),
            client_id: None,
            username: None,
            password: None,
            tls: None,
            keepalive_secs: default_keepalive(),
            reconnect_period_secs: default_reconnect_period(),
            protocol_version: default_protocol_version(),
        }
    }
}

fn default_keepalive() -> u64 {
    30
}

fn default_reconnect_period() -> u64 {
    5
}

fn default_protocol_version() -> String {
    "3.1.1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_hostname() -> String {
    gethostname().to_string_lossy().into_owned()
}

/// The main config document (spec §6): `{server, auth, mqtt, namespaces,
/// objectTypes, mappings}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
    #[serde(default)]
    pub object_types: Vec<ObjectType>,
    #[serde(default)]
    pub mappings: Vec<MappingRule>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            log_level: default_log_level(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            mqtt: MqttConfig::default(),
            namespaces: Vec::new(),
            object_types: Vec::new(),
            mappings: Vec::new(),
        }
    }
}

impl ConfigFile {
    pub fn as_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn api_listener_address(&self) -> Result<SocketAddr, BridgeError> {
        SocketAddr::from_str(&format!("{}:{}", self.server.address, self.server.port))
            .map_err(|e| BridgeError::ConfigError(format!("invalid server address: {e}")))
    }

    /// Best-effort sanity checks beyond what serde already enforces: a
    /// parseable listener address, MQTT protocol version we can actually
    /// speak, and mapping rule ids/topics that compile.
    pub fn check(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = self.api_listener_address() {
            errors.push(e.to_string());
        }
        if self.mqtt.protocol_version != "3.1.1" && self.mqtt.protocol_version != "4" {
            errors.push(format!(
                "unsupported mqtt protocol_version {:?} (this bridge speaks MQTT v3.1.1/v4)",
                self.mqtt.protocol_version
            ));
        }
        for mapping in &self.mappings {
            if let Err(e) = crate::topic_pattern::TopicPattern::compile(&mapping.topic) {
                errors.push(format!("mapping {:?}: invalid topic pattern: {e}", mapping.id));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Loads from `config_path`, or the first of [`CONFIG_LOCATIONS`] that
    /// exists, layered with `I3X_`-prefixed environment variables.
    pub fn try_from(config_path: Option<&str>) -> Result<Self, BridgeError> {
        let file_locations: Vec<String> = match config_path {
            Some(value) => vec![value.to_string()],
            None => CONFIG_LOCATIONS.iter().map(|s| s.to_string()).collect(),
        };

        let found: Vec<String> = file_locations
            .iter()
            .map(|f| shellexpand::tilde(f).into_owned())
            .filter(|path| std::path::Path::new(path).exists())
            .collect();

        let Some(config_filename) = found.into_iter().next() else {
            return Err(BridgeError::ConfigError(format!(
                "no configuration file found (tried: {})",
                file_locations.join(", ")
            )));
        };

        let builder = Config::builder()
            .add_source(config::File::new(&config_filename, config::FileFormat::Json))
            .add_source(config::Environment::with_prefix("I3X").separator("__"));

        let config = builder.build()?;
        let config_file: ConfigFile = config.try_deserialize().map_err(BridgeError::from)?;
        tracing::info!(path = %config_filename, "loaded configuration");
        Ok(config_file)
    }

    pub fn try_as_cowcell(config_path: Option<&str>) -> Result<CowCell<ConfigFile>, BridgeError> {
        Ok(CowCell::new(ConfigFile::try_from(config_path)?))
    }
}
