//! Configuration for the reconciliation engine.
//!
//! Each module's settings carry an `enabled` flag under a
//! `PROXYM_<MODULE>_ENABLED` environment contract: when a module is not
//! enabled, `assembly::build` skips constructing and registering it. A
//! config file (TOML) is optional; a handful of commonly-overridden fields
//! can also be set from the environment, falling back to defaults and
//! writing them back to disk.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub web: WebConfig,
    pub orchestrator: OrchestratorConfig,
    pub file: FileConfig,
    pub annotation: AnnotationConfig,
    pub leader: LeaderConfig,
    pub signal: SignalConfig,
    pub proxy_sink: ProxySinkConfig,
    pub routing_sink: RoutingSinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9090,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrchestratorConfig {
    pub enabled: bool,
    /// Candidate servers; one is chosen uniformly at random per request.
    pub servers: Vec<String>,
    /// Base URL this process is reachable on, used to register the event callback.
    pub callback_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    pub enabled: bool,
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnnotationConfig {
    pub enabled: bool,
    /// Root path the annotation API's parent nodes live under.
    pub base_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderConfig {
    pub enabled: bool,
    pub servers: Vec<String>,
    pub poll_interval_secs: u64,
    /// Domain published on the synthesized "leader" Service.
    pub domain: String,
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            servers: Vec::new(),
            poll_interval_secs: 10,
            domain: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SignalConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProxySinkConfig {
    pub enabled: bool,
    pub template_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub check_command: Option<String>,
    pub reload_command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoutingSinkConfig {
    pub enabled: bool,
}

impl Config {
    /// Load configuration from an optional TOML file (`PROXYM_CONFIG_FILE`,
    /// default `proxym.toml`), falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("PROXYM_CONFIG_FILE").unwrap_or_else(|_| "proxym.toml".to_string());

        let mut config = if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(&config_file)?;
            toml::from_str(&contents)
                .map_err(|e| Error::configuration(format!("{config_file}: {e}")))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `PROXYM_<MODULE>_ENABLED` and a handful of commonly-overridden
    /// settings from the environment.
    fn apply_env_overrides(&mut self) {
        set_bool_from_env("PROXYM_MARATHON_ENABLED", &mut self.orchestrator.enabled);
        set_bool_from_env("PROXYM_FILE_ENABLED", &mut self.file.enabled);
        set_bool_from_env("PROXYM_ANNOTATION_ENABLED", &mut self.annotation.enabled);
        set_bool_from_env("PROXYM_MESOS_MASTER_ENABLED", &mut self.leader.enabled);
        set_bool_from_env("PROXYM_SIGNAL_ENABLED", &mut self.signal.enabled);
        set_bool_from_env("PROXYM_HAPROXY_ENABLED", &mut self.proxy_sink.enabled);
        set_bool_from_env("PROXYM_HIPACHE_ENABLED", &mut self.routing_sink.enabled);

        if let Ok(v) = std::env::var("PROXYM_WEB_HOST") {
            self.web.host = v;
        }
        if let Ok(v) = std::env::var("PROXYM_WEB_PORT") {
            if let Ok(port) = v.parse() {
                self.web.port = port;
            }
        }
        if let Ok(v) = std::env::var("PROXYM_MARATHON_SERVERS") {
            self.orchestrator.servers = split_csv(&v);
        }
        if let Ok(v) = std::env::var("PROXYM_FILE_DIRECTORY") {
            self.file.directory = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("PROXYM_MESOS_MASTER_SERVERS") {
            self.leader.servers = split_csv(&v);
        }
        if let Ok(v) = std::env::var("PROXYM_MESOS_MASTER_DOMAIN") {
            self.leader.domain = v;
        }
    }
}

fn set_bool_from_env(key: &str, slot: &mut bool) {
    if let Ok(v) = std::env::var(key) {
        *slot = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_everything_disabled() {
        let config = Config::default();
        assert!(!config.orchestrator.enabled);
        assert!(!config.file.enabled);
        assert!(!config.annotation.enabled);
        assert!(!config.leader.enabled);
    }

    #[test]
    fn split_csv_trims_and_drops_empties() {
        assert_eq!(
            split_csv(" a.example , b.example,,c.example "),
            vec!["a.example", "b.example", "c.example"]
        );
    }
}
