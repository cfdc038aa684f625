//! Application Settings
//!
//! Layered configuration for the three process roles (locator, server, browser).
//!
//! Sources, later ones overriding earlier ones:
//! 1. `region-grid.yaml` in the current directory (optional)
//! 2. The file passed with `--config` (required when given)
//! 3. The file named by `REGION_GRID_CONFIG` (required when set)
//! 4. Environment variables prefixed with `GRID__`, nested with `__`
//!    (e.g. `GRID__SERVER__LOCATOR_PORT=10334`)

use serde::Deserialize;
use std::time::Duration;

use crate::error::GridError;
use crate::lifecycle::types::LocatorAddress;

pub const DEFAULT_CONFIG_FILE: &str = "region-grid";
pub const CONFIG_ENV_VAR: &str = "REGION_GRID_CONFIG";
pub const CONFIG_ENV_PREFIX: &str = "GRID";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub http: HttpSettings,
    pub workdir: WorkdirSettings,
    pub locator: LocatorSettings,
    pub server: ServerSettings,
    pub browser: BrowserSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is not set.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

pub const SERVER_HTTP_PORT: u16 = 8080;
pub const BROWSER_HTTP_PORT: u16 = 8081;

/// Address the REST surface binds to. Without an explicit port each role
/// uses its own default, so a server and a browser can share a host.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub host: String,
    pub port: Option<u16>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: None,
        }
    }
}

impl HttpSettings {
    pub fn bind_addr(&self, role_default: u16) -> String {
        format!("{}:{}", self.host, self.port.unwrap_or(role_default))
    }
}

/// Project-root discovery used for relative working directories.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkdirSettings {
    pub marker: String,
    pub max_depth: usize,
}

impl Default for WorkdirSettings {
    fn default() -> Self {
        Self {
            marker: "target".to_string(),
            max_depth: 32,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocatorSettings {
    pub enabled: bool,
    pub member_name: String,
    pub working_dir: String,
    pub host: String,
    pub port: u16,
}

impl Default for LocatorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            member_name: "locator".to_string(),
            working_dir: "target/locator".to_string(),
            host: "127.0.0.1".to_string(),
            port: 10334,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub enabled: bool,
    pub member_name: String,
    pub working_dir: String,
    pub host: String,
    /// Membership port; 0 lets the engine pick one.
    pub port: u16,
    pub locator_host: String,
    pub locator_port: u16,
    pub readiness: ReadinessSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            member_name: "data-server".to_string(),
            working_dir: "target/data-server".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            locator_host: "127.0.0.1".to_string(),
            locator_port: 10334,
            readiness: ReadinessSettings::default(),
        }
    }
}

impl ServerSettings {
    pub fn locator(&self) -> LocatorAddress {
        LocatorAddress::new(&self.locator_host, self.locator_port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadinessSettings {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval_ms: 500,
        }
    }
}

impl ReadinessSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub member_name: String,
    pub locator_host: String,
    pub locator_port: u16,
    /// Base URL of the server member's management API. Also used for data
    /// traffic when locator discovery finds no server.
    pub data_server_url: String,
    pub settle_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub discovery_timeout_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            member_name: "data-browser".to_string(),
            locator_host: "127.0.0.1".to_string(),
            locator_port: 10334,
            data_server_url: "http://127.0.0.1:8080".to_string(),
            settle_delay_ms: 500,
            request_timeout_ms: 2_000,
            discovery_timeout_ms: 1_000,
        }
    }
}

impl BrowserSettings {
    pub fn locator(&self) -> LocatorAddress {
        LocatorAddress::new(&self.locator_host, self.locator_port)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}

impl Settings {
    pub fn load(path: Option<&str>) -> Result<Self, GridError> {
        use ::config::{Config, Environment, File, FileFormat};

        let mut builder = Config::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Settings>())
            .map_err(|e| GridError::Configuration(e.to_string()))?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = Settings::default();

        assert_eq!(settings.server.readiness.max_attempts, 20);
        assert_eq!(settings.server.readiness.interval(), Duration::from_millis(500));
        assert_eq!(settings.browser.settle_delay(), Duration::from_millis(500));
        assert_eq!(settings.server.port, 0);
        assert_eq!(settings.locator.port, 10334);
        assert_eq!(settings.workdir.marker, "target");
        assert_eq!(settings.server.locator().to_string(), "127.0.0.1[10334]");
    }

    #[test]
    fn test_server_and_browser_default_to_different_ports() {
        let http = HttpSettings::default();

        assert_eq!(http.bind_addr(SERVER_HTTP_PORT), "127.0.0.1:8080");
        assert_eq!(http.bind_addr(BROWSER_HTTP_PORT), "127.0.0.1:8081");
        // the browser's default data server is the server's default port
        assert!(
            BrowserSettings::default()
                .data_server_url
                .ends_with(&format!(":{}", SERVER_HTTP_PORT))
        );

        let pinned = HttpSettings {
            port: Some(9000),
            ..HttpSettings::default()
        };
        assert_eq!(pinned.bind_addr(BROWSER_HTTP_PORT), "127.0.0.1:9000");
    }

    #[test]
    fn test_load_from_yaml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("temp file");
        writeln!(
            file,
            "server:\n  member_name: server-7\n  locator_port: 4040\n  readiness:\n    max_attempts: 3\nbrowser:\n  settle_delay_ms: 10\n"
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let settings = Settings::load(Some(&path)).expect("settings should load");

        assert_eq!(settings.server.member_name, "server-7");
        assert_eq!(settings.server.locator_port, 4040);
        assert_eq!(settings.server.readiness.max_attempts, 3);
        // untouched sections keep their defaults
        assert_eq!(settings.server.readiness.interval_ms, 500);
        assert_eq!(settings.browser.settle_delay_ms, 10);
        assert_eq!(settings.locator.member_name, "locator");
    }

    #[test]
    fn test_missing_explicit_file_is_a_configuration_error() {
        let err = Settings::load(Some("/definitely/not/here/grid.yaml")).unwrap_err();
        assert!(matches!(err, GridError::Configuration(_)));
    }
}
