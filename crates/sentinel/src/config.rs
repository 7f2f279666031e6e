//! Configuration loading and validation for the sentinel monitor

use prober::ProbeConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};
use vip::ResolverConfig;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found in search paths")]
    FileNotFound,

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub nodes: NodesSettings,

    pub vip: IpAddr,

    #[serde(default)]
    pub monitor: MonitorSettings,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub notifications: NotifierSettings,

    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.nodes.primary.validate()?;
        self.nodes.secondary.validate()?;
        self.monitor.validate()?;
        self.storage.validate()?;
        self.notifications.validate()?;
        self.logging.validate()?;

        let mut errors = ValidationErrors::new();

        if self.nodes.primary.address == self.nodes.secondary.address {
            errors.add("nodes", ValidationError::new("nodes_share_address"));
        }
        if self.vip == self.nodes.primary.address || self.vip == self.nodes.secondary.address {
            errors.add("vip", ValidationError::new("vip_is_node_address"));
        }
        if let Err(e) = validate_probe(&self.probe) {
            errors.add("probe", e);
        }
        if self.resolver.validate().is_err() {
            errors.add("resolver", ValidationError::new("resolver_invalid"));
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// The monitored node pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodesSettings {
    pub primary: NodeSettings,
    pub secondary: NodeSettings,
}

impl NodesSettings {
    pub fn primary_name(&self) -> &str {
        self.primary.name.as_deref().unwrap_or("Primary")
    }

    pub fn secondary_name(&self) -> &str {
        self.secondary.name.as_deref().unwrap_or("Secondary")
    }
}

/// One node's address and management credential
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct NodeSettings {
    pub address: IpAddr,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    #[validate(length(min = 1))]
    pub password: String,
}

impl fmt::Debug for NodeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSettings")
            .field("address", &self.address)
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Monitor loop settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MonitorSettings {
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_interval")]
    pub interval: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_retention")]
    pub retention: Duration,
}

/// History storage settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StorageSettings {
    #[validate(length(min = 1), custom = "validate_database_url")]
    pub database: String,
}

/// Notification dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct NotifierSettings {
    #[validate(length(min = 1))]
    pub settings_path: String,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_channel_timeout")]
    pub channel_timeout: Duration,
}

/// Reporting API settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub listen: SocketAddr,
    pub api_key: Option<String>,
}

impl fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSettings")
            .field("listen", &self.listen)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct LoggingSettings {
    pub level: Option<String>,

    #[validate(custom = "validate_log_format")]
    pub format: Option<String>,
}

impl LoggingSettings {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or("info")
    }

    pub fn is_json(&self) -> bool {
        self.format.as_deref() == Some("json")
    }
}

/// OpenTelemetry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    pub service_name: String,
    pub otlp_endpoint: String,
}

// Default implementations

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            retention: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database: "sqlite:///opt/sentinel/monitor.db".to_string(),
        }
    }
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            settings_path: "/opt/sentinel/notify_settings.json".to_string(),
            channel_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            api_key: None,
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "sentinel".to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
        }
    }
}

// Custom validators

fn validate_interval(interval: &Duration) -> Result<(), ValidationError> {
    let secs = interval.as_secs();
    if !(1..=3600).contains(&secs) {
        return Err(ValidationError::new("interval_out_of_range"));
    }
    Ok(())
}

fn validate_retention(retention: &Duration) -> Result<(), ValidationError> {
    if retention.as_secs() < 3600 {
        return Err(ValidationError::new("retention_too_short"));
    }
    Ok(())
}

fn validate_database_url(url: &str) -> Result<(), ValidationError> {
    if !url.trim().starts_with("sqlite:") {
        return Err(ValidationError::new("database_not_sqlite"));
    }
    Ok(())
}

fn validate_channel_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let millis = timeout.as_millis();
    if !(100..=60_000).contains(&millis) {
        return Err(ValidationError::new("channel_timeout_out_of_range"));
    }
    Ok(())
}

fn validate_log_format(format: &str) -> Result<(), ValidationError> {
    match format {
        "text" | "json" => Ok(()),
        _ => Err(ValidationError::new("log_format_invalid")),
    }
}

fn validate_probe(probe: &ProbeConfig) -> Result<(), ValidationError> {
    if probe.web_port == 0 || probe.dns_port == 0 {
        return Err(ValidationError::new("port_invalid"));
    }
    let timeouts = [
        probe.connect_timeout,
        probe.api_timeout,
        probe.logout_timeout,
        probe.dns_timeout,
    ];
    if timeouts.iter().any(|t| t.is_zero() || t.as_secs() > 30) {
        return Err(ValidationError::new("probe_timeout_out_of_range"));
    }
    if probe.dns_query.trim().is_empty() {
        return Err(ValidationError::new("dns_query_empty"));
    }
    Ok(())
}

// Configuration loading implementation

impl Config {
    /// Load configuration from `explicit` or the default search paths
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Self::find_config_file().ok_or(ConfigError::FileNotFound)?,
        };
        tracing::info!("Loading configuration from: {}", path.display());
        Self::load_from_file(&path)
    }

    /// Load configuration from a specific file, applying environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&contents, |key| std::env::var(key).ok())
    }

    /// Parse YAML, apply overrides from `lookup`, then validate
    pub fn parse(contents: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(contents)?;
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Secrets from the environment take precedence over the file
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(password) = lookup("PRIMARY_PASSWORD") {
            self.nodes.primary.password = password;
        }
        if let Some(password) = lookup("SECONDARY_PASSWORD") {
            self.nodes.secondary.password = password;
        }
        if let Some(key) = lookup("API_KEY") {
            self.api.api_key = Some(key);
        }
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/sentinel/sentinel.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./sentinel.yaml"));

        paths.into_iter().find(|p| p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/sentinel/sentinel.yaml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"
nodes:
  primary:
    address: 10.10.100.10
    password: primary-secret
  secondary:
    address: 10.10.100.20
    password: secondary-secret
vip: 10.10.100.2
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config = Config::parse(MINIMAL, no_env).unwrap();

        assert_eq!(config.nodes.primary_name(), "Primary");
        assert_eq!(config.nodes.secondary_name(), "Secondary");
        assert_eq!(config.monitor.interval, Duration::from_secs(10));
        assert_eq!(config.monitor.retention, Duration::from_secs(30 * 86400));
        assert_eq!(config.probe.web_port, 80);
        assert_eq!(config.probe.dns_query, "google.com");
        assert_eq!(config.resolver.max_retries, 3);
        assert_eq!(config.resolver.settle_delay, Duration::from_millis(200));
        assert_eq!(config.storage.database, "sqlite:///opt/sentinel/monitor.db");
        assert_eq!(config.notifications.channel_timeout, Duration::from_secs(5));
        assert_eq!(config.api.listen.to_string(), "127.0.0.1:8080");
        assert!(config.api.api_key.is_none());
        assert!(!config.telemetry.enabled);
    }

    #[test]
    fn test_full_yaml_parsing() {
        let yaml = r#"
nodes:
  primary:
    address: 192.168.1.10
    name: pihole-a
    password: a
  secondary:
    address: 192.168.1.11
    name: pihole-b
    password: b
vip: 192.168.1.100

monitor:
  interval: 30s
  retention: 7days

probe:
  web_port: 8080
  api_timeout: 3s
  dns_query: example.org

resolver:
  max_retries: 5
  retry_backoff: 500ms

storage:
  database: "sqlite:///tmp/monitor.db"

api:
  listen: "0.0.0.0:9090"
  api_key: from-file

logging:
  level: debug
  format: json
"#;

        let config = Config::parse(yaml, no_env).unwrap();
        assert_eq!(config.nodes.primary_name(), "pihole-a");
        assert_eq!(config.monitor.interval, Duration::from_secs(30));
        assert_eq!(config.monitor.retention, Duration::from_secs(7 * 86400));
        assert_eq!(config.probe.web_port, 8080);
        assert_eq!(config.probe.api_timeout, Duration::from_secs(3));
        assert_eq!(config.probe.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.resolver.max_retries, 5);
        assert_eq!(config.resolver.retry_backoff, Duration::from_millis(500));
        assert_eq!(config.api.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.logging.level(), "debug");
        assert!(config.logging.is_json());
    }

    #[test]
    fn test_env_overrides_file_secrets() {
        let config = Config::parse(
            MINIMAL,
            env(&[
                ("PRIMARY_PASSWORD", "env-primary"),
                ("SECONDARY_PASSWORD", ""),
                ("API_KEY", "env-key"),
            ]),
        )
        .unwrap();

        assert_eq!(config.nodes.primary.password, "env-primary");
        assert_eq!(config.nodes.secondary.password, "secondary-secret");
        assert_eq!(config.api.api_key.as_deref(), Some("env-key"));
    }

    #[test]
    fn test_password_may_come_from_env_only() {
        let yaml = r#"
nodes:
  primary: {address: 10.0.0.1}
  secondary: {address: 10.0.0.2}
vip: 10.0.0.3
"#;

        assert!(matches!(
            Config::parse(yaml, no_env),
            Err(ConfigError::ValidationError(_))
        ));

        let config = Config::parse(
            yaml,
            env(&[("PRIMARY_PASSWORD", "p"), ("SECONDARY_PASSWORD", "s")]),
        )
        .unwrap();
        assert_eq!(config.nodes.secondary.password, "s");
    }

    #[test]
    fn test_missing_nodes_is_parse_error() {
        let result = Config::parse("vip: 10.0.0.3\n", no_env);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_invalid_interval() {
        for interval in ["500ms", "2h"] {
            let yaml = format!("{MINIMAL}\nmonitor:\n  interval: {interval}\n");
            assert!(Config::parse(&yaml, no_env).is_err(), "{interval}");
        }
    }

    #[test]
    fn test_vip_must_differ_from_nodes() {
        let yaml = MINIMAL.replace("vip: 10.10.100.2", "vip: 10.10.100.10");
        assert!(Config::parse(&yaml, no_env).is_err());
    }

    #[test]
    fn test_invalid_storage_and_logging() {
        let yaml = format!("{MINIMAL}\nstorage:\n  database: \"postgres://db\"\n");
        assert!(Config::parse(&yaml, no_env).is_err());

        let yaml = format!("{MINIMAL}\nlogging:\n  format: xml\n");
        assert!(Config::parse(&yaml, no_env).is_err());
    }

    #[test]
    fn test_invalid_probe_and_resolver() {
        let yaml = format!("{MINIMAL}\nprobe:\n  web_port: 0\n");
        assert!(Config::parse(&yaml, no_env).is_err());

        let yaml = format!("{MINIMAL}\nresolver:\n  max_retries: 0\n");
        assert!(Config::parse(&yaml, no_env).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::parse(MINIMAL, env(&[("API_KEY", "top-secret-key")])).unwrap();
        let debug = format!("{config:?}");

        assert!(!debug.contains("primary-secret"));
        assert!(!debug.contains("top-secret-key"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.yaml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.vip.to_string(), "10.10.100.2");

        let missing = Config::load(Some(dir.path().join("absent.yaml").as_path()));
        assert!(matches!(missing, Err(ConfigError::IoError(_))));
    }
}
