//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::path::Path;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config = Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config.validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Parse a TOML document; omitted sections and keys take their defaults
    pub fn parse(content: &str) -> Result<Config> {
        Ok(toml::from_str(content)?)
    }

    /// Load the effective configuration: `WSRELAY_*` variables over the
    /// defaults, then every key present in the file at `path` on top
    pub fn load(path: &Path) -> Result<Config> {
        let mut base = Config::default();
        Self::apply_env(&mut base)?;

        if !path.exists() {
            tracing::warn!("Configuration file not found at {}, using environment and defaults", path.display());
            base.validate()?;
            return Ok(base);
        }

        tracing::info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::parse_over(&content, &base)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()
            .with_context(|| "Configuration validation failed")?;
        Ok(config)
    }

    /// Parse a TOML document whose keys replace the matching ones in `base`
    pub fn parse_over(content: &str, base: &Config) -> Result<Config> {
        let overlay: toml::Table = toml::from_str(content)?;
        let mut merged = toml::Value::try_from(base)?;
        if let toml::Value::Table(table) = &mut merged {
            merge_tables(table, overlay);
        }
        Ok(merged.try_into::<Config>()?)
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();
        Self::apply_env(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(config: &mut Config) -> Result<()> {
        if let Ok(addr) = std::env::var("WSRELAY_LISTEN_ADDR") {
            config.server.listen_addr = addr.parse::<SocketAddr>()
                .with_context(|| format!("Invalid WSRELAY_LISTEN_ADDR: {}", addr))?;
        }

        if let Ok(module_id) = std::env::var("WSRELAY_MODULE_ID") {
            config.server.module_id = module_id.parse::<i64>()
                .with_context(|| format!("Invalid WSRELAY_MODULE_ID: {}", module_id))?;
        }

        if let Ok(max_sessions) = std::env::var("WSRELAY_MAX_SESSIONS") {
            config.gateway.max_sessions = max_sessions.parse::<usize>()
                .with_context(|| format!("Invalid WSRELAY_MAX_SESSIONS: {}", max_sessions))?;
        }

        if let Ok(timeout) = std::env::var("WSRELAY_CONNECT_TIMEOUT") {
            config.gateway.connect_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid WSRELAY_CONNECT_TIMEOUT: {}", timeout))?;
        }

        if let Ok(capacity) = std::env::var("WSRELAY_QUEUE_CAPACITY") {
            config.relay.queue_capacity = capacity.parse::<usize>()
                .with_context(|| format!("Invalid WSRELAY_QUEUE_CAPACITY: {}", capacity))?;
        }

        if let Ok(log_level) = std::env::var("WSRELAY_LOG_LEVEL") {
            config.monitoring.log_level = log_level;
        }

        Ok(())
    }
}

/// Recursively copy `overlay` into `base`; nested tables merge key by key
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;

        self.validate_gateway_config()
            .with_context(|| "Gateway configuration validation failed")?;

        self.validate_relay_config()
            .with_context(|| "Relay configuration validation failed")?;

        self.validate_monitoring_config()
            .with_context(|| "Monitoring configuration validation failed")?;

        Ok(())
    }

    fn validate_server_config(&self) -> Result<()> {
        if self.server.shutdown_timeout.is_zero() {
            bail!("shutdown_timeout must be greater than 0");
        }

        Ok(())
    }

    fn validate_gateway_config(&self) -> Result<()> {
        if !self.gateway.path.starts_with('/') {
            bail!("gateway.path must start with '/'");
        }

        if self.gateway.max_sessions == 0 {
            bail!("max_sessions must be greater than 0");
        }

        if self.gateway.max_sessions > 100000 {
            bail!("max_sessions cannot exceed 100,000");
        }

        if self.gateway.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }

        if self.gateway.connect_timeout.as_secs() > 300 {
            bail!("connect_timeout cannot exceed 5 minutes");
        }

        if self.gateway.max_message_size == 0 {
            bail!("max_message_size must be greater than 0");
        }

        for (i, origin) in self.gateway.allowed_origins.iter().enumerate() {
            if origin.trim().is_empty() {
                bail!("Allowed origin {} is empty", i);
            }
        }

        Ok(())
    }

    fn validate_relay_config(&self) -> Result<()> {
        if self.relay.queue_capacity == 0 {
            bail!("queue_capacity must be greater than 0");
        }

        if self.relay.read_buffer_size < 1024 {
            bail!("read_buffer_size must be at least 1024 bytes");
        }

        if self.relay.read_buffer_size > 1048576 {
            bail!("read_buffer_size cannot exceed 1MB");
        }

        if self.relay.close_timeout.is_zero() {
            bail!("close_timeout must be greater than 0");
        }

        Ok(())
    }

    fn validate_monitoring_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.monitoring.log_level.as_str()) {
            bail!("monitoring.log_level must be one of: {}", valid_log_levels.join(", "));
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(&mut self, addr: Option<&str>, module_id: Option<i64>) -> Result<()> {
        if let Some(addr) = addr {
            self.server.listen_addr = addr.parse::<SocketAddr>()
                .with_context(|| format!("Invalid listen address: {}", addr))?;
            tracing::info!("CLI override: listen address set to {}", self.server.listen_addr);
        }

        if let Some(module_id) = module_id {
            self.server.module_id = module_id;
            tracing::info!("CLI override: module id set to {}", module_id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MessageKind;
    use std::time::Duration;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.relay.queue_capacity, 1024);
        assert_eq!(config.gateway.path, "/ws");
        assert_eq!(config.gateway.message_kind, MessageKind::Text);
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = ConfigManager::parse(
            r#"
            [server]
            listen_addr = "0.0.0.0:9000"
            module_id = 7

            [gateway]
            connect_timeout = "3s"
            message_kind = "binary"
            allowed_origins = ["https://app.example.com"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.listen_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.server.module_id, 7);
        assert_eq!(config.gateway.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.gateway.message_kind, MessageKind::Binary);
        assert_eq!(config.gateway.allowed_origins, vec!["https://app.example.com"]);
        assert_eq!(config.gateway.max_sessions, 1000);
        assert_eq!(config.relay.read_buffer_size, 8192);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.relay.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.relay.read_buffer_size = 16;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.gateway.max_sessions = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.gateway.path = "ws".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitoring.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_keys_override_environment_base() {
        let mut base = Config::default();
        base.gateway.max_sessions = 5;
        base.server.module_id = 9;
        base.monitoring.log_level = "debug".to_string();

        let config = ConfigManager::parse_over(
            r#"
            [server]
            module_id = 12

            [relay]
            close_timeout = "2s"
            "#,
            &base,
        )
        .unwrap();

        assert_eq!(config.server.module_id, 12);
        assert_eq!(config.relay.close_timeout, Duration::from_secs(2));
        assert_eq!(config.gateway.max_sessions, 5);
        assert_eq!(config.monitoring.log_level, "debug");
        assert_eq!(config.relay.queue_capacity, 1024);
    }

    #[test]
    fn test_unknown_message_kind_is_a_parse_error() {
        let result = ConfigManager::parse("[gateway]\nmessage_kind = \"json\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();
        config.merge_with_cli_args(Some("127.0.0.1:1234"), Some(42)).unwrap();
        assert_eq!(config.server.listen_addr.port(), 1234);
        assert_eq!(config.server.module_id, 42);

        assert!(config.merge_with_cli_args(Some("not an address"), None).is_err());
    }
}
