use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub const DEFAULT_PORT: u16 = 1337;
pub const DEFAULT_CDP_URL: &str = "http://127.0.0.1:9222";

/// Wright relay configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Relay bind address
    pub bind_address: String,
    /// Relay port
    pub port: u16,
    /// DevTools endpoint of the browser to drive
    pub cdp_url: String,
    /// Directory for rotated JSON logs; console only when unset
    pub log_dir: Option<PathBuf>,
    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            cdp_url: DEFAULT_CDP_URL.to_string(),
            log_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind_address: get("WRIGHT_BIND").unwrap_or(defaults.bind_address),
            port: get("WRIGHT_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            cdp_url: get("WRIGHT_CDP_URL").unwrap_or(defaults.cdp_url),
            log_dir: get("WRIGHT_LOG_DIR").map(PathBuf::from),
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.bind_address, self.port);
        addr.parse()
            .with_context(|| format!("invalid bind address {addr}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.port, 1337);
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:1337");
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("WRIGHT_BIND", "127.0.0.1"),
            ("WRIGHT_PORT", "9000"),
            ("WRIGHT_CDP_URL", "ws://127.0.0.1:9222/devtools/browser/abc"),
            ("WRIGHT_LOG_DIR", "/var/log/wright"),
            ("RUST_LOG", "debug"),
        ]));
        assert_eq!(config.socket_addr().unwrap().port(), 9000);
        assert_eq!(config.cdp_url, "ws://127.0.0.1:9222/devtools/browser/abc");
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/wright")));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_bad_port_falls_back_and_bad_bind_errors() {
        let config = Config::from_lookup(lookup(&[
            ("WRIGHT_PORT", "not-a-port"),
            ("WRIGHT_BIND", "no such host"),
        ]));
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.socket_addr().is_err());
    }
}
