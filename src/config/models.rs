//! Configuration data structures for homing.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files and
//! to `HOMING_*` environment variables. Every section carries defaults so that
//! an empty configuration resolves against the conventional `8001` backend.
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Port the backend listens on unless told otherwise
pub const DEFAULT_BACKEND_PORT: u16 = 8001;
/// Address returned when every resolution technique fails
pub const DEFAULT_FALLBACK_ADDRESS: &str = "http://localhost:8001";
/// Public service answering with the caller's address
pub const DEFAULT_EXTERNAL_LOOKUP_URL: &str = "https://api.ipify.org?format=json";
/// Public STUN rendezvous used for local address probing
pub const DEFAULT_STUN_SERVER: &str = "stun.l.google.com:19302";

fn default_protocol() -> String {
    "http".to_string()
}

fn default_port() -> u16 {
    DEFAULT_BACKEND_PORT
}

fn default_fallback_address() -> String {
    DEFAULT_FALLBACK_ADDRESS.to_string()
}

/// Deployment-time backend overrides.
///
/// `url` wins over the parts; the parts are only used when `host` is set.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// Full backend address, e.g. `http://10.0.0.5:9000`
    pub url: Option<String>,
    /// Backend host to assemble an address from
    pub host: Option<String>,
    /// Backend port (defaults to `default_port`)
    pub port: Option<u16>,
    /// Backend protocol (defaults to `default_protocol`)
    pub protocol: Option<String>,
}

/// Health check applied to every candidate before it is accepted
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub path: String,
    pub timeout_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            timeout_ms: 3_000,
        }
    }
}

impl HealthCheckConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Which local address probe implementation to construct
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LocalProbeKind {
    /// UDP/STUN candidate gathering
    #[default]
    Stun,
    /// OS network interface enumeration
    Interfaces,
    /// No local probing
    None,
}

/// Candidate gathering configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ProbeConfig {
    pub local_probe: LocalProbeKind,
    pub local_probe_timeout_ms: u64,
    /// `host:port` STUN servers queried by the STUN probe
    pub stun_servers: Vec<String>,
    /// Set to `None` to disable the external lookup
    pub external_lookup_url: Option<String>,
    pub external_lookup_timeout_ms: u64,
    /// Conventional private-network hosts tried as a last resort
    pub common_candidates: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            local_probe: LocalProbeKind::default(),
            local_probe_timeout_ms: 3_000,
            stun_servers: vec![DEFAULT_STUN_SERVER.to_string()],
            external_lookup_url: Some(DEFAULT_EXTERNAL_LOOKUP_URL.to_string()),
            external_lookup_timeout_ms: 5_000,
            common_candidates: [
                "192.168.1.1",
                "192.168.1.100",
                "192.168.0.1",
                "192.168.0.100",
                "10.0.0.1",
                "10.0.0.100",
                "172.16.0.1",
                "172.16.0.100",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl ProbeConfig {
    pub fn local_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.local_probe_timeout_ms)
    }

    pub fn external_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.external_lookup_timeout_ms)
    }
}

/// Durable storage for the endpoint cache and the user override
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file backing the store; in-memory when absent
    pub path: Option<String>,
}

/// Log output settings used by the binary
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ResolverConfig {
    pub backend: BackendConfig,
    /// Host (or URL) the client was opened from
    pub origin: Option<String>,
    #[serde(default = "default_protocol")]
    pub default_protocol: String,
    #[serde(default = "default_port")]
    pub default_port: u16,
    #[serde(default = "default_fallback_address")]
    pub fallback_address: String,
    pub health_check: HealthCheckConfig,
    pub probe: ProbeConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub debug: bool,
}

impl ResolverConfig {
    /// Create a new resolver configuration builder
    pub fn builder() -> ResolverConfigBuilder {
        ResolverConfigBuilder::default()
    }

    /// Effective log filter, honouring the debug flag
    pub fn log_level(&self) -> &str {
        if self.debug { "debug" } else { &self.logging.level }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            origin: None,
            default_protocol: default_protocol(),
            default_port: default_port(),
            fallback_address: default_fallback_address(),
            health_check: HealthCheckConfig::default(),
            probe: ProbeConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            debug: false,
        }
    }
}

/// Builder for ResolverConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct ResolverConfigBuilder {
    config: ResolverConfig,
}

impl ResolverConfigBuilder {
    /// Set the full backend address override
    pub fn backend_url(mut self, url: impl Into<String>) -> Self {
        self.config.backend.url = Some(url.into());
        self
    }

    /// Set the backend host override
    pub fn backend_host(mut self, host: impl Into<String>) -> Self {
        self.config.backend.host = Some(host.into());
        self
    }

    /// Set the backend port override
    pub fn backend_port(mut self, port: u16) -> Self {
        self.config.backend.port = Some(port);
        self
    }

    /// Set the backend protocol override
    pub fn backend_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.config.backend.protocol = Some(protocol.into());
        self
    }

    /// Set the origin the client was opened from
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.config.origin = Some(origin.into());
        self
    }

    /// Set the default port applied to discovered hosts
    pub fn default_port(mut self, port: u16) -> Self {
        self.config.default_port = port;
        self
    }

    /// Set the address returned when nothing else works
    pub fn fallback_address(mut self, address: impl Into<String>) -> Self {
        self.config.fallback_address = address.into();
        self
    }

    /// Set health check configuration
    pub fn health_check(mut self, config: HealthCheckConfig) -> Self {
        self.config.health_check = config;
        self
    }

    /// Set probe configuration
    pub fn probe(mut self, config: ProbeConfig) -> Self {
        self.config.probe = config;
        self
    }

    /// Back the store with a JSON file
    pub fn storage_path(mut self, path: impl Into<String>) -> Self {
        self.config.storage.path = Some(path.into());
        self
    }

    /// Enable or disable debug logging
    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    /// Build the final ResolverConfig
    pub fn build(self) -> ResolverConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.default_port, 8001);
        assert_eq!(config.default_protocol, "http");
        assert_eq!(config.fallback_address, "http://localhost:8001");
        assert_eq!(config.health_check.path, "/health");
        assert_eq!(config.health_check.timeout(), Duration::from_secs(3));
        assert_eq!(config.probe.local_probe_timeout(), Duration::from_secs(3));
        assert_eq!(config.probe.external_lookup_timeout(), Duration::from_secs(5));
        assert_eq!(config.probe.common_candidates.len(), 8);
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: ResolverConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ResolverConfig::default());
    }

    #[test]
    fn test_builder() {
        let config = ResolverConfig::builder()
            .backend_host("10.0.0.5")
            .backend_port(9000)
            .origin("192.168.1.50")
            .debug(true)
            .build();
        assert_eq!(config.backend.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(config.backend.port, Some(9000));
        assert_eq!(config.origin.as_deref(), Some("192.168.1.50"));
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn test_local_probe_kind_serde() {
        let probe: ProbeConfig = serde_json::from_str(r#"{"local_probe": "interfaces"}"#).unwrap();
        assert_eq!(probe.local_probe, LocalProbeKind::Interfaces);
        assert_eq!(probe.stun_servers, vec![DEFAULT_STUN_SERVER.to_string()]);
    }
}
