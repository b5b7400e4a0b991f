//! Static configuration layer.
//!
//! Pure and synchronous: no I/O, no errors. Inputs are ranked, first hit wins:
//! 1. a full address supplied by the user or operator at runtime,
//! 2. a full address from deployment configuration,
//! 3. host/port/protocol parts from deployment configuration.
use crate::{config::ResolverConfig, core::address::BackendAddress};

/// Key under which the user-supplied override is persisted
pub const USER_OVERRIDE_KEY: &str = "homing.backend_override";

/// The ranked override inputs of one resolution pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticOverrides {
    pub user_address: Option<String>,
    pub configured_address: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<String>,
    pub default_protocol: String,
    pub default_port: u16,
}

impl StaticOverrides {
    /// Collect the deployment inputs from configuration plus the user override
    pub fn from_config(config: &ResolverConfig, user_address: Option<String>) -> Self {
        Self {
            user_address,
            configured_address: config.backend.url.clone(),
            host: config.backend.host.clone(),
            port: config.backend.port,
            protocol: config.backend.protocol.clone(),
            default_protocol: config.default_protocol.clone(),
            default_port: config.default_port,
        }
    }

    /// First valid override in rank order, if any
    pub fn resolve_override(&self) -> Option<BackendAddress> {
        Self::full_address(self.user_address.as_deref(), "user override")
            .or_else(|| Self::full_address(self.configured_address.as_deref(), "backend.url"))
            .or_else(|| self.assembled_address())
    }

    fn full_address(value: Option<&str>, label: &str) -> Option<BackendAddress> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        match BackendAddress::new(value) {
            Ok(address) => Some(address),
            Err(e) => {
                tracing::debug!("Ignoring {} '{}': {}", label, value, e);
                None
            }
        }
    }

    fn assembled_address(&self) -> Option<BackendAddress> {
        let host = self.host.as_deref().map(str::trim).filter(|h| !h.is_empty())?;
        let protocol = self
            .protocol
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(&self.default_protocol);
        let port = self.port.unwrap_or(self.default_port);

        match BackendAddress::from_parts(protocol, host, port) {
            Ok(address) => Some(address),
            Err(e) => {
                tracing::debug!("Ignoring backend host/port/protocol override: {}", e);
                None
            }
        }
    }
}
