pub mod file_store;
pub mod http_client;
#[cfg(feature = "interfaces")]
pub mod interface_probe;
pub mod memory_store;
pub mod noop_probe;
pub mod stun_probe;

use std::sync::Arc;

use eyre::{Result, WrapErr};

/// Re-export commonly used types from adapters
pub use file_store::FileKeyValueStore;
pub use http_client::HttpClientAdapter;
#[cfg(feature = "interfaces")]
pub use interface_probe::InterfaceLocalAddressProbe;
pub use memory_store::MemoryKeyValueStore;
pub use noop_probe::NoopLocalAddressProbe;
pub use stun_probe::StunLocalAddressProbe;

use crate::{
    config::{LocalProbeKind, ProbeConfig, StorageConfig},
    ports::{key_value_store::KeyValueStore, local_address_probe::LocalAddressProbe},
};

/// Construct the local address probe selected by configuration
pub fn build_local_probe(config: &ProbeConfig) -> Arc<dyn LocalAddressProbe> {
    match config.local_probe {
        LocalProbeKind::Stun => Arc::new(StunLocalAddressProbe::new(config.stun_servers.clone())),
        #[cfg(feature = "interfaces")]
        LocalProbeKind::Interfaces => Arc::new(InterfaceLocalAddressProbe::new()),
        #[cfg(not(feature = "interfaces"))]
        LocalProbeKind::Interfaces => {
            tracing::warn!(
                "Interface probing requested but the 'interfaces' feature is disabled; local probing is off"
            );
            Arc::new(NoopLocalAddressProbe::new())
        }
        LocalProbeKind::None => Arc::new(NoopLocalAddressProbe::new()),
    }
}

/// Construct the key-value store selected by configuration
pub fn build_store(config: &StorageConfig) -> Result<Arc<dyn KeyValueStore>> {
    match &config.path {
        Some(path) => {
            let store = FileKeyValueStore::open(path)
                .wrap_err_with(|| format!("Failed to open key-value store at {path}"))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryKeyValueStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_local_probe_by_kind() {
        let mut config = ProbeConfig::default();
        assert_eq!(build_local_probe(&config).name(), "stun");

        config.local_probe = LocalProbeKind::None;
        assert_eq!(build_local_probe(&config).name(), "none");
    }

    #[test]
    fn test_build_store_defaults_to_memory() {
        let store = build_store(&StorageConfig::default()).unwrap();
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
