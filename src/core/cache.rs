//! Endpoint cache: "last one that worked" semantics over a key-value store.
//!
//! Entries carry no timestamps. The last working backend is overwritten by
//! every successful verification and discarded as soon as a re-check fails.
//! Storage failures and malformed entries are indistinguishable from a miss.
use std::sync::Arc;

use crate::{
    core::address::{BackendAddress, CandidateSet, VerifiedEndpoint},
    ports::key_value_store::KeyValueStore,
};

pub const LAST_WORKING_BACKEND_KEY: &str = "homing.last_working_backend";
pub const DETECTED_ADDRESSES_KEY: &str = "homing.detected_addresses";

pub struct EndpointCache {
    store: Arc<dyn KeyValueStore>,
}

impl EndpointCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The underlying store, shared with the user override
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Last verified backend, if a well-formed one is stored
    pub fn read(&self) -> Option<BackendAddress> {
        let raw = self.get(LAST_WORKING_BACKEND_KEY)?;
        match BackendAddress::new(&raw) {
            Ok(address) => Some(address),
            Err(e) => {
                tracing::debug!("Ignoring malformed cached backend '{}': {}", raw, e);
                None
            }
        }
    }

    /// Replace the cached backend; unreachable endpoints are never cached
    pub fn write(&self, endpoint: &VerifiedEndpoint) {
        if !endpoint.reachable {
            tracing::debug!(
                "Not caching unreachable endpoint {}",
                endpoint.address
            );
            return;
        }
        self.set(LAST_WORKING_BACKEND_KEY, endpoint.address.as_str());
    }

    /// Drop the cached backend after it failed re-verification
    pub fn discard(&self) {
        self.delete(LAST_WORKING_BACKEND_KEY);
    }

    /// Remove every record this cache owns
    pub fn clear(&self) {
        self.delete(LAST_WORKING_BACKEND_KEY);
        self.delete(DETECTED_ADDRESSES_KEY);
    }

    /// Hosts detected by earlier probing passes
    pub fn read_detected(&self) -> Vec<String> {
        let Some(raw) = self.get(DETECTED_ADDRESSES_KEY) else {
            return Vec::new();
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(hosts) => hosts,
            Err(e) => {
                tracing::debug!("Ignoring malformed detected address list: {}", e);
                Vec::new()
            }
        }
    }

    /// Record the hosts found by network probing in this pass
    pub fn write_detected(&self, candidates: &CandidateSet) {
        let hosts = candidates.detected_hosts();
        if hosts.is_empty() {
            return;
        }
        match serde_json::to_string(&hosts) {
            Ok(json) => self.set(DETECTED_ADDRESSES_KEY, &json),
            Err(e) => tracing::warn!("Failed to encode detected address list: {}", e),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Endpoint cache read of '{}' failed: {}", key, e);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            tracing::warn!("Endpoint cache write of '{}' failed: {}", key, e);
        }
    }

    fn delete(&self, key: &str) {
        if let Err(e) = self.store.delete(key) {
            tracing::warn!("Endpoint cache delete of '{}' failed: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::MemoryKeyValueStore,
        core::address::{CandidateAddress, ProbeTechnique},
        ports::key_value_store::{StoreError, StoreResult},
    };

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> StoreResult<Option<String>> {
            Err(StoreError::Corrupt("quota exceeded".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> StoreResult<()> {
            Err(StoreError::Corrupt("quota exceeded".to_string()))
        }

        fn delete(&self, _key: &str) -> StoreResult<()> {
            Err(StoreError::Poisoned)
        }
    }

    fn address(s: &str) -> BackendAddress {
        BackendAddress::new(s).unwrap()
    }

    #[test]
    fn test_write_read_last_write_wins() {
        let cache = EndpointCache::new(Arc::new(MemoryKeyValueStore::new()));
        assert_eq!(cache.read(), None);

        cache.write(&VerifiedEndpoint::reachable(address("http://192.168.1.20:8001")));
        cache.write(&VerifiedEndpoint::reachable(address("http://192.168.1.30:8001")));
        assert_eq!(cache.read(), Some(address("http://192.168.1.30:8001")));

        cache.write(&VerifiedEndpoint::unreachable(address("http://192.168.1.40:8001")));
        assert_eq!(cache.read(), Some(address("http://192.168.1.30:8001")));

        cache.discard();
        assert_eq!(cache.read(), None);
    }

    #[test]
    fn test_malformed_entries_are_misses() {
        let store = Arc::new(MemoryKeyValueStore::with_entries([
            (LAST_WORKING_BACKEND_KEY, "garbage"),
            (DETECTED_ADDRESSES_KEY, "{\"not\": \"a list\"}"),
        ]));
        let cache = EndpointCache::new(store);
        assert_eq!(cache.read(), None);
        assert!(cache.read_detected().is_empty());
    }

    #[test]
    fn test_detected_list_roundtrip_and_clear() {
        let cache = EndpointCache::new(Arc::new(MemoryKeyValueStore::new()));
        let mut candidates = CandidateSet::new();
        candidates.insert(CandidateAddress::new("192.168.1.30", ProbeTechnique::LocalNetwork));
        candidates.insert(CandidateAddress::new("192.168.1.1", ProbeTechnique::CommonRange));
        cache.write_detected(&candidates);
        cache.write(&VerifiedEndpoint::reachable(address("http://192.168.1.30:8001")));

        assert_eq!(cache.read_detected(), vec!["192.168.1.30"]);

        cache.clear();
        assert_eq!(cache.read(), None);
        assert!(cache.read_detected().is_empty());
    }

    #[test]
    fn test_storage_failures_are_swallowed() {
        let cache = EndpointCache::new(Arc::new(FailingStore));
        cache.write(&VerifiedEndpoint::reachable(address("http://192.168.1.30:8001")));
        cache.clear();
        assert_eq!(cache.read(), None);
        assert!(cache.read_detected().is_empty());
    }
}
