pub mod http_client;
pub mod key_value_store;
pub mod local_address_probe;

pub use http_client::{HttpClient, HttpClientError, HttpClientResult};
pub use key_value_store::{KeyValueStore, StoreError, StoreResult};
pub use local_address_probe::LocalAddressProbe;
