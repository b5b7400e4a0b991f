//! Homing - runtime backend endpoint resolution.
//!
//! Homing answers one question for a client that talks to a self-hosted
//! backend on an unknown network: *which base address should outbound calls
//! use?* The answer comes from a fixed priority chain:
//!
//! 1. an explicit override (user supplied, or deployment configuration),
//! 2. the host the client itself was served from, when it is not loopback,
//! 3. the last endpoint that worked, re-checked with one health check,
//! 4. candidate hosts from network probing, all health-checked concurrently
//!    with the first healthy one winning,
//! 5. `http://localhost:8001`.
//!
//! Resolution never fails. A pass runs at most once at a time per
//! [`EndpointResolver`] and its outcome is shared by every concurrent caller
//! until [`EndpointResolver::clear`] or an override change invalidates it.
//!
//! # Quick Example
//! ```no_run
//! use homing::{EndpointResolver, config::load_config};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = load_config(Some("homing.toml"))?;
//! let resolver = EndpointResolver::from_config(config)?;
//!
//! // Synchronous answer for code that cannot wait
//! let early = resolver.resolve_best_effort();
//! // Authoritative answer
//! let backend = resolver.resolve().await;
//! println!("{early} -> {}", backend.join("/api/items"));
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits for the HTTP client, the key-value
//! store and the local address probe) from **adapters** (reqwest, JSON file,
//! STUN, OS interfaces) while the resolution logic lives in `core`. Tests
//! drive `core` through in-memory fakes of every port.
//!
//! # Error Handling
//! Component errors are `thiserror` enums. Nothing on the resolution path
//! surfaces an error: failed techniques contribute nothing, storage failures
//! read as cache misses, and total failure yields the fallback address.
//! Setup code (configuration loading, adapter construction) returns
//! `eyre::Result` with context attached through `WrapErr`.
//!
//! # Feature Flags
//! * `interfaces` (default): OS network-interface enumeration via `pnet` as an
//!   alternative local address probe.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the types the binary and most embedders need
pub use crate::{
    adapters::{FileKeyValueStore, HttpClientAdapter, MemoryKeyValueStore},
    config::ResolverConfig,
    core::{BackendAddress, EndpointResolver, ResolutionSource, ResolvedEndpoint},
    ports::{http_client::HttpClient, key_value_store::KeyValueStore},
};
