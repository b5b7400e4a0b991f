//! Resolution coordinator.
//!
//! [`EndpointResolver`] owns the resolution state of the process. It runs the
//! priority chain (override, origin, cache, discovery, fallback) at most once
//! at a time and shares the outcome with every concurrent caller.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwapOption;
use eyre::{Result, WrapErr};
use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    adapters::{self, HttpClientAdapter},
    config::{DEFAULT_BACKEND_PORT, ResolverConfig},
    core::{
        address::{
            BackendAddress, CandidateSet, ResolutionSource, ResolvedEndpoint, VerifiedEndpoint,
            is_loopback_host, origin_host,
        },
        cache::EndpointCache,
        overrides::{StaticOverrides, USER_OVERRIDE_KEY},
        probe::ProbeEngine,
    },
    metrics::{self, ResolutionTimer},
    ports::{
        http_client::HttpClient, key_value_store::KeyValueStore,
        local_address_probe::LocalAddressProbe,
    },
    tracing_setup::create_resolution_span,
};

type PendingResolution = Shared<BoxFuture<'static, ResolvedEndpoint>>;

#[derive(Default)]
struct PassState {
    in_flight: Option<PendingResolution>,
    /// Bumped on every invalidation; a pass only publishes into its own generation
    generation: u64,
}

struct Inner {
    config: Arc<ResolverConfig>,
    cache: EndpointCache,
    probe: ProbeEngine,
    resolved: ArcSwapOption<ResolvedEndpoint>,
    state: Mutex<PassState>,
}

/// Resolves the backend base address for this process.
///
/// Cheap to clone; clones share state. Construct one per process and hand it
/// to whatever needs a backend address.
#[derive(Clone)]
pub struct EndpointResolver {
    inner: Arc<Inner>,
}

impl EndpointResolver {
    pub fn new(
        config: ResolverConfig,
        store: Arc<dyn KeyValueStore>,
        http: Arc<dyn HttpClient>,
        local_probe: Arc<dyn LocalAddressProbe>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            inner: Arc::new(Inner {
                probe: ProbeEngine::new(Arc::clone(&config), http, local_probe),
                cache: EndpointCache::new(store),
                config,
                resolved: ArcSwapOption::empty(),
                state: Mutex::new(PassState::default()),
            }),
        }
    }

    /// Wire the default adapters selected by `config`
    pub fn from_config(config: ResolverConfig) -> Result<Self> {
        let store = adapters::build_store(&config.storage)?;
        let http = HttpClientAdapter::new().wrap_err("Failed to create HTTP client")?;
        let local_probe = adapters::build_local_probe(&config.probe);
        Ok(Self::new(config, store, Arc::new(http), local_probe))
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }

    /// Backend base address; never fails.
    ///
    /// # Panics
    ///
    /// Must be polled within a Tokio runtime: the resolution pass runs as a
    /// spawned task and uses Tokio timers. Outside a runtime (for example under
    /// `futures::executor::block_on`) the first unresolved call panics. Use
    /// [`resolve_best_effort`](Self::resolve_best_effort) from synchronous code.
    pub async fn resolve(&self) -> BackendAddress {
        self.resolve_detailed().await.address
    }

    /// Backend base address together with the step that produced it.
    /// Same runtime requirement as [`resolve`](Self::resolve).
    pub async fn resolve_detailed(&self) -> ResolvedEndpoint {
        if let Some(resolved) = self.inner.resolved.load_full() {
            return (*resolved).clone();
        }
        self.pending().await
    }

    /// Best answer available right now, without any network work.
    ///
    /// Order: resolved state, cached endpoint (unverified), origin, fallback.
    pub fn resolve_best_effort(&self) -> BackendAddress {
        if let Some(resolved) = self.inner.resolved.load_full() {
            return resolved.address.clone();
        }
        self.inner
            .cache
            .read()
            .or_else(|| self.inner.origin_address())
            .unwrap_or_else(|| self.inner.fallback_endpoint().address)
    }

    /// Outcome of the last completed pass, if still valid
    pub fn resolved(&self) -> Option<ResolvedEndpoint> {
        self.inner.resolved.load_full().map(|r| (*r).clone())
    }

    /// Forget the cache and any memoized outcome; the next resolve runs a full pass
    pub fn clear(&self) {
        self.inner.cache.clear();
        self.inner.invalidate();
        tracing::info!("Endpoint cache cleared");
    }

    /// Persist a user-supplied backend address that wins over every other source
    pub fn set_user_override(&self, address: &str) -> Result<BackendAddress> {
        let address = BackendAddress::new(address).wrap_err("Invalid backend override")?;
        self.inner
            .cache
            .store()
            .set(USER_OVERRIDE_KEY, address.as_str())
            .wrap_err("Failed to store backend override")?;
        self.inner.invalidate();
        tracing::info!("Backend override set to {}", address);
        Ok(address)
    }

    pub fn clear_user_override(&self) -> Result<()> {
        self.inner
            .cache
            .store()
            .delete(USER_OVERRIDE_KEY)
            .wrap_err("Failed to remove backend override")?;
        self.inner.invalidate();
        tracing::info!("Backend override cleared");
        Ok(())
    }

    /// Run candidate gathering alone, without verification or persistence
    pub async fn gather_candidates(&self) -> CandidateSet {
        let detected = self.inner.cache.read_detected();
        self.inner
            .probe
            .gather_candidates(self.inner.config.origin.as_deref(), &detected)
            .await
    }

    fn pending(&self) -> PendingResolution {
        let mut state = self.inner.lock_state();

        // A pass may have published while we waited for the lock
        if let Some(resolved) = self.inner.resolved.load_full() {
            return future::ready((*resolved).clone()).boxed().shared();
        }
        if let Some(in_flight) = &state.in_flight {
            return in_flight.clone();
        }

        let generation = state.generation;
        let task = tokio::spawn(Arc::clone(&self.inner).run_pass(generation));
        let inner = Arc::downgrade(&self.inner);
        let fallback = self.inner.fallback_endpoint();

        let pending = async move {
            match task.await {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    tracing::error!("Resolution pass aborted: {}", e);
                    if let Some(inner) = inner.upgrade() {
                        inner.publish(generation, &fallback);
                    }
                    fallback
                }
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(pending.clone());
        pending
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, PassState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_pass(self: Arc<Self>, generation: u64) -> ResolvedEndpoint {
        let pass_id = Uuid::new_v4().to_string();
        let span = create_resolution_span(&pass_id);

        let endpoint = self
            .resolve_chain(generation)
            .instrument(span.clone())
            .await;

        span.record("resolution.source", tracing::field::display(&endpoint.source));
        span.record("resolution.address", endpoint.address.as_str());
        metrics::increment_resolution_total(&endpoint.source);
        self.publish(generation, &endpoint);
        endpoint
    }

    async fn resolve_chain(&self, generation: u64) -> ResolvedEndpoint {
        let _timer = ResolutionTimer::new();

        if let Some(address) = self.static_override() {
            tracing::info!("Using configured backend {}", address);
            return ResolvedEndpoint::new(address, ResolutionSource::Override);
        }

        if let Some(address) = self.origin_address() {
            tracing::info!("Using origin host backend {}", address);
            return ResolvedEndpoint::new(address, ResolutionSource::Origin);
        }

        let mut failed = None;
        if let Some(cached) = self.cache.read() {
            if self.probe.verify(&cached).await {
                tracing::info!("Cached backend {} is still reachable", cached);
                self.persist(generation, &VerifiedEndpoint::reachable(cached.clone()));
                return ResolvedEndpoint::new(cached, ResolutionSource::Cache);
            }
            tracing::warn!("Cached backend {} failed its health check, discarding", cached);
            self.cache.discard();
            failed = Some(cached);
        }

        let detected = self.cache.read_detected();
        let mut candidates = self
            .probe
            .gather_candidates(self.config.origin.as_deref(), &detected)
            .await;
        if let Some(failed) = &failed {
            // Already checked this pass
            if self.probe.candidate_address(failed.host()).as_ref() == Some(failed) {
                candidates.remove_host(failed.host());
            }
        }
        self.persist_detected(generation, &candidates);

        if let Some((endpoint, technique)) = self.probe.first_reachable(&candidates).await {
            self.persist(generation, &endpoint);
            return ResolvedEndpoint::new(endpoint.address, ResolutionSource::Discovery(technique));
        }

        let fallback = self.fallback_endpoint();
        tracing::warn!(
            "No backend candidate answered ({} tried), falling back to {}",
            candidates.len(),
            fallback.address
        );
        fallback
    }

    fn static_override(&self) -> Option<BackendAddress> {
        let user_address = match self.cache.store().get(USER_OVERRIDE_KEY) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to read backend override: {}", e);
                None
            }
        };
        StaticOverrides::from_config(&self.config, user_address).resolve_override()
    }

    fn origin_address(&self) -> Option<BackendAddress> {
        let host = origin_host(self.config.origin.as_deref()?)?;
        if is_loopback_host(&host) {
            return None;
        }
        BackendAddress::from_parts(&self.config.default_protocol, &host, self.config.default_port)
            .ok()
    }

    fn fallback_endpoint(&self) -> ResolvedEndpoint {
        let address = BackendAddress::new(&self.config.fallback_address).unwrap_or_else(|e| {
            tracing::warn!("Invalid fallback address, using localhost: {}", e);
            BackendAddress::loopback(DEFAULT_BACKEND_PORT)
        });
        ResolvedEndpoint::new(address, ResolutionSource::Fallback)
    }

    /// Cache writes from a pass that was invalidated mid-flight are dropped
    fn persist(&self, generation: u64, endpoint: &VerifiedEndpoint) {
        let state = self.lock_state();
        if state.generation == generation {
            self.cache.write(endpoint);
        }
    }

    fn persist_detected(&self, generation: u64, candidates: &CandidateSet) {
        let state = self.lock_state();
        if state.generation == generation {
            self.cache.write_detected(candidates);
        }
    }

    fn publish(&self, generation: u64, endpoint: &ResolvedEndpoint) {
        let mut state = self.lock_state();
        if state.generation != generation {
            tracing::debug!("Discarding outcome of invalidated resolution pass");
            return;
        }
        self.resolved.store(Some(Arc::new(endpoint.clone())));
        state.in_flight = None;
    }

    fn invalidate(&self) {
        let mut state = self.lock_state();
        state.generation += 1;
        state.in_flight = None;
        self.resolved.store(None);
    }
}
