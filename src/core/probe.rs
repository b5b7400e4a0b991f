//! Address probe engine: proposes candidate hosts and verifies them.
//!
//! Gathering fans out over independent techniques. Each one is best effort and
//! bounded by its own timer; a technique that fails or runs out of time simply
//! contributes nothing. Verification is a plain `GET {address}{health path}`.
use std::{collections::BTreeSet, net::IpAddr, sync::Arc};

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::Deserialize;
use tracing::Instrument;

use crate::{
    config::ResolverConfig,
    core::address::{
        BackendAddress, CandidateAddress, CandidateSet, ProbeTechnique, VerifiedEndpoint,
        is_loopback_host, is_usable_candidate_host, is_usable_candidate_ip, origin_host,
    },
    metrics,
    ports::{http_client::HttpClient, local_address_probe::LocalAddressProbe},
    tracing_setup::create_probe_span,
    utils::or_after,
};

#[derive(Debug, Deserialize)]
struct LookupResponse {
    ip: String,
}

/// Extract an address from an external lookup body.
///
/// Accepts `{"ip": "203.0.113.7"}` or the bare address as plain text.
pub fn parse_lookup_body(body: &str) -> Option<IpAddr> {
    let body = body.trim();
    if let Ok(response) = serde_json::from_str::<LookupResponse>(body) {
        return response.ip.trim().parse().ok();
    }
    body.parse().ok()
}

pub struct ProbeEngine {
    config: Arc<ResolverConfig>,
    http: Arc<dyn HttpClient>,
    local_probe: Arc<dyn LocalAddressProbe>,
}

impl ProbeEngine {
    pub fn new(
        config: Arc<ResolverConfig>,
        http: Arc<dyn HttpClient>,
        local_probe: Arc<dyn LocalAddressProbe>,
    ) -> Self {
        Self {
            config,
            http,
            local_probe,
        }
    }

    /// Address a candidate host is reached at: configured protocol and port
    pub fn candidate_address(&self, host: &str) -> Option<BackendAddress> {
        match BackendAddress::from_parts(
            &self.config.default_protocol,
            host,
            self.config.default_port,
        ) {
            Ok(address) => Some(address),
            Err(e) => {
                tracing::debug!("Skipping candidate '{}': {}", host, e);
                None
            }
        }
    }

    /// Run every gathering technique concurrently and merge the results
    pub async fn gather_candidates(
        &self,
        origin: Option<&str>,
        previously_detected: &[String],
    ) -> CandidateSet {
        let (local, external) = tokio::join!(self.local_candidates(), self.external_candidates());

        let mut candidates = CandidateSet::new();
        for batch in [
            self.origin_candidates(origin),
            local,
            external,
            self.previously_detected_candidates(previously_detected),
            self.common_candidates(),
        ] {
            if let Some(first) = batch.first() {
                metrics::add_candidates(first.technique, batch.len());
            }
            candidates.extend(batch);
        }

        tracing::debug!("Gathered {} candidate hosts", candidates.len());
        candidates
    }

    /// Health-check one address; any failure means unreachable
    pub async fn verify(&self, address: &BackendAddress) -> bool {
        let url = address.join(&self.config.health_check.path);
        let timeout = self.config.health_check.timeout();

        let check = async {
            match self.http.health_check(&url, timeout).await {
                Ok(healthy) => healthy,
                Err(e) => {
                    tracing::debug!("Health check of {} failed: {}", url, e);
                    false
                }
            }
        };
        let reachable = or_after(check, timeout, false).await;

        metrics::record_verification(address.as_str(), reachable);
        tracing::debug!(endpoint = %address, reachable, "Verified candidate");
        reachable
    }

    /// Verify every candidate concurrently; the first to answer healthy wins.
    ///
    /// Candidate confidence does not matter here. Outstanding checks are
    /// dropped once a winner is known.
    pub async fn first_reachable(
        &self,
        candidates: &CandidateSet,
    ) -> Option<(VerifiedEndpoint, ProbeTechnique)> {
        let mut pending: FuturesUnordered<_> = candidates
            .iter()
            .filter_map(|candidate| {
                let address = self.candidate_address(&candidate.host)?;
                let technique = candidate.technique;
                Some(async move {
                    let reachable = self.verify(&address).await;
                    (address, technique, reachable)
                })
            })
            .collect();

        while let Some((address, technique, reachable)) = pending.next().await {
            if reachable {
                tracing::info!("Candidate {} ({}) is reachable", address, technique);
                return Some((VerifiedEndpoint::reachable(address), technique));
            }
        }
        None
    }

    fn origin_candidates(&self, origin: Option<&str>) -> Vec<CandidateAddress> {
        origin
            .and_then(origin_host)
            .filter(|host| !is_loopback_host(host))
            .map(|host| vec![CandidateAddress::new(host, ProbeTechnique::Origin)])
            .unwrap_or_default()
    }

    async fn local_candidates(&self) -> Vec<CandidateAddress> {
        let span = create_probe_span(ProbeTechnique::LocalNetwork);
        let timeout = self.config.probe.local_probe_timeout();

        let addresses = or_after(self.local_probe.gather(timeout), timeout, BTreeSet::new())
            .instrument(span.clone())
            .await;

        let candidates: Vec<_> = addresses
            .iter()
            .filter(|ip| is_usable_candidate_ip(ip))
            .map(|ip| CandidateAddress::new(ip.to_string(), ProbeTechnique::LocalNetwork))
            .collect();
        span.record("probe.candidates", candidates.len());
        tracing::debug!(
            "Local probe '{}' found {} addresses",
            self.local_probe.name(),
            candidates.len()
        );
        candidates
    }

    async fn external_candidates(&self) -> Vec<CandidateAddress> {
        let Some(url) = self
            .config
            .probe
            .external_lookup_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
        else {
            return Vec::new();
        };
        let span = create_probe_span(ProbeTechnique::ExternalLookup);
        let timeout = self.config.probe.external_lookup_timeout();

        let lookup = async {
            match self.http.get_text(url, timeout).await {
                Ok(body) => parse_lookup_body(&body),
                Err(e) => {
                    tracing::debug!("External address lookup failed: {}", e);
                    None
                }
            }
        };
        let found = or_after(lookup, timeout, None)
            .instrument(span.clone())
            .await
            .filter(is_usable_candidate_ip);

        span.record("probe.candidates", usize::from(found.is_some()));
        found
            .map(|ip| {
                vec![CandidateAddress::new(
                    ip.to_string(),
                    ProbeTechnique::ExternalLookup,
                )]
            })
            .unwrap_or_default()
    }

    fn previously_detected_candidates(&self, hosts: &[String]) -> Vec<CandidateAddress> {
        hosts
            .iter()
            .filter(|host| is_usable_candidate_host(host))
            .map(|host| CandidateAddress::new(host.trim(), ProbeTechnique::PreviouslyDetected))
            .collect()
    }

    fn common_candidates(&self) -> Vec<CandidateAddress> {
        self.config
            .probe
            .common_candidates
            .iter()
            .map(|host| host.trim())
            .filter(|host| !host.is_empty())
            .map(|host| CandidateAddress::new(host, ProbeTechnique::CommonRange))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::ProbeConfig,
        core::fakes::{FakeHttpClient, FakeLocalProbe},
    };

    fn config(common: &[&str]) -> Arc<ResolverConfig> {
        Arc::new(
            ResolverConfig::builder()
                .probe(ProbeConfig {
                    external_lookup_url: Some("http://lookup.test/ip".to_string()),
                    common_candidates: common.iter().map(|s| s.to_string()).collect(),
                    ..ProbeConfig::default()
                })
                .build(),
        )
    }

    fn engine(
        config: Arc<ResolverConfig>,
        http: FakeHttpClient,
        probe: FakeLocalProbe,
    ) -> (ProbeEngine, Arc<FakeHttpClient>, Arc<FakeLocalProbe>) {
        let http = Arc::new(http);
        let probe = Arc::new(probe);
        (
            ProbeEngine::new(config, http.clone(), probe.clone()),
            http,
            probe,
        )
    }

    fn hosts(candidates: &CandidateSet) -> Vec<(String, ProbeTechnique)> {
        candidates
            .iter()
            .map(|c| (c.host.clone(), c.technique))
            .collect()
    }

    #[test]
    fn test_parse_lookup_body() {
        assert_eq!(
            parse_lookup_body("{\"ip\":\"203.0.113.7\"}"),
            Some("203.0.113.7".parse().unwrap())
        );
        assert_eq!(
            parse_lookup_body("203.0.113.7\n"),
            Some("203.0.113.7".parse().unwrap())
        );
        assert_eq!(parse_lookup_body("<html>rate limited</html>"), None);
        assert_eq!(parse_lookup_body("{\"ip\":\"nope\"}"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gather_merges_all_techniques() {
        let (engine, _, _) = engine(
            config(&["192.168.1.1", "10.0.0.1"]),
            FakeHttpClient::new().lookup("{\"ip\": \"203.0.113.7\"}"),
            FakeLocalProbe::new(&["192.168.1.30", "127.0.0.1"], Duration::from_millis(50)),
        );

        let candidates = engine
            .gather_candidates(
                Some("http://192.168.1.50:3000"),
                &["192.168.1.40".to_string(), "192.168.1.1".to_string()],
            )
            .await;

        assert_eq!(
            hosts(&candidates),
            vec![
                ("192.168.1.50".to_string(), ProbeTechnique::Origin),
                ("192.168.1.30".to_string(), ProbeTechnique::LocalNetwork),
                ("203.0.113.7".to_string(), ProbeTechnique::ExternalLookup),
                ("192.168.1.40".to_string(), ProbeTechnique::PreviouslyDetected),
                ("192.168.1.1".to_string(), ProbeTechnique::PreviouslyDetected),
                ("10.0.0.1".to_string(), ProbeTechnique::CommonRange),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_loopback_origin_and_failed_lookup_contribute_nothing() {
        let (engine, http, _) = engine(
            config(&["10.0.0.1"]),
            FakeHttpClient::new(),
            FakeLocalProbe::empty(),
        );

        let candidates = engine.gather_candidates(Some("localhost:5173"), &[]).await;
        assert_eq!(
            hosts(&candidates),
            vec![("10.0.0.1".to_string(), ProbeTechnique::CommonRange)]
        );
        assert_eq!(http.lookup_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_local_probe_times_out_empty() {
        let (engine, _, probe) = engine(
            config(&[]),
            FakeHttpClient::new().lookup("203.0.113.7"),
            FakeLocalProbe::new(&["192.168.1.30"], Duration::from_secs(60)),
        );

        let started = tokio::time::Instant::now();
        let candidates = engine.gather_candidates(None, &[]).await;

        assert_eq!(probe.calls(), 1);
        assert!(!candidates.contains_host("192.168.1.30"));
        assert!(candidates.contains_host("203.0.113.7"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify() {
        let (engine, http, _) = engine(
            config(&[]),
            FakeHttpClient::new().healthy("http://192.168.1.30:8001/health", Duration::ZERO),
            FakeLocalProbe::empty(),
        );

        let good = BackendAddress::new("http://192.168.1.30:8001").unwrap();
        let bad = BackendAddress::new("http://192.168.1.31:8001").unwrap();
        assert!(engine.verify(&good).await);
        assert!(!engine.verify(&bad).await);
        assert_eq!(
            http.health_calls(),
            vec![
                "http://192.168.1.30:8001/health",
                "http://192.168.1.31:8001/health"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_slow_backend_is_unreachable() {
        let (engine, _, _) = engine(
            config(&[]),
            FakeHttpClient::new().healthy("http://192.168.1.30:8001/health", Duration::from_secs(10)),
            FakeLocalProbe::empty(),
        );

        let slow = BackendAddress::new("http://192.168.1.30:8001").unwrap();
        assert!(!engine.verify(&slow).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_reachable_is_fastest_not_most_confident() {
        let (engine, _, _) = engine(
            config(&[]),
            FakeHttpClient::new()
                .healthy("http://192.168.1.30:8001/health", Duration::from_millis(900))
                .healthy("http://10.0.0.1:8001/health", Duration::from_millis(100)),
            FakeLocalProbe::empty(),
        );

        let mut candidates = CandidateSet::new();
        candidates.insert(CandidateAddress::new("192.168.1.30", ProbeTechnique::LocalNetwork));
        candidates.insert(CandidateAddress::new("10.0.0.1", ProbeTechnique::CommonRange));
        candidates.insert(CandidateAddress::new("10.0.0.2", ProbeTechnique::CommonRange));

        let (endpoint, technique) = engine.first_reachable(&candidates).await.unwrap();
        assert_eq!(endpoint.address.as_str(), "http://10.0.0.1:8001");
        assert!(endpoint.reachable);
        assert_eq!(technique, ProbeTechnique::CommonRange);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_reachable_none() {
        let (engine, http, _) = engine(config(&[]), FakeHttpClient::new(), FakeLocalProbe::empty());

        let mut candidates = CandidateSet::new();
        candidates.insert(CandidateAddress::new("10.0.0.1", ProbeTechnique::CommonRange));
        candidates.insert(CandidateAddress::new("10.0.0.2", ProbeTechnique::CommonRange));

        assert_eq!(engine.first_reachable(&candidates).await, None);
        assert_eq!(http.health_calls().len(), 2);
        assert_eq!(engine.first_reachable(&CandidateSet::new()).await, None);
    }
}
