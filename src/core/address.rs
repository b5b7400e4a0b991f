//! Address types shared by every resolution component.
//!
//! A [`BackendAddress`] is the only thing consumers ever see: a normalized
//! `scheme://host[:port]` base to which they append their own request paths.
//! Discovery works on bare hosts ([`CandidateAddress`]) and only turns them
//! into addresses once the configured protocol and port are applied.
use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors related to address construction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AddressError {
    /// Address does not use http:// or https://
    #[error("Backend address must start with http:// or https://, got: {0}")]
    UnsupportedScheme(String),

    /// Address could not be parsed as a URL or lacks a host
    #[error("Invalid backend address '{address}': {reason}")]
    Invalid { address: String, reason: String },

    /// Host part is empty
    #[error("Backend host must not be empty")]
    EmptyHost,
}

/// Result type for address operations
pub type AddressResult<T> = Result<T, AddressError>;

/// A type-safe representation of a backend base address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackendAddress {
    /// Normalized address without trailing slash
    url: String,
    /// Host part as reported by the URL parser (IPv6 in brackets)
    host: String,
    /// Whether the address is secure (HTTPS)
    is_secure: bool,
}

impl BackendAddress {
    /// Creates a new BackendAddress if the provided string is a valid http(s) URL
    ///
    /// Surrounding whitespace and trailing slashes are removed and the scheme
    /// is lowercased. A query string or fragment is rejected since request
    /// paths are appended to the address.
    pub fn new(address: &str) -> AddressResult<Self> {
        let trimmed = address.trim().trim_end_matches('/');

        let (scheme, rest) = trimmed
            .split_once("://")
            .ok_or_else(|| AddressError::UnsupportedScheme(address.to_string()))?;
        let scheme = scheme.to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(AddressError::UnsupportedScheme(address.to_string()));
        }
        let normalized = format!("{scheme}://{rest}");

        let parsed = Url::parse(&normalized).map_err(|e| AddressError::Invalid {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(AddressError::Invalid {
                address: address.to_string(),
                reason: "query strings and fragments are not allowed".to_string(),
            });
        }

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AddressError::Invalid {
                address: address.to_string(),
                reason: "missing host".to_string(),
            })?
            .to_string();

        Ok(Self {
            is_secure: parsed.scheme() == "https",
            url: normalized,
            host,
        })
    }

    /// Assemble an address from protocol, host and port parts
    pub fn from_parts(protocol: &str, host: &str, port: u16) -> AddressResult<Self> {
        let protocol = protocol
            .trim()
            .trim_end_matches("://")
            .trim_end_matches(':')
            .to_ascii_lowercase();
        if protocol != "http" && protocol != "https" {
            return Err(AddressError::UnsupportedScheme(protocol));
        }

        let host = host.trim();
        if host.is_empty() {
            return Err(AddressError::EmptyHost);
        }

        // Bare IPv6 literals need brackets inside a URL authority
        let host = match host.parse::<Ipv6Addr>() {
            Ok(v6) => format!("[{v6}]"),
            Err(_) => host.to_string(),
        };

        Self::new(&format!("{protocol}://{host}:{port}"))
    }

    /// Get the underlying address as a string reference
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Host part of the address
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Check if the address is using HTTPS
    pub fn is_secure(&self) -> bool {
        self.is_secure
    }

    /// Build `{address}{path}` for an outbound request
    pub fn join(&self, path: &str) -> String {
        if path.is_empty() || path.starts_with('/') {
            format!("{}{}", self.url, path)
        } else {
            format!("{}/{}", self.url, path)
        }
    }

    /// Get the underlying address as a string
    pub fn into_string(self) -> String {
        self.url
    }

    /// `http://localhost:{port}`
    pub fn loopback(port: u16) -> Self {
        Self {
            url: format!("http://localhost:{port}"),
            host: "localhost".to_string(),
            is_secure: false,
        }
    }
}

impl FromStr for BackendAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendAddress::new(s)
    }
}

impl TryFrom<String> for BackendAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        BackendAddress::new(&value)
    }
}

impl From<BackendAddress> for String {
    fn from(value: BackendAddress) -> Self {
        value.url
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Discovery technique that proposed a candidate.
///
/// Variants are declared from highest to lowest confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeTechnique {
    Origin,
    LocalNetwork,
    ExternalLookup,
    PreviouslyDetected,
    CommonRange,
}

impl ProbeTechnique {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeTechnique::Origin => "origin",
            ProbeTechnique::LocalNetwork => "local_network",
            ProbeTechnique::ExternalLookup => "external_lookup",
            ProbeTechnique::PreviouslyDetected => "previously_detected",
            ProbeTechnique::CommonRange => "common_range",
        }
    }
}

impl fmt::Display for ProbeTechnique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A host proposed by a discovery technique, not yet confirmed reachable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateAddress {
    pub host: String,
    pub technique: ProbeTechnique,
}

impl CandidateAddress {
    pub fn new(host: impl Into<String>, technique: ProbeTechnique) -> Self {
        Self {
            host: host.into(),
            technique,
        }
    }
}

/// Candidates of one gathering pass, de-duplicated by host.
///
/// When two techniques propose the same host the more confident one is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    candidates: Vec<CandidateAddress>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a candidate; returns false if the host was already present
    pub fn insert(&mut self, candidate: CandidateAddress) -> bool {
        match self
            .candidates
            .iter_mut()
            .find(|c| c.host.eq_ignore_ascii_case(&candidate.host))
        {
            Some(existing) => {
                if candidate.technique < existing.technique {
                    existing.technique = candidate.technique;
                }
                false
            }
            None => {
                self.candidates.push(candidate);
                true
            }
        }
    }

    pub fn extend(&mut self, candidates: impl IntoIterator<Item = CandidateAddress>) {
        for candidate in candidates {
            self.insert(candidate);
        }
    }

    /// Drop every candidate whose host matches `host`
    pub fn remove_host(&mut self, host: &str) {
        self.candidates
            .retain(|c| !c.host.eq_ignore_ascii_case(host));
    }

    pub fn contains_host(&self, host: &str) -> bool {
        self.candidates
            .iter()
            .any(|c| c.host.eq_ignore_ascii_case(host))
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates ordered by technique confidence, insertion order within a technique
    pub fn iter(&self) -> impl Iterator<Item = &CandidateAddress> {
        let mut sorted: Vec<&CandidateAddress> = self.candidates.iter().collect();
        sorted.sort_by_key(|c| c.technique);
        sorted.into_iter()
    }

    /// Hosts found by actually probing the network (not the static fallbacks)
    pub fn detected_hosts(&self) -> Vec<String> {
        self.iter()
            .filter(|c| {
                matches!(
                    c.technique,
                    ProbeTechnique::LocalNetwork | ProbeTechnique::ExternalLookup
                )
            })
            .map(|c| c.host.clone())
            .collect()
    }
}

/// A candidate plus the outcome of its health check in one resolution pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedEndpoint {
    pub address: BackendAddress,
    pub reachable: bool,
}

impl VerifiedEndpoint {
    pub fn reachable(address: BackendAddress) -> Self {
        Self {
            address,
            reachable: true,
        }
    }

    pub fn unreachable(address: BackendAddress) -> Self {
        Self {
            address,
            reachable: false,
        }
    }
}

/// Where a resolved address came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "technique")]
pub enum ResolutionSource {
    Override,
    Origin,
    Cache,
    Discovery(ProbeTechnique),
    Fallback,
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionSource::Override => f.write_str("override"),
            ResolutionSource::Origin => f.write_str("origin"),
            ResolutionSource::Cache => f.write_str("cache"),
            ResolutionSource::Discovery(technique) => write!(f, "discovery:{technique}"),
            ResolutionSource::Fallback => f.write_str("fallback"),
        }
    }
}

/// Outcome of a resolution: the address handed to consumers and its provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEndpoint {
    pub address: BackendAddress,
    pub source: ResolutionSource,
}

impl ResolvedEndpoint {
    pub fn new(address: BackendAddress, source: ResolutionSource) -> Self {
        Self { address, source }
    }

    pub fn address(&self) -> &BackendAddress {
        &self.address
    }
}

fn parse_host_ip(host: &str) -> Option<IpAddr> {
    host.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .ok()
}

/// Host refers to the local machine itself (or to no machine at all)
pub fn is_loopback_host(host: &str) -> bool {
    let host = host.trim();
    if host.eq_ignore_ascii_case("localhost") || host.to_ascii_lowercase().ends_with(".localhost")
    {
        return true;
    }
    match parse_host_ip(host) {
        Some(ip) => ip.is_loopback() || ip.is_unspecified(),
        None => false,
    }
}

/// Host is an IPv4 169.254/16 or IPv6 fe80::/10 address
pub fn is_link_local_host(host: &str) -> bool {
    match parse_host_ip(host) {
        Some(IpAddr::V4(v4)) => v4.is_link_local(),
        Some(IpAddr::V6(v6)) => (v6.segments()[0] & 0xffc0) == 0xfe80,
        None => false,
    }
}

/// Whether a discovered host may be proposed as a backend candidate
pub fn is_usable_candidate_host(host: &str) -> bool {
    let host = host.trim();
    if host.is_empty() || is_loopback_host(host) || is_link_local_host(host) {
        return false;
    }
    // ICE host candidates obfuscated behind mDNS names
    if host.to_ascii_lowercase().ends_with(".local") {
        return false;
    }
    !matches!(parse_host_ip(host), Some(IpAddr::V4(Ipv4Addr::BROADCAST)))
}

/// Whether an IP address found by a local probe is worth keeping
pub fn is_usable_candidate_ip(ip: &IpAddr) -> bool {
    is_usable_candidate_host(&ip.to_string())
}

/// Extract the host from an origin given either as a bare host or as a URL
pub fn origin_host(origin: &str) -> Option<String> {
    let origin = origin.trim();
    if origin.is_empty() {
        return None;
    }
    if origin.contains("://") {
        return Url::parse(origin)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
    }
    // host:port without scheme, but leave bare IPv6 literals alone
    if origin.parse::<Ipv6Addr>().is_err() {
        if let Some((host, port)) = origin.rsplit_once(':') {
            if port.chars().all(|c| c.is_ascii_digit()) && !host.is_empty() {
                return Some(host.to_string());
            }
        }
    }
    Some(origin.to_string())
}
