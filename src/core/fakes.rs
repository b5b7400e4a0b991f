//! In-process stand-ins for the network ports, shared by the core unit tests.
use std::{
    collections::{BTreeSet, HashMap},
    net::IpAddr,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::ports::{
    http_client::{HttpClient, HttpClientError, HttpClientResult},
    local_address_probe::LocalAddressProbe,
};

/// Answers health checks from a table of healthy URLs, each with a latency.
/// Unknown URLs answer "unhealthy" immediately.
#[derive(Default)]
pub struct FakeHttpClient {
    healthy: Mutex<HashMap<String, Duration>>,
    lookup_body: Mutex<Option<String>>,
    health_calls: Mutex<Vec<String>>,
    lookup_calls: AtomicUsize,
}

impl FakeHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn healthy(self, url: &str, latency: Duration) -> Self {
        self.set_healthy(url, latency);
        self
    }

    pub fn lookup(self, body: &str) -> Self {
        *self.lookup_body.lock().unwrap() = Some(body.to_string());
        self
    }

    pub fn set_healthy(&self, url: &str, latency: Duration) {
        self.healthy
            .lock()
            .unwrap()
            .insert(url.to_string(), latency);
    }

    pub fn health_calls(&self) -> Vec<String> {
        self.health_calls.lock().unwrap().clone()
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.health_calls().len() + self.lookup_calls()
    }
}

#[async_trait]
impl HttpClient for FakeHttpClient {
    async fn health_check(&self, url: &str, _timeout: Duration) -> HttpClientResult<bool> {
        self.health_calls.lock().unwrap().push(url.to_string());
        let latency = self.healthy.lock().unwrap().get(url).copied();
        match latency {
            Some(latency) => {
                tokio::time::sleep(latency).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_text(&self, url: &str, _timeout: Duration) -> HttpClientResult<String> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        let body = self.lookup_body.lock().unwrap().clone();
        body.ok_or_else(|| HttpClientError::ConnectionError(format!("no route to {url}")))
    }
}

/// Local probe returning a fixed set after a delay
pub struct FakeLocalProbe {
    addresses: BTreeSet<IpAddr>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeLocalProbe {
    pub fn new(addresses: &[&str], delay: Duration) -> Self {
        Self {
            addresses: addresses.iter().filter_map(|a| a.parse().ok()).collect(),
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(&[], Duration::ZERO)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalAddressProbe for FakeLocalProbe {
    async fn gather(&self, _timeout: Duration) -> BTreeSet<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.addresses.clone()
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
