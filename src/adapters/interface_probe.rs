use std::{collections::BTreeSet, net::IpAddr, time::Duration};

use async_trait::async_trait;
use pnet::{datalink, ipnetwork::IpNetwork};

use crate::{core::address::is_usable_candidate_ip, ports::local_address_probe::LocalAddressProbe};

/// Local address probe that enumerates the OS network interfaces.
///
/// Useful where UDP toward a public STUN server is blocked: it reports every
/// IPv4 address bound to an interface that is up and not loopback.
#[derive(Debug, Default, Clone)]
pub struct InterfaceLocalAddressProbe;

impl InterfaceLocalAddressProbe {
    pub fn new() -> Self {
        Self
    }

    fn interface_addresses() -> BTreeSet<IpAddr> {
        datalink::interfaces()
            .into_iter()
            .filter(|i| i.is_up() && !i.is_loopback() && !i.ips.is_empty())
            .flat_map(|i| i.ips.into_iter())
            .filter_map(|net| match net {
                IpNetwork::V4(v4) => Some(IpAddr::V4(v4.ip())),
                IpNetwork::V6(_) => None,
            })
            .filter(is_usable_candidate_ip)
            .collect()
    }
}

#[async_trait]
impl LocalAddressProbe for InterfaceLocalAddressProbe {
    async fn gather(&self, _timeout: Duration) -> BTreeSet<IpAddr> {
        // Interface enumeration is a blocking syscall walk
        match tokio::task::spawn_blocking(Self::interface_addresses).await {
            Ok(addresses) => {
                tracing::debug!("Interface probe found {} address(es)", addresses.len());
                addresses
            }
            Err(e) => {
                tracing::warn!("Interface enumeration task failed: {}", e);
                BTreeSet::new()
            }
        }
    }

    fn name(&self) -> &'static str {
        "interfaces"
    }
}
