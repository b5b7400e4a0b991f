use std::{collections::BTreeSet, net::IpAddr, time::Duration};

use async_trait::async_trait;

/// LocalAddressProbe defines the capability of discovering the addresses the
/// local machine is known by on its network (ICE-style host and
/// server-reflexive candidates, or plain interface enumeration).
///
/// Implementations are best effort: failures yield an empty set. Loopback,
/// link-local and unspecified addresses must never be returned.
#[async_trait]
pub trait LocalAddressProbe: Send + Sync + 'static {
    /// Gather local addresses, giving up after `timeout`
    async fn gather(&self, timeout: Duration) -> BTreeSet<IpAddr>;

    /// Short name used in logs and metrics
    fn name(&self) -> &'static str;
}
