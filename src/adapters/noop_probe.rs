use std::{collections::BTreeSet, net::IpAddr, time::Duration};

use async_trait::async_trait;

use crate::ports::local_address_probe::LocalAddressProbe;

/// Local address probe for targets with no way to learn their own address
#[derive(Debug, Default, Clone)]
pub struct NoopLocalAddressProbe;

impl NoopLocalAddressProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LocalAddressProbe for NoopLocalAddressProbe {
    async fn gather(&self, _timeout: Duration) -> BTreeSet<IpAddr> {
        BTreeSet::new()
    }

    fn name(&self) -> &'static str {
        "none"
    }
}
