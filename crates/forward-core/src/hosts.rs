//! Static host overrides, the `/etc/hosts` of the forwarding core.
//!
//! A hit replaces the destination host by a literal address on a copy of the
//! destination; the request's own URIs keep the name.

use std::collections::HashMap;
use std::net::IpAddr;

/// Host-name to literal-address override
pub trait HostsResolver: Send + Sync {
    fn resolve(&self, host: &str) -> Option<IpAddr>;
}

/// In-memory [`HostsResolver`]; names compare case-insensitively
#[derive(Debug, Clone, Default)]
pub struct StaticHosts {
    entries: HashMap<String, IpAddr>,
}

impl StaticHosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, host: impl AsRef<str>, address: IpAddr) -> Self {
        self.entries.insert(host.as_ref().to_ascii_lowercase(), address);
        self
    }
}

impl HostsResolver for StaticHosts {
    fn resolve(&self, host: &str) -> Option<IpAddr> {
        self.entries.get(&host.to_ascii_lowercase()).copied()
    }
}
