//! Dynamic-DNS lookups for uplinks hidden behind NAT
//!
//! Gateways publish one hostname per uplink: the base name for WAN1 and
//! `<host>-2.<domain>` for WAN2. Resolving it reveals the public address
//! when the uplink itself only reports a private one.

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

use crate::models::WanInterface;

/// Name → address resolution, replaceable in tests
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// First address for `hostname`, `None` on any failure
    async fn resolve_host(&self, hostname: &str) -> Option<IpAddr>;
}

/// Resolver backed by the operating system via `tokio::net::lookup_host`
pub struct SystemHostResolver {
    timeout: Duration,
}

impl SystemHostResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl HostResolver for SystemHostResolver {
    async fn resolve_host(&self, hostname: &str) -> Option<IpAddr> {
        let lookup = tokio::net::lookup_host((hostname, 0));
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(addrs)) => {
                let addrs: Vec<IpAddr> = addrs.map(|a| a.ip()).collect();
                // Registry lookups are IPv4-centric; prefer an A record
                addrs
                    .iter()
                    .find(|a| a.is_ipv4())
                    .or_else(|| addrs.first())
                    .copied()
            }
            Ok(Err(e)) => {
                debug!(hostname, error = %e, "DDNS lookup failed");
                None
            }
            Err(_) => {
                debug!(hostname, "DDNS lookup timed out");
                None
            }
        }
    }
}

/// Hostname published for a specific uplink
pub fn interface_hostname(base: &str, wan: WanInterface) -> String {
    let base = base.trim().trim_end_matches('.');
    match wan {
        WanInterface::Wan1 => base.to_string(),
        WanInterface::Wan2 => match base.split_once('.') {
            Some((host, domain)) => format!("{}-2.{}", host, domain),
            None => format!("{}-2", base),
        },
    }
}

/// Hostnames to try in order: interface-specific first, then the base name
pub fn candidate_hostnames(base: &str, wan: WanInterface) -> Vec<String> {
    let specific = interface_hostname(base, wan);
    let base = base.trim().trim_end_matches('.').to_string();
    if specific == base {
        vec![specific]
    } else {
        vec![specific, base]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wan2_hostname_gets_interface_suffix() {
        assert_eq!(
            interface_hostname("store-0412-abcd.dynamic-m.com", WanInterface::Wan2),
            "store-0412-abcd-2.dynamic-m.com"
        );
        assert_eq!(
            interface_hostname("store-0412-abcd.dynamic-m.com", WanInterface::Wan1),
            "store-0412-abcd.dynamic-m.com"
        );
        assert_eq!(interface_hostname("gateway", WanInterface::Wan2), "gateway-2");
    }

    #[test]
    fn candidates_fall_back_to_base() {
        assert_eq!(
            candidate_hostnames("gw.dynamic-m.com", WanInterface::Wan2),
            vec!["gw-2.dynamic-m.com".to_string(), "gw.dynamic-m.com".to_string()]
        );
        assert_eq!(
            candidate_hostnames("gw.dynamic-m.com.", WanInterface::Wan1),
            vec!["gw.dynamic-m.com".to_string()]
        );
    }
}
