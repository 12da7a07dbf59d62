//! Host resolution
//!
//! Hosted CI runners frequently have no outbound IPv6 route, while managed
//! database hostnames often publish both families. The resolver picks an IPv4
//! literal when one exists and otherwise leaves resolution to the client.

use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// DNS lookup capability
#[async_trait]
pub trait Resolve: Send + Sync {
    /// All addresses for `host`, in resolver order
    async fn lookup(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the system's getaddrinfo, bounded by a timeout
#[derive(Debug, Clone)]
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Resolve for SystemResolver {
    async fn lookup(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let lookup = tokio::net::lookup_host((host, port));
        let addrs = tokio::time::timeout(self.timeout, lookup)
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("DNS lookup timed out after {:?}", self.timeout),
                )
            })??;

        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Where the host used for connection attempts came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSource {
    /// First IPv4 address returned by DNS
    Ipv4,
    /// Original host string; DNS had no IPv4 answer or failed
    Original,
}

/// Host chosen for connection attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHost {
    pub host: String,
    pub source: HostSource,
}

/// First IPv4 address in `addrs`
pub fn first_ipv4(addrs: &[IpAddr]) -> Option<Ipv4Addr> {
    addrs.iter().find_map(|addr| match addr {
        IpAddr::V4(v4) => Some(*v4),
        IpAddr::V6(_) => None,
    })
}

/// Resolve `host` and prefer an IPv4 literal. Lookup failures are logged and
/// fall back to the original host string.
pub async fn resolve_preferred_host(
    resolver: &dyn Resolve,
    host: &str,
    port: u16,
) -> ResolvedHost {
    match resolver.lookup(host, port).await {
        Ok(addrs) => match first_ipv4(&addrs) {
            Some(v4) => {
                tracing::info!(
                    host = host,
                    ipv4 = %v4,
                    "Using IPv4 address for connection attempts"
                );
                ResolvedHost {
                    host: v4.to_string(),
                    source: HostSource::Ipv4,
                }
            }
            None => {
                tracing::info!(
                    host = host,
                    addresses = addrs.len(),
                    "No IPv4 address found; using original host"
                );
                original(host)
            }
        },
        Err(e) => {
            tracing::warn!(host = host, error = %e, "DNS resolution failed; using original host");
            original(host)
        }
    }
}

fn original(host: &str) -> ResolvedHost {
    ResolvedHost {
        host: host.to_string(),
        source: HostSource::Original,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    struct StaticResolver(io::Result<Vec<IpAddr>>);

    #[async_trait]
    impl Resolve for StaticResolver {
        async fn lookup(&self, _host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
            match &self.0 {
                Ok(addrs) => Ok(addrs.clone()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    fn v6() -> IpAddr {
        IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1))
    }

    #[test]
    fn test_first_ipv4_skips_ipv6() {
        let v4 = Ipv4Addr::new(203, 0, 113, 9);
        let addrs = vec![v6(), IpAddr::V4(v4), IpAddr::V4(Ipv4Addr::new(203, 0, 113, 10))];

        assert_eq!(first_ipv4(&addrs), Some(v4));
        assert_eq!(first_ipv4(&[v6()]), None);
        assert_eq!(first_ipv4(&[]), None);
    }

    #[tokio::test]
    async fn test_prefers_ipv4() {
        let resolver = StaticResolver(Ok(vec![v6(), IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9))]));

        let resolved = resolve_preferred_host(&resolver, "db.example.com", 5432).await;

        assert_eq!(resolved.host, "203.0.113.9");
        assert_eq!(resolved.source, HostSource::Ipv4);
    }

    #[tokio::test]
    async fn test_ipv6_only_keeps_hostname() {
        let resolver = StaticResolver(Ok(vec![v6()]));

        let resolved = resolve_preferred_host(&resolver, "db.example.com", 5432).await;

        assert_eq!(resolved.host, "db.example.com");
        assert_eq!(resolved.source, HostSource::Original);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_not_fatal() {
        let resolver = StaticResolver(Err(io::Error::new(io::ErrorKind::NotFound, "no such host")));

        let resolved = resolve_preferred_host(&resolver, "db.example.com", 5432).await;

        assert_eq!(resolved.host, "db.example.com");
        assert_eq!(resolved.source, HostSource::Original);
    }

    #[tokio::test]
    async fn test_system_resolver_handles_literals() {
        let resolver = SystemResolver::new(Duration::from_secs(5));

        let addrs = resolver.lookup("127.0.0.1", 5432).await.unwrap();
        assert_eq!(addrs, vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
    }
}
