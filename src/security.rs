use crate::error::{BlockedAddress, PreviewError};
use hyper::client::connect::dns::Name;
use reqwest::dns::{Addrs, Resolve, Resolving};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tracing::{debug, warn};
use url::{Host, Url};

const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Refuses connections to private, loopback, link-local and otherwise
/// non-public addresses.
///
/// A disabled guard lets everything through; it is used when the caller
/// supplied their own HTTP client or explicitly allowed private addresses.
#[derive(Debug, Clone, Copy)]
pub struct NetworkGuard {
    enabled: bool,
}

impl Default for NetworkGuard {
    fn default() -> Self {
        Self::enabled()
    }
}

impl NetworkGuard {
    pub fn enabled() -> Self {
        Self { enabled: true }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a connection to `ip` is permitted.
    pub fn is_allowed(&self, ip: &IpAddr) -> bool {
        !self.enabled || !is_private_ip(ip)
    }

    /// Rejects URLs whose scheme we do not fetch or that carry no host.
    pub fn validate_url(&self, url: &Url) -> Result<(), PreviewError> {
        if !ALLOWED_SCHEMES.contains(&url.scheme()) {
            return Err(PreviewError::InvalidUrlScheme(url.scheme().to_string()));
        }
        if url.host().is_none() {
            return Err(PreviewError::InvalidUrl(format!("{url} has no host")));
        }
        Ok(())
    }

    /// Checks an IP-literal host without touching DNS. Named hosts pass; they
    /// are checked when resolved.
    pub fn check_literal(&self, url: &Url) -> Result<(), BlockedAddress> {
        let ip = match url.host() {
            Some(Host::Ipv4(v4)) => IpAddr::V4(v4),
            Some(Host::Ipv6(v6)) => IpAddr::V6(v6),
            _ => return Ok(()),
        };
        if self.is_allowed(&ip) {
            Ok(())
        } else {
            Err(BlockedAddress {
                host: ip.to_string(),
                addr: ip,
            })
        }
    }

    /// Pre-flight check run before each request: validates the URL, then
    /// resolves the host and rejects it if any address is private.
    ///
    /// Lookup failures are not reported here; the request itself will fail
    /// with a proper connection error.
    pub async fn check_url(&self, url: &Url) -> Result<(), PreviewError> {
        self.validate_url(url)?;
        if !self.enabled {
            return Ok(());
        }
        self.check_literal(url)?;

        let Some(Host::Domain(domain)) = url.host() else {
            return Ok(());
        };
        let port = url.port_or_known_default().unwrap_or(80);
        match tokio::net::lookup_host((domain, port)).await {
            Ok(addrs) => {
                for addr in addrs {
                    if !self.is_allowed(&addr.ip()) {
                        warn!(host = %domain, addr = %addr.ip(), "Host resolves to private address");
                        return Err(PreviewError::PrivateAddressBlocked {
                            host: domain.to_string(),
                            addr: addr.ip(),
                        });
                    }
                }
                Ok(())
            }
            Err(e) => {
                debug!(host = %domain, error = %e, "Pre-flight lookup failed");
                Ok(())
            }
        }
    }
}

/// DNS resolver installed on guarded clients so the addresses actually
/// connected to are checked too, not only the pre-flight lookup.
#[derive(Debug, Clone, Default)]
pub struct GuardedResolver {
    guard: NetworkGuard,
}

impl GuardedResolver {
    pub fn new(guard: NetworkGuard) -> Self {
        Self { guard }
    }
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let guard = self.guard;
        Box::pin(async move {
            let host = name.as_str().to_string();
            let resolved: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
                .await
                .map_err(|e| Box::new(e) as BoxError)?
                .collect();
            if let Some(blocked) = resolved.iter().find(|addr| !guard.is_allowed(&addr.ip())) {
                return Err(Box::new(BlockedAddress {
                    host,
                    addr: blocked.ip(),
                }) as BoxError);
            }
            let addrs: Addrs = Box::new(resolved.into_iter());
            Ok::<Addrs, BoxError>(addrs)
        })
    }
}

pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => is_private_ipv4(ipv4),
        IpAddr::V6(ipv6) => is_private_ipv6(ipv6),
    }
}

fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();

    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_multicast()
        || ip.is_broadcast()
        || ip.is_documentation()
        // 0.0.0.0/8
        || octets[0] == 0
        // 100.64.0.0/10 (Carrier-grade NAT)
        || (octets[0] == 100 && (octets[1] & 0b1100_0000) == 0b0100_0000)
        // 192.0.0.0/24 (IETF protocol assignments)
        || (octets[0] == 192 && octets[1] == 0 && octets[2] == 0)
        // 198.18.0.0/15 (Benchmarking)
        || (octets[0] == 198 && (octets[1] & 0b1111_1110) == 18)
        // 240.0.0.0/4 (Reserved)
        || (octets[0] & 0b1111_0000) == 0b1111_0000
}

fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_private_ipv4(&mapped);
    }
    let segments = ip.segments();

    // 2002::/16 (6to4) carries the IPv4 address it tunnels to
    if segments[0] == 0x2002 {
        let [a, b] = segments[1].to_be_bytes();
        let [c, d] = segments[2].to_be_bytes();
        return is_private_ipv4(&Ipv4Addr::new(a, b, c, d));
    }

    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // ::/96 (IPv4-compatible, deprecated)
        || segments[..6].iter().all(|&s| s == 0)
        // ::ffff:0:0/96 (IPv4-translated)
        || (segments[..4].iter().all(|&s| s == 0) && segments[4] == 0xffff && segments[5] == 0)
        // 100::/64 (Discard-only)
        || (segments[0] == 0x0100 && segments[1..4].iter().all(|&s| s == 0))
        // 2001::/32 (Teredo)
        || (segments[0] == 0x2001 && segments[1] == 0)
        // fe80::/10 (Link-local)
        || (segments[0] & 0xffc0) == 0xfe80
        // fc00::/7 (Unique local)
        || (segments[0] & 0xfe00) == 0xfc00
        // 64:ff9b::/96 (NAT64)
        || (segments[0] == 0x64 && segments[1] == 0xff9b)
        // 2001:db8::/32 (Documentation)
        || (segments[0] == 0x2001 && segments[1] == 0x0db8)
}
