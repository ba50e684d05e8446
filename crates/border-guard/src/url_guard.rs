use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tokio::net::lookup_host;
use url::{Host, Url};

pub const DEFAULT_DNS_TIMEOUT_MS: u64 = 5_000;

/// Configures the fetched-URL admissibility checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlGuardConfig {
    /// Resolves domain names and classifies every resolved address.
    pub resolve_dns: bool,
    /// Deadline for one resolution; expiry blocks the URL.
    pub dns_timeout_ms: u64,
}

impl Default for UrlGuardConfig {
    fn default() -> Self {
        Self {
            resolve_dns: true,
            dns_timeout_ms: DEFAULT_DNS_TIMEOUT_MS,
        }
    }
}

/// Structured URL admissibility failure with a stable reason code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("reason_code={reason_code} detail={detail}")]
pub struct UrlViolation {
    /// Stable machine-readable reason code.
    pub reason_code: &'static str,
    /// Human-readable detail for logs and diagnostics.
    pub detail: String,
}

/// Host classification that still needs (or skips) DNS resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HostTarget {
    Address(IpAddr),
    Domain { host: String, port: u16 },
}

/// SSRF defense over the URL a fetch tool reported.
#[derive(Debug, Clone, Default)]
pub struct UrlGuard {
    config: UrlGuardConfig,
}

impl UrlGuard {
    pub fn new(config: UrlGuardConfig) -> Self {
        Self { config }
    }

    /// Parses and validates `raw_url`, returning the parsed URL when admissible.
    pub async fn check(&self, raw_url: &str) -> Result<Url, UrlViolation> {
        let url = Url::parse(raw_url.trim()).map_err(|error| {
            violation(
                "url_invalid",
                format!("invalid fetched URL '{raw_url}': {error}"),
            )
        })?;

        match precheck_url(&url)? {
            HostTarget::Address(_) => Ok(url),
            HostTarget::Domain { .. } if !self.config.resolve_dns => Ok(url),
            HostTarget::Domain { host, port } => {
                let lookup_target = format!("{host}:{port}");
                let addresses = resolve_within(
                    &host,
                    self.config.dns_timeout_ms,
                    lookup_host(lookup_target.as_str()),
                )
                .await?;
                classify_resolved(&host, addresses)?;
                Ok(url)
            }
        }
    }
}

/// Awaits `lookup` under the DNS deadline and returns the resolved addresses.
pub(crate) async fn resolve_within<F, I>(
    host: &str,
    timeout_ms: u64,
    lookup: F,
) -> Result<Vec<IpAddr>, UrlViolation>
where
    F: Future<Output = io::Result<I>>,
    I: Iterator<Item = SocketAddr>,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms.max(1)), lookup).await {
        Err(_) => Err(violation(
            "url_dns_resolution_failed",
            format!("DNS resolution for host '{host}' timed out after {timeout_ms}ms"),
        )),
        Ok(Err(error)) => Err(violation(
            "url_dns_resolution_failed",
            format!("failed DNS resolution for host '{host}': {error}"),
        )),
        Ok(Ok(addresses)) => Ok(addresses.map(|socket_addr| socket_addr.ip()).collect()),
    }
}

/// Scheme and host-literal checks that need no network access.
pub(crate) fn precheck_url(url: &Url) -> Result<HostTarget, UrlViolation> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(violation(
                "url_blocked_scheme",
                format!("blocked unsupported scheme '{scheme}' for URL '{url}'"),
            ))
        }
    }

    let host = url
        .host()
        .ok_or_else(|| violation("url_invalid", format!("URL '{url}' is missing a host")))?;
    match host {
        Host::Ipv4(ipv4) => {
            validate_ip(IpAddr::V4(ipv4))?;
            Ok(HostTarget::Address(IpAddr::V4(ipv4)))
        }
        Host::Ipv6(ipv6) => {
            validate_ip(IpAddr::V6(ipv6))?;
            Ok(HostTarget::Address(IpAddr::V6(ipv6)))
        }
        Host::Domain(domain) => {
            let host = domain.trim().trim_end_matches('.').to_ascii_lowercase();
            if host.is_empty() {
                return Err(violation(
                    "url_invalid",
                    format!("URL '{url}' resolved to an empty host"),
                ));
            }
            if is_metadata_hostname(&host) {
                return Err(violation(
                    "url_blocked_metadata_endpoint",
                    format!("blocked metadata hostname '{host}'"),
                ));
            }
            if is_localhost_hostname(&host) {
                return Err(violation(
                    "url_blocked_private_network",
                    format!("blocked localhost hostname '{host}'"),
                ));
            }
            let port = url.port_or_known_default().ok_or_else(|| {
                violation(
                    "url_invalid",
                    format!("URL '{url}' does not include a known default port"),
                )
            })?;
            Ok(HostTarget::Domain { host, port })
        }
    }
}

/// Classifies every address a name resolved to; any private hit rejects the name.
pub(crate) fn classify_resolved<I>(host: &str, addresses: I) -> Result<(), UrlViolation>
where
    I: IntoIterator<Item = IpAddr>,
{
    let mut resolved_any = false;
    for address in addresses {
        resolved_any = true;
        validate_ip(address).map_err(|error| UrlViolation {
            reason_code: error.reason_code,
            detail: format!("host '{host}' resolved to a blocked address: {}", error.detail),
        })?;
    }
    if !resolved_any {
        return Err(violation(
            "url_dns_resolution_failed",
            format!("host '{host}' resolved no addresses"),
        ));
    }
    Ok(())
}

fn violation(reason_code: &'static str, detail: String) -> UrlViolation {
    UrlViolation {
        reason_code,
        detail,
    }
}

fn is_localhost_hostname(host: &str) -> bool {
    host == "localhost" || host.ends_with(".localhost")
}

fn is_metadata_hostname(host: &str) -> bool {
    matches!(
        host,
        "metadata"
            | "metadata.google.internal"
            | "instance-data"
            | "instance-data.ec2.internal"
            | "metadata.azure.internal"
    )
}

fn validate_ip(ip_addr: IpAddr) -> Result<(), UrlViolation> {
    let ip_addr = match ip_addr {
        IpAddr::V6(ipv6) => embedded_ipv4(ipv6)
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(ipv6)),
        other => other,
    };
    if is_metadata_ip(ip_addr) {
        return Err(violation(
            "url_blocked_metadata_endpoint",
            format!("blocked metadata IP '{ip_addr}'"),
        ));
    }
    if ip_addr.is_unspecified() {
        return Err(violation(
            "url_blocked_unspecified_ip",
            format!("blocked unspecified IP '{ip_addr}'"),
        ));
    }
    if ip_addr.is_multicast() {
        return Err(violation(
            "url_blocked_multicast",
            format!("blocked multicast IP '{ip_addr}'"),
        ));
    }
    if is_private_network_ip(ip_addr) {
        return Err(violation(
            "url_blocked_private_network",
            format!("blocked private, loopback or link-local IP '{ip_addr}'"),
        ));
    }
    Ok(())
}

fn is_metadata_ip(ip_addr: IpAddr) -> bool {
    match ip_addr {
        IpAddr::V4(ipv4) => ipv4 == Ipv4Addr::new(169, 254, 169, 254),
        IpAddr::V6(ipv6) => ipv6 == Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x0254),
    }
}

fn is_private_network_ip(ip_addr: IpAddr) -> bool {
    match ip_addr {
        IpAddr::V4(ipv4) => {
            ipv4.is_private()
                || ipv4.is_loopback()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || is_ipv4_carrier_grade_nat(ipv4)
                || ipv4.octets()[0] == 0
        }
        IpAddr::V6(ipv6) => {
            ipv6.is_loopback()
                || is_ipv6_unique_local(ipv6)
                || is_ipv6_link_local(ipv6)
                || is_ipv6_local_nat64(ipv6)
        }
    }
}

/// IPv4 address carried by an IPv6 transition form, classified in its place.
fn embedded_ipv4(ipv6: Ipv6Addr) -> Option<Ipv4Addr> {
    let segments = ipv6.segments();
    let tail = ipv4_from_segments(segments[6], segments[7]);
    match segments {
        // ::a.b.c.d (compatible), ::ffff:a.b.c.d (mapped)
        [0, 0, 0, 0, 0, 0 | 0xffff, _, _] => Some(tail),
        // ::ffff:0:a.b.c.d (SIIT)
        [0, 0, 0, 0, 0xffff, 0, _, _] => Some(tail),
        // 64:ff9b::/96 (NAT64 well-known prefix)
        [0x64, 0xff9b, 0, 0, 0, 0, _, _] => Some(tail),
        // 2002::/16 (6to4)
        [0x2002, high, low, ..] => Some(ipv4_from_segments(high, low)),
        // 2001::/32 (Teredo), client address stored inverted
        [0x2001, 0, ..] => Some(Ipv4Addr::from(!u32::from(tail))),
        _ => None,
    }
}

fn ipv4_from_segments(high: u16, low: u16) -> Ipv4Addr {
    Ipv4Addr::from((u32::from(high) << 16) | u32::from(low))
}

/// 64:ff9b:1::/48; the embedded address position depends on the operator's prefix length.
fn is_ipv6_local_nat64(ipv6: Ipv6Addr) -> bool {
    let segments = ipv6.segments();
    segments[0] == 0x64 && segments[1] == 0xff9b && segments[2] == 1
}

fn is_ipv4_carrier_grade_nat(ipv4: Ipv4Addr) -> bool {
    let octets = ipv4.octets();
    octets[0] == 100 && (64..=127).contains(&octets[1])
}

fn is_ipv6_unique_local(ipv6: Ipv6Addr) -> bool {
    (ipv6.segments()[0] & 0xfe00) == 0xfc00
}

fn is_ipv6_link_local(ipv6: Ipv6Addr) -> bool {
    (ipv6.segments()[0] & 0xffc0) == 0xfe80
}
