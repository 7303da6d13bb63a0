//! SSRF guard: reject URLs that would reach private or reserved addresses.
//!
//! IP literals are checked directly; hostnames are resolved and every A/AAAA
//! answer is checked, so a record pointing one answer at a public address and
//! another at a private one is still rejected (DNS-rebinding defense).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use quarry_config::ResolvedConfig;
use quarry_types::{ErrorCode, FetchError};
use url::{Host, Url};

/// An IPv4 range in the blocked table.
struct V4Range {
    base: [u8; 4],
    prefix: u8,
    label: &'static str,
}

const fn range(base: [u8; 4], prefix: u8, label: &'static str) -> V4Range {
    V4Range {
        base,
        prefix,
        label,
    }
}

/// Blocked IPv4 ranges. The table is exact: additions need a matching test.
const BLOCKED_V4: &[V4Range] = &[
    range([0, 0, 0, 0], 8, "0.0.0.0/8"),
    range([10, 0, 0, 0], 8, "10.0.0.0/8"),
    range([100, 64, 0, 0], 10, "100.64.0.0/10"),
    range([127, 0, 0, 0], 8, "127.0.0.0/8"),
    range([169, 254, 0, 0], 16, "169.254.0.0/16"),
    range([172, 16, 0, 0], 12, "172.16.0.0/12"),
    range([192, 0, 0, 0], 24, "192.0.0.0/24"),
    range([192, 0, 2, 0], 24, "192.0.2.0/24"),
    range([192, 88, 99, 0], 24, "192.88.99.0/24"),
    range([192, 168, 0, 0], 16, "192.168.0.0/16"),
    range([198, 18, 0, 0], 15, "198.18.0.0/15"),
    range([198, 51, 100, 0], 24, "198.51.100.0/24"),
    range([203, 0, 113, 0], 24, "203.0.113.0/24"),
    range([224, 0, 0, 0], 4, "224.0.0.0/4"),
    range([240, 0, 0, 0], 4, "240.0.0.0/4"),
    range([255, 255, 255, 255], 32, "255.255.255.255/32"),
];

fn v4_in_range(ip: Ipv4Addr, range: &V4Range) -> bool {
    let ip = u32::from(ip);
    let base = u32::from(Ipv4Addr::from(range.base));
    let mask = if range.prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(range.prefix))
    };
    (ip & mask) == (base & mask)
}

/// The label of the blocked range containing `ip`, if any.
#[must_use]
pub fn blocked_range(ip: IpAddr) -> Option<&'static str> {
    match ip {
        IpAddr::V4(v4) => BLOCKED_V4.iter().find(|r| v4_in_range(v4, r)).map(|r| r.label),
        IpAddr::V6(v6) => blocked_v6(v6),
    }
}

fn blocked_v6(ip: Ipv6Addr) -> Option<&'static str> {
    // IPv4-mapped addresses answer to the IPv4 rules.
    if let Some(v4) = ip.to_ipv4_mapped() {
        return blocked_range(IpAddr::V4(v4));
    }

    if ip == Ipv6Addr::LOCALHOST {
        return Some("::1/128");
    }
    if ip == Ipv6Addr::UNSPECIFIED {
        return Some("::/128");
    }

    let segments = ip.segments();
    if segments[0] & 0xffc0 == 0xfe80 {
        return Some("fe80::/10");
    }
    if segments[0] & 0xfe00 == 0xfc00 {
        return Some("fc00::/7");
    }
    if segments[0] & 0xff00 == 0xff00 {
        return Some("ff00::/8");
    }
    if segments[0] == 0x2001 && segments[1] == 0x0db8 {
        return Some("2001:db8::/32");
    }
    if segments[0] == 0 && segments[1] == 0 && segments[2] == 0 && segments[3] == 0 {
        return Some("100::/64");
    }

    None
}

/// Whether an address falls in a private or reserved range.
#[must_use]
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    blocked_range(ip).is_some()
}

fn ssrf_blocked(ip: IpAddr, label: &str) -> FetchError {
    FetchError::new(
        ErrorCode::SsrfBlocked,
        format!("destination address {ip} is in blocked range {label}"),
    )
    .with_detail("ip", ip.to_string())
    .with_detail("range", label.to_string())
}

/// Validate a URL's destination, resolving DNS when the host is a name.
///
/// Returns the resolved addresses for hostname targets (empty for IP
/// literals). Rejection reasons, in check order: hostname not on the
/// configured allowlist; `localhost` aliases; blocked IP literal; any
/// resolved answer in a blocked range.
pub async fn check_url(url: &Url, config: &ResolvedConfig) -> Result<Vec<IpAddr>, FetchError> {
    let host = url.host().ok_or_else(|| {
        FetchError::new(ErrorCode::InvalidUrl, format!("URL has no host: {url}"))
    })?;

    if let Host::Domain(domain) = &host {
        let name = domain.to_ascii_lowercase();

        if !config.allowlist_domains.is_empty() && !allowlisted(&name, &config.allowlist_domains) {
            return Err(FetchError::new(
                ErrorCode::DomainNotAllowed,
                format!("host {name} is not on the configured allowlist"),
            )
            .with_detail("host", name));
        }

        if name == "localhost" || name.ends_with(".localhost") {
            return Err(FetchError::new(
                ErrorCode::SsrfBlocked,
                format!("hostname {name} refers to the local machine"),
            )
            .with_detail("host", name));
        }
    }

    if !config.block_private_ip {
        return Ok(Vec::new());
    }

    match host {
        Host::Ipv4(ip) => {
            if let Some(label) = blocked_range(IpAddr::V4(ip)) {
                return Err(ssrf_blocked(IpAddr::V4(ip), label));
            }
            Ok(Vec::new())
        }
        Host::Ipv6(ip) => {
            if let Some(label) = blocked_range(IpAddr::V6(ip)) {
                return Err(ssrf_blocked(IpAddr::V6(ip), label));
            }
            Ok(Vec::new())
        }
        Host::Domain(domain) => {
            let port = url.port_or_known_default().unwrap_or(443);
            let addrs: Vec<IpAddr> = tokio::net::lookup_host((domain, port))
                .await
                .map_err(|e| {
                    FetchError::new(
                        ErrorCode::FetchError,
                        format!("DNS resolution failed for {domain}: {e}"),
                    )
                    .with_detail("host", domain.to_string())
                })?
                .map(|addr| addr.ip())
                .collect();

            if addrs.is_empty() {
                return Err(FetchError::new(
                    ErrorCode::FetchError,
                    format!("DNS returned no addresses for {domain}"),
                )
                .with_detail("host", domain.to_string()));
            }

            // All answers must be clean, not just the first one the socket
            // would use.
            for addr in &addrs {
                if let Some(label) = blocked_range(*addr) {
                    return Err(ssrf_blocked(*addr, label));
                }
            }

            Ok(addrs)
        }
    }
}

fn allowlisted(host: &str, allowlist: &[String]) -> bool {
    allowlist
        .iter()
        .any(|entry| host == entry || host.ends_with(&format!(".{entry}")))
}
