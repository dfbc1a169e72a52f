//! Webhook Target URL Validation
//!
//! Registration-time checks (scheme, host, port) and delivery-time resolved
//! IP verification. Blocks private/reserved network targets and common
//! non-HTTP service ports.

use std::net::IpAddr;

/// Blocked hostname patterns (case-insensitive check performed here).
const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "ip6-localhost",
    "ip6-loopback",
];

/// Ports that never serve third-party webhook endpoints.
const BLOCKED_PORTS: &[u16] = &[
    22,    // ssh
    23,    // telnet
    25,    // smtp
    110,   // pop3
    143,   // imap
    465,   // smtps
    587,   // submission
    993,   // imaps
    995,   // pop3s
    3306,  // mysql
    5432,  // postgres
    6379,  // redis
    9200,  // elasticsearch
    11211, // memcached
];

/// Maximum accepted target URL length.
const MAX_URL_LEN: usize = 2048;

/// Validate a target URL at registration time.
///
/// Rejects malformed URLs, non-HTTP schemes, plain HTTP outside dev mode,
/// private or reserved hosts, and blocked service ports. These failures are
/// permanent; they are never retried.
pub fn validate_target_url(url: &str, dev_mode: bool) -> Result<(), String> {
    if url.len() < 10 || url.len() > MAX_URL_LEN {
        return Err(format!("URL must be between 10 and {MAX_URL_LEN} characters"));
    }

    let parsed = reqwest::Url::parse(url).map_err(|_| "Invalid URL format".to_string())?;

    match parsed.scheme() {
        "https" => {}
        "http" if dev_mode => {}
        "http" => return Err("Plain HTTP targets are not allowed".to_string()),
        other => return Err(format!("Unsupported URL scheme: {other}")),
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| "URL must contain a host".to_string())?;

    if !dev_mode && is_blocked_host(host) {
        return Err("URL must not point to a private or reserved address".to_string());
    }

    if let Some(port) = parsed.port() {
        if BLOCKED_PORTS.contains(&port) {
            return Err(format!("Port {port} is not allowed for webhook targets"));
        }
    }

    Ok(())
}

/// Check if a hostname string points to a private or reserved address.
/// Static check only; DNS resolution happens again at delivery time.
pub fn is_blocked_host(host: &str) -> bool {
    let lower = host.to_lowercase();

    if BLOCKED_HOSTNAMES.contains(&lower.as_str()) {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return is_private_ip(&ip);
    }

    // IPv6 bracket notation (e.g., `[::1]`)
    let trimmed = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return is_private_ip(&ip);
    }

    false
}

/// Check if an IP address is private, loopback, link-local, or otherwise reserved.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            v4.is_loopback()              // 127.0.0.0/8
                || v4.is_private()         // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
                || v4.is_link_local()      // 169.254.0.0/16
                || v4.is_broadcast()       // 255.255.255.255
                || v4.is_unspecified()     // 0.0.0.0
                || o[0] == 100 && (o[1] & 0xC0) == 64 // 100.64.0.0/10 (CGN)
                || o[0] == 198 && (o[1] & 0xFE) == 18 // 198.18.0.0/15 (benchmark)
                || o[0] == 192 && o[1] == 0 && o[2] == 0 // 192.0.0.0/24 (IETF)
                || o[0] == 192 && o[1] == 0 && o[2] == 2 // 192.0.2.0/24 (TEST-NET-1)
                || o[0] == 198 && o[1] == 51 && o[2] == 100 // 198.51.100.0/24 (TEST-NET-2)
                || o[0] == 203 && o[1] == 0 && o[2] == 113 // 203.0.113.0/24 (TEST-NET-3)
                || o[0] >= 224 // 224.0.0.0/4 (multicast) + 240.0.0.0/4 (reserved)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()              // ::1
                || v6.is_unspecified()     // ::
                || (v6.segments()[0] & 0xFE00) == 0xFC00 // fc00::/7 (ULA)
                || (v6.segments()[0] & 0xFFC0) == 0xFE80 // fe80::/10 (link-local)
                || v6
                    .to_ipv4_mapped()
                    .is_some_and(|v4| is_private_ip(&IpAddr::V4(v4)))
        }
    }
}

/// Verified URL with a pinned resolved address to prevent DNS rebinding.
pub struct VerifiedUrl {
    /// The original hostname from the URL.
    pub host: String,
    /// The first verified (non-private) socket address.
    pub addr: std::net::SocketAddr,
}

/// Resolve a URL's hostname and verify the resolved IP is not private/reserved.
///
/// Returns the verified host and a pinned socket address to use for delivery,
/// so the request goes to the same IP that passed validation even if DNS
/// changes underneath (TOCTOU).
pub async fn verify_resolved_ip(url: &str, dev_mode: bool) -> Result<VerifiedUrl, String> {
    let parsed = reqwest::Url::parse(url).map_err(|e| format!("Invalid URL: {e}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| "URL has no host".to_string())?
        .to_string();

    let port = parsed.port_or_known_default().unwrap_or(443);

    // Raw IPs are validated at delivery time regardless of what registration saw
    if let Ok(ip) = host.parse::<IpAddr>() {
        if !dev_mode && is_private_ip(&ip) {
            return Err(format!("URL contains private IP address: {ip}"));
        }
        return Ok(VerifiedUrl {
            host,
            addr: std::net::SocketAddr::new(ip, port),
        });
    }

    let addrs: Vec<std::net::SocketAddr> = tokio::net::lookup_host(format!("{host}:{port}"))
        .await
        .map_err(|e| format!("DNS resolution failed for {host}: {e}"))?
        .collect();

    if addrs.is_empty() {
        return Err(format!("DNS resolution returned no addresses for {host}"));
    }

    if !dev_mode {
        for addr in &addrs {
            if is_private_ip(&addr.ip()) {
                return Err(format!(
                    "DNS for {host} resolved to private address {}",
                    addr.ip()
                ));
            }
        }
    }

    Ok(VerifiedUrl {
        host,
        addr: addrs[0],
    })
}
