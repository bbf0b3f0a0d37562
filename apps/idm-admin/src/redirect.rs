//! Redirect URIs derived from this host's address.

use std::net::IpAddr;

use crate::config::RedirectConfig;

/// Octet used when no IPv4 address can be determined.
const FALLBACK_OCTET: u8 = 1;

/// Last octet of the primary IPv4 address, if it is not a loopback address.
fn detect_last_octet() -> Option<u8> {
    match local_ip_address::local_ip() {
        Ok(IpAddr::V4(ip)) if !ip.is_loopback() => Some(ip.octets()[3]),
        Ok(ip) => {
            tracing::debug!(ip = %ip, "primary address is not a routable IPv4 address");
            None
        }
        Err(e) => {
            tracing::debug!(error = %e, "local IPv4 address lookup failed");
            None
        }
    }
}

/// Octet precedence: explicit value, then detection, then [`FALLBACK_OCTET`].
pub fn resolve_last_octet(explicit: Option<u8>) -> u8 {
    explicit.or_else(detect_last_octet).unwrap_or_else(|| {
        tracing::warn!(octet = FALLBACK_OCTET, "no IPv4 address found for redirect host");
        FALLBACK_OCTET
    })
}

/// `(redirect_uris, post_logout_uris)` for `octet`.
#[must_use]
pub fn redirect_uris(config: &RedirectConfig, octet: u8) -> (Vec<String>, Vec<String>) {
    let base = config
        .host_template
        .replace("{octet}", &octet.to_string())
        .trim_end_matches('/')
        .to_owned();
    (
        vec![format!("{base}{}", config.callback_path)],
        vec![format!("{base}{}", config.post_logout_path)],
    )
}
