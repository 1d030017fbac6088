//! Hostname wildcard matching and specificity ranking.

use anyhow::{bail, Result};

/// Marker recorded when a hostname-less listener accepts a hostname-less
/// route: every server name matches.
pub const WILDCARD: &str = "~^";

/// Checks whether a listener hostname admits a route hostname.
///
/// Either side may carry a single leading `*.` wildcard, which matches one
/// or more additional leading labels.
pub fn matches(listener: &str, route: &str) -> bool {
    if listener == route {
        return true;
    }
    if let Some(suffix) = listener.strip_prefix('*') {
        // "*.example.com" admits "foo.example.com" but not "example.com".
        if route.len() > suffix.len() && route.ends_with(suffix) {
            return true;
        }
    }
    if let Some(suffix) = route.strip_prefix('*') {
        if listener.len() > suffix.len() && listener.ends_with(suffix) {
            return true;
        }
    }
    false
}

/// Returns the more specific of two matching hostnames.
///
/// A non-wildcard hostname beats a wildcard; between two wildcards the one
/// with more labels wins.
pub fn more_specific<'a>(a: &'a str, b: &'a str) -> &'a str {
    let a_wild = a.starts_with("*.");
    let b_wild = b.starts_with("*.");
    match (a_wild, b_wild) {
        (false, true) => a,
        (true, false) => b,
        _ => {
            let labels = |h: &str| h.chars().filter(|c| *c == '.').count();
            if labels(b) > labels(a) {
                b
            } else {
                a
            }
        }
    }
}

/// Checks whether two listener hostnames admit a common server name. An
/// absent hostname admits everything.
pub fn overlap(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => matches(a, b) || matches(b, a),
        _ => true,
    }
}

/// Validates hostname syntax: a DNS subdomain with at most one leading
/// `*.` wildcard, no port, and no IP address.
pub fn validate(hostname: &str) -> Result<()> {
    if hostname.is_empty() {
        bail!("hostname cannot be empty");
    }
    if hostname.contains(':') {
        bail!("hostname {hostname:?} cannot contain a port");
    }
    if hostname == "*" {
        bail!("bare wildcard {hostname:?} is not supported");
    }

    let subject = hostname.strip_prefix("*.").unwrap_or(hostname);
    if subject.contains('*') {
        bail!("hostname {hostname:?} may only use a single leading wildcard label");
    }
    if subject.len() > 253 {
        bail!("hostname {hostname:?} is longer than 253 characters");
    }
    for label in subject.split('.') {
        if label.is_empty() || label.len() > 63 {
            bail!("hostname {hostname:?} contains an invalid label {label:?}");
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            bail!("hostname {hostname:?} contains an invalid label {label:?}");
        }
        if label.starts_with('-') || label.ends_with('-') {
            bail!("hostname {hostname:?} contains an invalid label {label:?}");
        }
    }
    if subject.split('.').all(|l| l.chars().all(|c| c.is_ascii_digit())) {
        bail!("hostname {hostname:?} must not be an IP address");
    }

    Ok(())
}
