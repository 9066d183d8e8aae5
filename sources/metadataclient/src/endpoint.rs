//! Textual host replacement for registry endpoints.
//!
//! `url::Url` normalizes what it serializes (it adds a `/` path to `http://host:port`, for
//! one), and the endpoint is handed to other programs as configured, so the host is spliced into
//! the original text instead.

use std::net::IpAddr;
use std::ops::Range;

/// Returns the byte range of the host in `endpoint`, which must have a `scheme://` prefix.
fn host_span(endpoint: &str) -> Option<Range<usize>> {
    let authority_start = endpoint.find("://")? + 3;
    let rest = &endpoint[authority_start..];
    let authority_len = rest
        .find(|c| matches!(c, '/' | '?' | '#'))
        .unwrap_or(rest.len());
    let authority = &rest[..authority_len];

    let host_start = authority.rfind('@').map(|i| i + 1).unwrap_or(0);
    let host_and_port = &authority[host_start..];
    let host_len = if host_and_port.starts_with('[') {
        host_and_port.find(']')? + 1
    } else {
        host_and_port.find(':').unwrap_or(host_and_port.len())
    };
    if host_len == 0 {
        return None;
    }

    let start = authority_start + host_start;
    Some(start..start + host_len)
}

/// Returns `endpoint` with its host replaced by `ip`, leaving every other character as it was.
pub(crate) fn replace_host(endpoint: &str, ip: IpAddr) -> Option<String> {
    let span = host_span(endpoint)?;
    let host = match ip {
        IpAddr::V4(ip) => ip.to_string(),
        IpAddr::V6(ip) => format!("[{}]", ip),
    };
    Some(format!(
        "{}{}{}",
        &endpoint[..span.start],
        host,
        &endpoint[span.end..]
    ))
}
