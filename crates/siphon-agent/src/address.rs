//! Advertised address discovery

use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, warn};

/// Preference class of an interface address, lower is better
fn rank(ip: &Ipv4Addr) -> u8 {
    if ip.is_loopback() {
        2
    } else if ip.is_private() || ip.is_link_local() {
        1
    } else {
        0
    }
}

/// Pick the best IPv4 address: public, then private, then loopback
pub fn pick_address(candidates: &[IpAddr]) -> Option<Ipv4Addr> {
    candidates
        .iter()
        .filter_map(|ip| match ip {
            IpAddr::V4(v4) if !v4.is_unspecified() => Some(*v4),
            _ => None,
        })
        .min_by_key(rank)
}

/// Address the coordinator should use to reach this agent's endpoint
///
/// An explicit host wins; otherwise local interfaces are probed.
pub fn advertise_addr(explicit: Option<&str>, port: u16) -> String {
    if let Some(host) = explicit.filter(|h| !h.trim().is_empty()) {
        return format!("{host}:{port}");
    }

    let candidates: Vec<IpAddr> = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces.iter().map(|i| i.ip()).collect(),
        Err(e) => {
            warn!(error = %e, "Could not list network interfaces");
            Vec::new()
        }
    };
    let host = pick_address(&candidates).unwrap_or(Ipv4Addr::LOCALHOST);
    debug!(%host, candidates = candidates.len(), "Discovered advertise address");
    format!("{host}:{port}")
}
