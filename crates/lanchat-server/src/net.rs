use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Best guess at this machine's LAN address, for the startup banner.
///
/// Connecting a UDP socket sends no packets; it only makes the OS pick the
/// outgoing interface, whose address we then read back.
pub fn lan_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).ok()?;
    socket.connect(("8.8.8.8", 80)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if is_lan_candidate(ip) => Some(ip),
        _ => None,
    }
}

/// Skip loopback, unspecified and 169.254/16 (assigned when DHCP fails).
fn is_lan_candidate(ip: Ipv4Addr) -> bool {
    !ip.is_loopback() && !ip.is_unspecified() && !ip.is_link_local()
}
