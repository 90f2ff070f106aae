//! Port selection and dev-server URL preparation.

use std::net::{Ipv4Addr, SocketAddr, TcpListener, UdpSocket};

use serde::Serialize;

use crate::error::ConfigError;

/// How far above the preferred port to scan when it is taken.
const PORT_SCAN_RANGE: u16 = 100;

/// Display and browser URLs for a running dev server.
#[derive(Debug, Clone, Serialize)]
pub struct DevUrls {
    /// The URL printed as "Local" and opened in the browser.
    pub local_url: String,
    /// The URL printed as "On Your Network", when one exists.
    pub lan_url: Option<String>,
    /// Bare LAN address, used for host-header checking.
    pub lan_host: Option<String>,
}

/// Pick the port to bind.
///
/// The preferred port is used when free. When it is taken and the session
/// is interactive, the next free port within [`PORT_SCAN_RANGE`] above it
/// is chosen instead (the caller announces the substitution). In
/// non-interactive sessions a taken port is an error.
pub fn choose_port(host: &str, preferred: u16, interactive: bool) -> Result<u16, ConfigError> {
    if is_port_free(host, preferred) {
        return Ok(preferred);
    }

    if interactive {
        for offset in 1..=PORT_SCAN_RANGE {
            let Some(candidate) = preferred.checked_add(offset) else {
                break;
            };
            if is_port_free(host, candidate) {
                return Ok(candidate);
            }
        }
    }

    Err(ConfigError::PortUnavailable {
        host: host.to_string(),
        port: preferred,
    })
}

fn is_port_free(host: &str, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok()
}

/// Compute the URLs to show and open for a server bound to `host:port`.
///
/// Unspecified bind addresses (`0.0.0.0`, `::`) are displayed as
/// `localhost`, and the machine's LAN address is reported alongside when
/// it falls in a private range.
#[must_use]
pub fn prepare_urls(protocol: &str, host: &str, port: u16, pathname: &str) -> DevUrls {
    let unspecified = host == "0.0.0.0" || host == "::";
    let pretty_host = if unspecified { "localhost" } else { host };

    let lan_host = if unspecified {
        lan_ip()
            .filter(Ipv4Addr::is_private)
            .map(|ip| ip.to_string())
    } else {
        None
    };
    let lan_url = lan_host
        .as_deref()
        .map(|lan| format_url(protocol, lan, port, pathname));

    DevUrls {
        local_url: format_url(protocol, pretty_host, port, pathname),
        lan_url,
        lan_host,
    }
}

fn format_url(protocol: &str, host: &str, port: u16, pathname: &str) -> String {
    format!("{protocol}://{host}:{port}{pathname}")
}

/// Address of the interface that would route to the LAN, if any.
///
/// Connecting a UDP socket never sends a packet; it only asks the OS to
/// pick a source address.
fn lan_ip() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).ok()?;
    socket.connect(("10.254.254.254", 1)).ok()?;
    match socket.local_addr().ok()? {
        SocketAddr::V4(addr) => Some(*addr.ip()),
        SocketAddr::V6(_) => None,
    }
}
