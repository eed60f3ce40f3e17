// Listener address parsing
//
// Addresses take the form `[network/]host:port[-end]`. The network defaults to `tcp`; unix
// socket networks carry a path in place of the host and have no port.

use std::fmt::Display;

use crate::error::AutoHttpsError;

/// The network used when an address does not name one
pub const DEFAULT_NETWORK: &str = "tcp";

const KNOWN_NETWORKS: [&str; 9] = [
    "tcp",
    "tcp4",
    "tcp6",
    "udp",
    "udp4",
    "udp6",
    "unix",
    "unixgram",
    "unixpacket",
];

/// A structured listener address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedAddress {
    /// The network type, e.g. `tcp` or `unix`
    pub network: String,

    /// The interface host; empty means every interface
    pub host: String,

    /// First port of the range (inclusive)
    pub start_port: u16,

    /// Last port of the range (inclusive)
    pub end_port: u16,
}

impl ParsedAddress {
    /// Whether the address is a unix socket
    pub fn is_unix_network(&self) -> bool {
        is_unix_network(&self.network)
    }

    /// Whether the address is bound through TCP
    pub fn is_tcp_network(&self) -> bool {
        self.network.starts_with("tcp")
    }

    /// Number of ports covered by the address
    pub fn port_range_size(&self) -> u32 {
        if self.is_unix_network() {
            return 1;
        }
        u32::from(self.end_port - self.start_port) + 1
    }

    /// Whether `port` falls within the address's port range
    pub fn covers_port(&self, port: u16) -> bool {
        !self.is_unix_network() && (self.start_port..=self.end_port).contains(&port)
    }

    /// Returns a copy of the address collapsed to a single port
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            network: self.network.clone(),
            host: self.host.clone(),
            start_port: port,
            end_port: port,
        }
    }

    /// Expands a port range into one `host:port` string per port, suitable for binding
    pub fn expand(&self) -> Vec<String> {
        if self.is_unix_network() {
            return vec![self.host.clone()];
        }

        (self.start_port..=self.end_port)
            .map(|port| join_host_port(&self.host, &port.to_string()))
            .collect()
    }
}

impl Display for ParsedAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.network.is_empty() {
            write!(f, "{}/", self.network)?;
        }

        if self.is_unix_network() {
            return write!(f, "{}", self.host);
        }

        let port = if self.start_port == self.end_port {
            self.start_port.to_string()
        } else {
            format!("{}-{}", self.start_port, self.end_port)
        };
        write!(f, "{}", join_host_port(&self.host, &port))
    }
}

fn is_unix_network(network: &str) -> bool {
    matches!(network, "unix" | "unixgram" | "unixpacket")
}

fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Parses a listener address into its structured form
pub fn parse_network_address(address: &str) -> Result<ParsedAddress, AutoHttpsError> {
    let invalid = |message: &str| AutoHttpsError::InvalidAddress {
        address: address.to_string(),
        message: message.to_string(),
    };

    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(invalid("address is empty"));
    }

    let (network, rest) = match trimmed.split_once('/') {
        Some((network, rest)) if KNOWN_NETWORKS.contains(&network.to_lowercase().as_str()) => {
            (network.to_lowercase(), rest)
        }
        _ => (DEFAULT_NETWORK.to_string(), trimmed),
    };

    if is_unix_network(&network) {
        if rest.is_empty() {
            return Err(invalid("unix socket address requires a path"));
        }
        return Ok(ParsedAddress {
            network,
            host: rest.to_string(),
            start_port: 0,
            end_port: 0,
        });
    }

    let (host, port) = split_host_port(rest).ok_or_else(|| invalid("missing port"))?;
    if host.contains('/') {
        return Err(invalid("unknown network"));
    }

    let (start_port, end_port) = match port.split_once('-') {
        Some((start, end)) => (parse_port(start), parse_port(end)),
        None => (parse_port(port), parse_port(port)),
    };
    let (Some(start_port), Some(end_port)) = (start_port, end_port) else {
        return Err(invalid("invalid port"));
    };
    if start_port > end_port {
        return Err(invalid("start port must not exceed end port"));
    }

    Ok(ParsedAddress {
        network,
        host: host.to_string(),
        start_port,
        end_port,
    })
}

fn split_host_port(input: &str) -> Option<(&str, &str)> {
    if let Some(bracketed) = input.strip_prefix('[') {
        let (host, rest) = bracketed.split_once(']')?;
        let port = rest.strip_prefix(':')?;
        return Some((host, port));
    }

    let (host, port) = input.rsplit_once(':')?;
    // an unbracketed IPv6 literal is ambiguous
    if host.contains(':') {
        return None;
    }
    Some((host, port))
}

fn parse_port(input: &str) -> Option<u16> {
    input.trim().parse::<u16>().ok()
}
