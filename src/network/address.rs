use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

/// Networks accepted by [`resolve`]. Only stream semantics over IPv4 exist.
pub const SUPPORTED_NETWORKS: [&str; 2] = ["tcp", "tcp4"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("missing port in address {0:?}")]
    MissingPort(String),

    #[error("too many colons in address {0:?}")]
    TooManyColons(String),

    #[error("expected 4 octets in address {address:?}, found {found}")]
    OctetCount { address: String, found: usize },

    #[error("could not parse IP octet {octet:?} in address {address:?}")]
    InvalidOctet { address: String, octet: String },

    #[error("could not parse port {port:?} in address {address:?}")]
    InvalidPort { address: String, port: String },

    #[error("unsupported network {0:?}")]
    UnsupportedNetwork(String),
}

/// An IPv4 host and port.
///
/// The text the address was resolved from is kept for display, but equality
/// and hashing only look at the IP bytes and the port, so a resolved address
/// and the same endpoint decoded from the provider compare equal.
#[derive(Debug, Clone, Eq)]
pub struct SocketAddress {
    ip: [u8; 4],
    port: u16,
    text: String,
}

impl SocketAddress {
    pub fn new(ip: [u8; 4], port: u16) -> Self {
        let text = format!("{}.{}.{}.{}:{}", ip[0], ip[1], ip[2], ip[3], port);
        SocketAddress { ip, port, text }
    }

    /// Parses `"a.b.c.d:port"`.
    pub fn parse(address: &str) -> Result<Self, AddressParseError> {
        let mut parts = address.split(':');
        let host = parts.next().unwrap_or_default();
        let port = parts
            .next()
            .filter(|port| !port.is_empty())
            .ok_or_else(|| AddressParseError::MissingPort(address.to_string()))?;
        if parts.next().is_some() {
            return Err(AddressParseError::TooManyColons(address.to_string()));
        }

        let octets: Vec<&str> = host.split('.').collect();
        if octets.len() != 4 {
            return Err(AddressParseError::OctetCount {
                address: address.to_string(),
                found: octets.len(),
            });
        }
        let mut ip = [0u8; 4];
        for (slot, octet) in ip.iter_mut().zip(&octets) {
            *slot = parse_decimal(octet).ok_or_else(|| AddressParseError::InvalidOctet {
                address: address.to_string(),
                octet: octet.to_string(),
            })?;
        }

        let port = parse_decimal(port).ok_or_else(|| AddressParseError::InvalidPort {
            address: address.to_string(),
            port: port.to_string(),
        })?;

        Ok(SocketAddress {
            ip,
            port,
            text: address.to_string(),
        })
    }

    pub fn ip(&self) -> [u8; 4] {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn network(&self) -> &'static str {
        "tcp"
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn to_socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::from(self.ip), self.port)
    }
}

// `u8::from_str` and friends accept a leading '+', the dotted form does not.
fn parse_decimal<T: FromStr>(text: &str) -> Option<T> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Resolves `address` for the given `network`.
///
/// Only `"tcp"` and `"tcp4"` are accepted as networks; the address must be a
/// dotted-decimal IPv4 host followed by a decimal port, e.g. `"127.0.0.1:1234"`.
pub fn resolve(network: &str, address: &str) -> Result<SocketAddress, AddressParseError> {
    if !SUPPORTED_NETWORKS.contains(&network) {
        return Err(AddressParseError::UnsupportedNetwork(network.to_string()));
    }
    SocketAddress::parse(address)
}

impl PartialEq for SocketAddress {
    fn eq(&self, other: &Self) -> bool {
        self.ip == other.ip && self.port == other.port
    }
}

impl Hash for SocketAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ip.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for SocketAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SocketAddress::parse(s)
    }
}

impl From<SocketAddrV4> for SocketAddress {
    fn from(addr: SocketAddrV4) -> Self {
        SocketAddress::new(addr.ip().octets(), addr.port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_loopback() {
        let addr = resolve("tcp", "127.0.0.1:1234").unwrap();
        assert_eq!(addr.ip(), [127, 0, 0, 1]);
        assert_eq!(addr.port(), 1234);
        assert_eq!(addr.to_string(), "127.0.0.1:1234");
    }

    #[test]
    fn keeps_original_text_but_compares_by_value() {
        let padded = SocketAddress::parse("010.000.000.001:0080").unwrap();
        let plain = SocketAddress::new([10, 0, 0, 1], 80);
        assert_eq!(padded.as_str(), "010.000.000.001:0080");
        assert_eq!(plain.as_str(), "10.0.0.1:80");
        assert_eq!(padded, plain);
    }

    #[test]
    fn rejects_other_networks() {
        assert_eq!(
            resolve("udp", "127.0.0.1:53"),
            Err(AddressParseError::UnsupportedNetwork("udp".into()))
        );
        assert!(resolve("tcp4", "127.0.0.1:53").is_ok());
    }

    #[test]
    fn rejects_signed_components() {
        assert!(SocketAddress::parse("+1.2.3.4:5").is_err());
        assert!(SocketAddress::parse("1.2.3.4:+5").is_err());
    }

    #[test]
    fn std_conversion() {
        let addr = SocketAddress::new([192, 168, 1, 20], 8080);
        let std_addr = addr.to_socket_addr();
        assert_eq!(std_addr.to_string(), "192.168.1.20:8080");
        assert_eq!(SocketAddress::from(std_addr), addr);
    }
}
