//! Conversion between [`SocketAddress`] and the provider's `sockaddr_in`
//! layout.
//!
//! The provider wants the port in network byte order and the IPv4 word in its
//! own little-endian order, so the dotted bytes are packed with
//! `u32::from_le_bytes`. Decoding undoes both steps, including the port swap.

use std::net::SocketAddrV4;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{NetError, NetResult, SocketAddress};
use crate::provider::{host_to_network_short, network_to_host_short, AF_INET};

/// Size of the `sockaddr_in` memory image.
pub const SOCKADDR_IN_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BinarySocketAddress {
    family: u16,
    /// Port in network byte order.
    port: u16,
    /// IPv4 payload as a little-endian word.
    addr: u32,
}

impl BinarySocketAddress {
    pub fn encode(addr: &SocketAddress) -> Self {
        BinarySocketAddress {
            family: AF_INET,
            port: host_to_network_short(addr.port()),
            addr: u32::from_le_bytes(addr.ip()),
        }
    }

    pub fn decode(&self) -> SocketAddress {
        let word = self.addr;
        let ip = [
            word as u8,
            (word >> 8) as u8,
            (word >> 16) as u8,
            (word >> 24) as u8,
        ];
        SocketAddress::new(ip, network_to_host_short(self.port))
    }

    pub fn family(&self) -> u16 {
        self.family
    }

    pub fn port_network_order(&self) -> u16 {
        self.port
    }

    pub fn addr_word(&self) -> u32 {
        self.addr
    }

    /// Serialises the 16-byte `sockaddr_in` image: family, port bytes,
    /// address bytes, zero padding.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(SOCKADDR_IN_LEN);
        buf.put_u16_le(self.family);
        buf.put_slice(&self.port.to_ne_bytes());
        buf.put_u32_le(self.addr);
        buf.put_bytes(0, 8);
        buf.freeze()
    }

    pub fn from_bytes(mut raw: &[u8]) -> NetResult<Self> {
        if raw.len() < SOCKADDR_IN_LEN {
            return Err(NetError::MalformedAddress(format!(
                "sockaddr_in needs {} bytes, got {}",
                SOCKADDR_IN_LEN,
                raw.len()
            )));
        }
        let family = raw.get_u16_le();
        if family != AF_INET {
            return Err(NetError::MalformedAddress(format!(
                "unsupported address family {}",
                family
            )));
        }
        let port = u16::from_ne_bytes([raw.get_u8(), raw.get_u8()]);
        let addr = raw.get_u32_le();
        Ok(BinarySocketAddress { family, port, addr })
    }

    pub fn to_socket_addr(&self) -> SocketAddrV4 {
        self.decode().to_socket_addr()
    }
}

impl From<&SocketAddress> for BinarySocketAddress {
    fn from(addr: &SocketAddress) -> Self {
        BinarySocketAddress::encode(addr)
    }
}

impl From<SocketAddrV4> for BinarySocketAddress {
    fn from(addr: SocketAddrV4) -> Self {
        BinarySocketAddress::encode(&SocketAddress::from(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::resolve;

    #[test]
    fn encodes_port_big_endian_and_address_little_endian() {
        let addr = resolve("tcp", "127.0.0.1:1234").unwrap();
        let bin = BinarySocketAddress::encode(&addr);
        assert_eq!(bin.family(), AF_INET);
        assert_eq!(bin.port_network_order().to_ne_bytes(), [0x04, 0xd2]);
        assert_eq!(bin.addr_word(), 0x0100_007f);
    }

    #[test]
    fn sockaddr_in_image() {
        let addr = resolve("tcp", "127.0.0.1:1234").unwrap();
        let image = BinarySocketAddress::encode(&addr).to_bytes();
        assert_eq!(
            &image[..],
            &[2, 0, 0x04, 0xd2, 127, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]
        );
        let parsed = BinarySocketAddress::from_bytes(&image).unwrap();
        assert_eq!(parsed.decode(), addr);
    }

    #[test]
    fn rejects_short_or_foreign_images() {
        assert!(matches!(
            BinarySocketAddress::from_bytes(&[2, 0, 0, 80]),
            Err(NetError::MalformedAddress(_))
        ));
        let mut image = [0u8; SOCKADDR_IN_LEN];
        image[0] = 10;
        assert!(matches!(
            BinarySocketAddress::from_bytes(&image),
            Err(NetError::MalformedAddress(_))
        ));
    }

    #[test]
    fn decode_reverses_encode() {
        for text in ["0.0.0.0:0", "10.1.2.3:80", "255.255.255.255:65535"] {
            let addr = resolve("tcp", text).unwrap();
            let decoded = BinarySocketAddress::encode(&addr).decode();
            assert_eq!(decoded, addr);
            assert_eq!(decoded.to_string(), text);
        }
    }
}
