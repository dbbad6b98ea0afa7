// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in parts derived from `smoltcp` originally distributed under 0-clause BSD
use core::fmt;

enum_with_unknown! {
    /// The protocol field of an IP packet, as dispatched to upper layers.
    pub enum Protocol(u8) {
        Icmp = 1,
        Tcp = 6,
        /// Reserved for experimentation and testing (RFC 3692).
        Testing0 = 253,
        /// Reserved for experimentation and testing (RFC 3692).
        Testing1 = 254,
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Testing0 | Protocol::Testing1 => write!(f, "testing"),
            Protocol::Unknown(id) => write!(f, "0x{:02x}", id),
        }
    }
}

/// A four-octet IPv4 address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 4]);

impl Address {
    /// The unspecified address.
    pub const UNSPECIFIED: Address = Address([0; 4]);

    /// Construct an address from its four octets, in big-endian.
    pub const fn new(a0: u8, a1: u8, a2: u8, a3: u8) -> Address {
        Address([a0, a1, a2, a3])
    }

    /// Construct an address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not four octets long.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(data);
        Address(bytes)
    }

    /// Return the address as a sequence of octets, in big-endian.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Query whether the address is the unspecified address.
    pub fn is_unspecified(&self) -> bool {
        self.0 == [0; 4]
    }
}

#[cfg(feature = "std")]
impl From<std::net::Ipv4Addr> for Address {
    fn from(addr: std::net::Ipv4Addr) -> Address {
        Address(addr.octets())
    }
}

#[cfg(feature = "std")]
impl From<Address> for std::net::Ipv4Addr {
    fn from(Address(octets): Address) -> std::net::Ipv4Addr {
        octets.into()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = self.0;
        write!(f, "{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

/// An internet endpoint address: an IP address and a port.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Endpoint {
    /// The host address.
    pub addr: Address,
    /// The port, in host order.
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint address from given address and port.
    pub const fn new(addr: Address, port: u16) -> Endpoint {
        Endpoint { addr, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

impl<T: Into<Address>> From<(T, u16)> for Endpoint {
    fn from((addr, port): (T, u16)) -> Endpoint {
        Endpoint { addr: addr.into(), port }
    }
}

pub(crate) mod checksum {
    use byteorder::{ByteOrder, NetworkEndian};

    use super::{Address, Protocol};

    fn propagate_carries(word: u32) -> u16 {
        let sum = (word >> 16) + (word & 0xffff);
        ((sum >> 16) as u16) + (sum as u16)
    }

    /// Compute an RFC 1071 compliant checksum (without the final complement).
    pub(crate) fn data(mut data: &[u8]) -> u16 {
        let mut accum = 0u32;

        while data.len() >= 2 {
            accum += NetworkEndian::read_u16(data) as u32;
            accum = (accum >> 16) + (accum & 0xffff);
            data = &data[2..];
        }

        // the last remaining odd byte, if any
        if let Some(&value) = data.first() {
            accum += (value as u32) << 8;
        }

        propagate_carries(accum)
    }

    /// Combine several RFC 1071 compliant checksums.
    pub(crate) fn combine(checksums: &[u16]) -> u16 {
        let mut accum: u32 = 0;
        for &word in checksums {
            accum += word as u32;
        }
        propagate_carries(accum)
    }

    /// Compute the 96-bit pseudo header checksum covering both addresses,
    /// the protocol and the upper-layer length.
    pub(crate) fn pseudo_header(
        src_addr: &Address,
        dst_addr: &Address,
        protocol: Protocol,
        length: u32,
    ) -> u16 {
        let mut proto_len = [0u8; 4];
        proto_len[1] = protocol.into();
        NetworkEndian::write_u16(&mut proto_len[2..4], length as u16);

        combine(&[
            data(src_addr.as_bytes()),
            data(dst_addr.as_bytes()),
            data(&proto_len[..]),
        ])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn address_display() {
        assert_eq!(format!("{}", Address::new(192, 168, 0, 1)), "192.168.0.1");
        assert_eq!(format!("{}", Endpoint::new(Address::new(10, 0, 0, 2), 80)), "10.0.0.2:80");
    }

    #[test]
    fn protocol_round_trip() {
        assert_eq!(Protocol::from(6u8), Protocol::Tcp);
        assert_eq!(u8::from(Protocol::Tcp), 6);
        assert_eq!(Protocol::from(99u8), Protocol::Unknown(99));
        assert_eq!(u8::from(Protocol::Unknown(99)), 99);
    }

    #[test]
    fn checksum_data() {
        // RFC 1071 running example: the words 0x0001 ... 0x0004
        let bytes = [0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04];
        assert_eq!(checksum::data(&bytes), 0x000a);
        // odd trailing byte is padded on the right
        let bytes = [0x00, 0x01, 0xf2];
        assert_eq!(checksum::data(&bytes), 0xf201);
    }

    #[test]
    fn checksum_carry() {
        let bytes = [0xff, 0xff, 0x00, 0x02];
        assert_eq!(checksum::data(&bytes), 0x0002);
    }
}
