use std::fmt;
use std::net::Ipv4Addr;

use fdfs_core::{Destination, Result};

const KEY_CAPACITY: usize = 4 + 5;

/// Canonical pool key: 4 address bytes followed by the ASCII decimal port.
///
/// Fixed-width and allocation free, so hashing and equality are cheap.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DestinationKey {
    bytes: [u8; KEY_CAPACITY],
    len: u8,
}

impl DestinationKey {
    pub fn new(destination: &Destination) -> Result<Self> {
        let ip = destination.ipv4()?;

        let mut bytes = [0u8; KEY_CAPACITY];
        bytes[..4].copy_from_slice(&ip.octets());
        let digits = write_port(&mut bytes[4..], destination.port);

        Ok(Self {
            bytes,
            len: (4 + digits) as u8,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3])
    }

    fn port(&self) -> &str {
        std::str::from_utf8(&self.bytes[4..self.len as usize]).unwrap_or("?")
    }
}

/// Write `port` in decimal at the start of `out`, returning the digit count
fn write_port(out: &mut [u8], port: u16) -> usize {
    let mut digits = [0u8; 5];
    let mut start = digits.len();
    let mut rest = port;
    loop {
        start -= 1;
        digits[start] = b'0' + (rest % 10) as u8;
        rest /= 10;
        if rest == 0 {
            break;
        }
    }

    let count = digits.len() - start;
    out[..count].copy_from_slice(&digits[start..]);
    count
}

impl fmt::Debug for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DestinationKey({}:{})", self.ip(), self.port())
    }
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip(), self.port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdfs_core::PoolError;

    #[test]
    fn test_layout() {
        let key = DestinationKey::new(&Destination::new("10.1.2.3", 23000)).unwrap();
        assert_eq!(key.as_bytes(), b"\x0a\x01\x02\x0323000");
        assert_eq!(key.to_string(), "10.1.2.3:23000");
    }

    #[test]
    fn test_port_digits() {
        for port in [0u16, 7, 80, 22122, 65535] {
            let key = DestinationKey::new(&Destination::new("127.0.0.1", port)).unwrap();
            assert_eq!(&key.as_bytes()[4..], port.to_string().as_bytes());
            assert_eq!(key.to_string(), format!("127.0.0.1:{port}"));
        }
    }

    #[test]
    fn test_distinct_ports() {
        let a = DestinationKey::new(&Destination::new("10.1.2.3", 22122)).unwrap();
        let b = DestinationKey::new(&Destination::new("10.1.2.3", 23000)).unwrap();
        let c = DestinationKey::new(&Destination::new("10.1.2.3", 22122)).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_rejects_hostnames() {
        let err = DestinationKey::new(&Destination::new("tracker", 22122)).unwrap_err();
        assert!(matches!(err, PoolError::InvalidDestination(_)));
    }
}
