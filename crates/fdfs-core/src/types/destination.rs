//! Peer server address

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{PoolError, Result};

/// An (address, port) pair identifying a remote tracker or storage server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub address: String,
    pub port: u16,
}

impl Destination {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// The address as IPv4, the only family the connection pool keys on
    pub fn ipv4(&self) -> Result<Ipv4Addr> {
        self.address.parse().map_err(|_| {
            PoolError::InvalidDestination(format!("{} is not an IPv4 address", self.address))
        })
    }

    /// Resolve to a socket address without DNS
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.address.parse().map_err(|_| {
            PoolError::InvalidDestination(format!("{} is not an IP address", self.address))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

impl FromStr for Destination {
    type Err = PoolError;

    /// Parse `ip:port`
    fn from_str(s: &str) -> Result<Self> {
        let (address, port) = s
            .rsplit_once(':')
            .ok_or_else(|| PoolError::InvalidDestination(format!("missing port in {}", s)))?;
        let port = port
            .parse()
            .map_err(|_| PoolError::InvalidDestination(format!("bad port in {}", s)))?;
        Ok(Self::new(address, port))
    }
}

impl From<SocketAddr> for Destination {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}
