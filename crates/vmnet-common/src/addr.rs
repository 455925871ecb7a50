//! Addresses assigned to tap devices.

use ipnet::{IpNet, Ipv4Net};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::error::{VmnetError, VmnetResult};

/// A host address with prefix length, e.g. `172.16.0.1/24`.
///
/// Unlike a network, the host bits are kept: the value is handed to
/// `ip addr add` as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TapAddress(IpNet);

impl TapAddress {
    /// Wrap an already parsed address.
    #[must_use]
    pub const fn new(net: IpNet) -> Self {
        Self(net)
    }

    /// Parse `address/prefix` notation.
    ///
    /// # Errors
    ///
    /// Returns [`VmnetError::InvalidCidr`] when the prefix is missing or
    /// either half does not parse.
    pub fn parse(value: &str) -> VmnetResult<Self> {
        value
            .trim()
            .parse::<IpNet>()
            .map(Self)
            .map_err(|_| VmnetError::InvalidCidr {
                value: value.to_string(),
            })
    }

    /// Address for the `index`-th tap inside a `/16` base.
    ///
    /// The index becomes the third octet and the host is always `.1`:
    /// base `172.20.0.0/16`, index 3 gives `172.20.3.1/24`.
    ///
    /// # Errors
    ///
    /// Returns [`VmnetError::Config`] if `base` is not a `/16`.
    pub fn from_subnet_index(base: Ipv4Net, index: u8) -> VmnetResult<Self> {
        if base.prefix_len() != 16 {
            return Err(VmnetError::Config {
                message: format!("subnet base must be a /16, got {base}"),
            });
        }

        let [a, b, _, _] = base.network().octets();
        let host = Ipv4Addr::new(a, b, index, 1);
        let net = Ipv4Net::new(host, 24).map_err(|e| VmnetError::Config {
            message: e.to_string(),
        })?;
        Ok(Self(IpNet::V4(net)))
    }

    /// Host address part.
    #[must_use]
    pub fn addr(&self) -> IpAddr {
        self.0.addr()
    }

    /// Prefix length.
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    /// Network containing the address (host bits cleared).
    #[must_use]
    pub fn network(&self) -> IpNet {
        self.0.trunc()
    }

    /// Whether this is an IPv4 address.
    #[must_use]
    pub fn is_ipv4(&self) -> bool {
        matches!(self.0, IpNet::V4(_))
    }
}

impl fmt::Display for TapAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TapAddress {
    type Err = VmnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
