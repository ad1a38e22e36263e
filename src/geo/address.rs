//! Address normalization for range lookups
//!
//! Turns raw client input into a [`NormalizedAddress`] whose numeric value
//! lines up with the bounds stored in the range tables:
//! - IPv4 is the 32-bit address widened to `u128`
//! - IPv6 is the full 128-bit value
//! - IPv4-mapped IPv6 (`::ffff:a.b.c.d`) is folded back into IPv4

use serde::{Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use tracing::debug;

/// Address used whenever client input cannot be parsed.
pub const DEFAULT_ADDRESS: Ipv4Addr = Ipv4Addr::LOCALHOST;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),
}

/// IPv4 or IPv6, each with its own range table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub const ALL: [AddressFamily; 2] = [AddressFamily::V4, AddressFamily::V6];

    pub fn as_str(self) -> &'static str {
        match self {
            AddressFamily::V4 => "v4",
            AddressFamily::V6 => "v6",
        }
    }

    /// Largest value a bound may take in this family.
    pub fn max_value(self) -> u128 {
        match self {
            AddressFamily::V4 => u128::from(u32::MAX),
            AddressFamily::V6 => u128::MAX,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AddressFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v4" | "ipv4" | "4" => Ok(AddressFamily::V4),
            "v6" | "ipv6" | "6" => Ok(AddressFamily::V6),
            other => Err(format!("unknown address family '{other}'")),
        }
    }
}

/// A parsed client address in canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NormalizedAddress {
    ip: IpAddr,
}

impl NormalizedAddress {
    pub fn new(ip: IpAddr) -> Self {
        let ip = match ip {
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => IpAddr::V6(v6),
            },
            v4 => v4,
        };
        Self { ip }
    }

    pub fn loopback() -> Self {
        Self::new(IpAddr::V4(DEFAULT_ADDRESS))
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn family(&self) -> AddressFamily {
        match self.ip {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    /// Numeric value comparable against stored range bounds of the same family.
    pub fn value(&self) -> u128 {
        match self.ip {
            IpAddr::V4(v4) => u128::from(u32::from(v4)),
            IpAddr::V6(v6) => u128::from(v6),
        }
    }

    /// Dotted quad for IPv4, uncompressed eight-group form for IPv6.
    pub fn canonical(&self) -> String {
        match self.ip {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => expand_v6(&v6),
        }
    }

    /// Cache key for memoized resolutions of this address.
    pub fn fingerprint(&self) -> String {
        format!("fingerprint/{}", self.canonical())
    }
}

impl fmt::Display for NormalizedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl Serialize for NormalizedAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical())
    }
}

fn expand_v6(addr: &Ipv6Addr) -> String {
    addr.segments()
        .iter()
        .map(|segment| format!("{segment:04x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parse raw input into a [`NormalizedAddress`].
///
/// Accepts surrounding whitespace and bracketed IPv6 literals. Zone ids,
/// ports and anything else `std::net` rejects are invalid.
pub fn normalize(raw: &str) -> Result<NormalizedAddress, AddressError> {
    let trimmed = raw.trim();
    let unbracketed = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);

    unbracketed
        .parse::<IpAddr>()
        .map(NormalizedAddress::new)
        .map_err(|_| AddressError::InvalidAddress(raw.to_string()))
}

/// Like [`normalize`] but substitutes loopback for invalid input.
pub fn normalize_or_default(raw: &str) -> NormalizedAddress {
    match normalize(raw) {
        Ok(addr) => addr,
        Err(e) => {
            debug!(error = %e, "falling back to default address");
            NormalizedAddress::loopback()
        }
    }
}
