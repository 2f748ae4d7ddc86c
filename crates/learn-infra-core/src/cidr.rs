// IPv4 CIDR arithmetic for carving subnets out of a VPC block

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::SynthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// The `index`th block of size `/mask` inside this block
    pub fn subnet(&self, mask: u8, index: u32) -> Result<Ipv4Cidr, SynthError> {
        let out_of_range = || SynthError::SubnetOutOfRange {
            cidr: self.to_string(),
            mask,
            index,
        };

        if mask < self.prefix || mask > 32 {
            return Err(out_of_range());
        }
        let available = 1u64 << (mask - self.prefix);
        if u64::from(index) >= available {
            return Err(out_of_range());
        }

        // A /0 step is 2^32, so the arithmetic runs in u64
        let step = 1u64 << (32 - mask);
        let base = u64::from(u32::from(self.network)) + u64::from(index) * step;
        let base = u32::try_from(base).map_err(|_| out_of_range())?;
        Ok(Ipv4Cidr {
            network: Ipv4Addr::from(base),
            prefix: mask,
        })
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SynthError::InvalidCidr(s.to_string());

        let (addr, prefix) = s.split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        if prefix > 32 {
            return Err(invalid());
        }

        // Host bits must be zero
        let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
        if u32::from(addr) & !mask != 0 {
            return Err(invalid());
        }

        Ok(Ipv4Cidr {
            network: addr,
            prefix,
        })
    }
}
