use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::{Error, Result};

/// smallest subnet AWS allows in a vpc.
pub const MIN_SUBNET_PREFIX: u8 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: u32,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(Error::invalid_config("vpcCidrBlock", format!("invalid prefix length /{prefix}")));
        }
        let network = u32::from(addr) & Self::mask(prefix);
        Ok(Self { network, prefix })
    }

    fn mask(prefix: u8) -> u32 {
        if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) }
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    /// carve this block into `count` equally sized subnets, the same way
    /// every subnet group and availability zone gets an equal share.
    /// the subnet size is the largest power of two that fits `count` times.
    pub fn split(&self, count: usize) -> Result<Vec<Ipv4Cidr>> {
        if count == 0 {
            return Ok(vec![]);
        }
        let extra_bits = count.next_power_of_two().trailing_zeros() as u8;
        let prefix = self.prefix + extra_bits;
        if prefix > MIN_SUBNET_PREFIX {
            return Err(Error::invalid_config(
                "vpcCidrBlock",
                format!("{self} is too small to hold {count} subnets (each would be a /{prefix}, minimum is /{MIN_SUBNET_PREFIX})"),
            ));
        }
        let step = 1u64 << (32 - prefix);
        Ok((0..count as u64)
            .map(|i| Ipv4Cidr { network: (self.network as u64 + i * step) as u32, prefix })
            .collect())
    }
}

impl FromStr for Ipv4Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::invalid_config("vpcCidrBlock", format!("{s:?} is not an ipv4 cidr block, eg: 10.0.0.0/16"));
        let (addr, prefix) = s.trim().split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        Self::new(addr, prefix)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix)
    }
}

/// `10.0.0.1/32` -> `10.0.0.1`. Values without a mask are returned as is.
pub fn strip_mask(ip: &str) -> &str {
    match ip.rsplit_once('/') {
        Some((addr, mask)) if !mask.is_empty() && mask.chars().all(|c| c.is_ascii_digit()) => addr,
        _ => ip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_subnets_of_a_slash_16() {
        let cidr: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        let subnets = cidr.split(6).unwrap();
        let rendered: Vec<String> = subnets.iter().map(|s| s.to_string()).collect();
        assert_eq!(rendered, vec![
            "10.0.0.0/19",
            "10.0.32.0/19",
            "10.0.64.0/19",
            "10.0.96.0/19",
            "10.0.128.0/19",
            "10.0.160.0/19",
        ]);
    }

    #[test]
    fn host_bits_are_masked() {
        let cidr: Ipv4Cidr = "172.16.5.9/16".parse().unwrap();
        assert_eq!(cidr.to_string(), "172.16.0.0/16");
    }

    #[test]
    fn block_too_small() {
        let cidr: Ipv4Cidr = "10.0.0.0/26".parse().unwrap();
        assert!(cidr.split(6).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!("10.0.0.0".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0/40".parse::<Ipv4Cidr>().is_err());
        assert!("banana/16".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn strips_masks() {
        assert_eq!(strip_mask("203.0.113.10/32"), "203.0.113.10");
        assert_eq!(strip_mask("198.51.100.7"), "198.51.100.7");
    }
}
