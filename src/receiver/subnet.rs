//! Trusted-subnet perimeter check.

use crate::core::{PromLightError, Result};
use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};

/// Accepts callers whose address lies inside one CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedSubnet {
    net: IpNet,
}

impl TrustedSubnet {
    /// Trust callers inside `net`.
    pub fn new(net: IpNet) -> Self {
        Self { net }
    }

    /// Check a caller.
    ///
    /// The self-reported `real_ip` wins over the socket peer. A caller with no
    /// usable address is untrusted.
    pub fn check(&self, real_ip: Option<&str>, peer: Option<SocketAddr>) -> Result<()> {
        let (raw, ip) = match real_ip.map(str::trim).filter(|ip| !ip.is_empty()) {
            Some(raw) => (raw.to_string(), raw.parse::<IpAddr>().ok()),
            None => match peer {
                Some(peer) => (peer.to_string(), Some(peer.ip())),
                None => ("unknown".to_string(), None),
            },
        };

        match ip {
            Some(ip) if self.net.contains(&ip) => Ok(()),
            _ => {
                tracing::warn!("Rejected request from untrusted address {}", raw);
                Err(PromLightError::Untrusted(raw))
            },
        }
    }
}
