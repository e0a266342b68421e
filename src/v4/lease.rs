//! The lease record handed back to the caller.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::v4::message::Message;
use crate::v4::options::DhcpOption;

/// Network parameters granted by the server's ACK.
///
/// Constructed once from the ACK and never mutated; the caller owns it
/// outright after [`get_lease`](crate::DhcpClient::get_lease) returns. Fields
/// the server did not supply are `None`; every option the ACK carried,
/// interpreted or not, is retained in [`options`](Self::options).
#[derive(Debug, Clone)]
pub struct Lease {
    /// The address assigned to the client (yiaddr).
    pub client_ip: Ipv4Addr,
    pub subnet_mask: Option<Ipv4Addr>,
    pub routers: Option<Vec<Ipv4Addr>>,
    pub dns_servers: Option<Vec<Ipv4Addr>>,
    /// The granting server's identifier (option 54).
    pub server: Option<Ipv4Addr>,
    pub lease_duration: Option<Duration>,
    /// Renewal time T1.
    pub renewal_time: Option<Duration>,
    /// Rebinding time T2.
    pub rebinding_time: Option<Duration>,
    /// The raw option set received in the ACK.
    pub options: Vec<DhcpOption>,
}

impl Lease {
    /// Extracts the lease from a matching ACK.
    pub(crate) fn from_ack(ack: &Message) -> Self {
        Self {
            client_ip: ack.yiaddr,
            subnet_mask: ack.subnet_mask(),
            routers: ack.routers().map(<[Ipv4Addr]>::to_vec),
            dns_servers: ack.dns_servers().map(<[Ipv4Addr]>::to_vec),
            server: ack.server_identifier(),
            lease_duration: ack.lease_time().map(u64::from).map(Duration::from_secs),
            renewal_time: ack.renewal_time().map(u64::from).map(Duration::from_secs),
            rebinding_time: ack.rebinding_time().map(u64::from).map(Duration::from_secs),
            options: ack.options.clone(),
        }
    }
}

impl fmt::Display for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lease {}", self.client_ip)?;
        if let Some(mask) = self.subnet_mask {
            write!(f, "/{mask}")?;
        }
        if let Some(server) = self.server {
            write!(f, " from {server}")?;
        }
        if let Some(duration) = self.lease_duration {
            write!(f, " for {}s", duration.as_secs())?;
        }
        Ok(())
    }
}
