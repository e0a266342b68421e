//! DHCP message codec (RFC 2131) and outgoing message builders.
//!
//! A message is a fixed 236-byte BOOTP header, the 4-byte magic cookie
//! `99.130.83.99`, and a TLV option section terminated by option 255.
//! Encoding pads the datagram to the 300-byte RFC 2131 minimum.

use std::net::Ipv4Addr;

use bytes::Bytes;

use crate::error::{LeasewireError, Result};
use crate::v4::options::{encode_options, parse_options, DhcpOption, MessageType, OptionCode};

/// BOOTP operation code for client messages.
pub const BOOT_REQUEST: u8 = 1;

/// BOOTP operation code for server replies.
pub const BOOT_REPLY: u8 = 2;

/// Hardware type for Ethernet.
pub const HTYPE_ETHERNET: u8 = 1;

/// Marks the start of the option section (RFC 1533).
const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];

/// Fixed header size, up to but excluding the magic cookie.
const FIXED_HEADER_SIZE: usize = 236;

/// Smallest decodable message: fixed header plus magic cookie.
const MIN_DECODE_SIZE: usize = FIXED_HEADER_SIZE + MAGIC_COOKIE.len();

/// Minimum legal datagram size per RFC 2131 §2; shorter encodings are padded.
const MIN_MESSAGE_SIZE: usize = 300;

/// Width of the chaddr field in the fixed header.
const CHADDR_FIELD_SIZE: usize = 16;

/// Broadcast bit in the flags field.
const BROADCAST_FLAG: u16 = 0x8000;

/// Option codes the engine always sets itself on outgoing messages.
/// Caller-supplied copies of these are discarded during the merge.
const ENGINE_CONTROLLED_CODES: [u8; 3] = [
    OptionCode::MessageType as u8,
    OptionCode::RequestedIpAddress as u8,
    OptionCode::ServerIdentifier as u8,
];

/// A decoded DHCP message: fixed header fields plus the ordered option list.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// [`BOOT_REQUEST`] or [`BOOT_REPLY`].
    pub op: u8,
    pub htype: u8,
    pub hops: u8,
    /// Transaction ID, chosen by the client and echoed by the server.
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    /// Client IP (only meaningful when renewing).
    pub ciaddr: Ipv4Addr,
    /// "Your" IP: the address the server is handing out.
    pub yiaddr: Ipv4Addr,
    /// Next-server IP.
    pub siaddr: Ipv4Addr,
    /// Relay gateway IP.
    pub giaddr: Ipv4Addr,
    /// Hardware address, at most 16 bytes. Its length becomes `hlen` on the
    /// wire; the field is padded to 16 bytes when encoding.
    pub chaddr: Bytes,
    pub sname: [u8; 64],
    pub file: [u8; 128],
    /// Ordered options. [`insert_option`](Self::insert_option) keeps the
    /// list free of duplicate codes.
    pub options: Vec<DhcpOption>,
}

impl Message {
    /// Creates an empty client message (BOOTREQUEST, Ethernet) with no options.
    pub fn new_request(xid: u32, chaddr: Bytes) -> Self {
        Self {
            op: BOOT_REQUEST,
            htype: HTYPE_ETHERNET,
            hops: 0,
            xid,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr,
            sname: [0; 64],
            file: [0; 128],
            options: Vec::new(),
        }
    }

    /// Inserts an option, replacing any existing option with the same code.
    ///
    /// This is the only mutation path for the option list in this crate and
    /// is what upholds the no-duplicate-codes invariant.
    pub fn insert_option(&mut self, option: DhcpOption) {
        match self.options.iter_mut().find(|o| o.code() == option.code()) {
            Some(slot) => *slot = option,
            None => self.options.push(option),
        }
    }

    /// Looks up an option by code.
    pub fn option(&self, code: OptionCode) -> Option<&DhcpOption> {
        self.options.iter().find(|o| o.code() == code as u8)
    }

    /// The message type (option 53), if present.
    pub fn message_type(&self) -> Option<MessageType> {
        match self.option(OptionCode::MessageType) {
            Some(DhcpOption::MessageType(t)) => Some(*t),
            _ => None,
        }
    }

    /// The responding server's identifier (option 54), if present.
    pub fn server_identifier(&self) -> Option<Ipv4Addr> {
        match self.option(OptionCode::ServerIdentifier) {
            Some(DhcpOption::ServerIdentifier(ip)) => Some(*ip),
            _ => None,
        }
    }

    /// The subnet mask (option 1), if present.
    pub fn subnet_mask(&self) -> Option<Ipv4Addr> {
        match self.option(OptionCode::SubnetMask) {
            Some(DhcpOption::SubnetMask(mask)) => Some(*mask),
            _ => None,
        }
    }

    /// The gateway list (option 3), if present.
    pub fn routers(&self) -> Option<&[Ipv4Addr]> {
        match self.option(OptionCode::Router) {
            Some(DhcpOption::Router(routers)) => Some(routers),
            _ => None,
        }
    }

    /// The DNS server list (option 6), if present.
    pub fn dns_servers(&self) -> Option<&[Ipv4Addr]> {
        match self.option(OptionCode::DomainNameServer) {
            Some(DhcpOption::DomainNameServer(servers)) => Some(servers),
            _ => None,
        }
    }

    /// The lease duration in seconds (option 51), if present.
    pub fn lease_time(&self) -> Option<u32> {
        match self.option(OptionCode::LeaseTime) {
            Some(DhcpOption::LeaseTime(secs)) => Some(*secs),
            _ => None,
        }
    }

    /// The renewal time T1 in seconds (option 58), if present.
    pub fn renewal_time(&self) -> Option<u32> {
        match self.option(OptionCode::RenewalTime) {
            Some(DhcpOption::RenewalTime(secs)) => Some(*secs),
            _ => None,
        }
    }

    /// The rebinding time T2 in seconds (option 59), if present.
    pub fn rebinding_time(&self) -> Option<u32> {
        match self.option(OptionCode::RebindingTime) {
            Some(DhcpOption::RebindingTime(secs)) => Some(*secs),
            _ => None,
        }
    }

    /// The server's free-form text (option 56), if present.
    pub fn server_message(&self) -> Option<&str> {
        match self.option(OptionCode::Message) {
            Some(DhcpOption::Message(text)) => Some(text),
            _ => None,
        }
    }

    /// Whether the broadcast flag is set.
    pub fn broadcast(&self) -> bool {
        self.flags & BROADCAST_FLAG != 0
    }

    /// Sets or clears the broadcast flag.
    pub fn set_broadcast(&mut self, broadcast: bool) {
        if broadcast {
            self.flags |= BROADCAST_FLAG;
        } else {
            self.flags &= !BROADCAST_FLAG;
        }
    }

    /// Encodes the message for transmission.
    ///
    /// The result carries exactly one END marker, terminal in the option
    /// section, and is padded to at least 300 bytes.
    ///
    /// # Errors
    ///
    /// [`InvalidHardwareAddress`](LeasewireError::InvalidHardwareAddress)
    /// when `chaddr` does not fit the 16-byte field. The address is never
    /// truncated.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.chaddr.len() > CHADDR_FIELD_SIZE {
            return Err(LeasewireError::InvalidHardwareAddress(self.chaddr.len()));
        }

        let mut out = Vec::with_capacity(MIN_MESSAGE_SIZE);

        out.push(self.op);
        out.push(self.htype);
        out.push(self.chaddr.len() as u8);
        out.push(self.hops);
        out.extend_from_slice(&self.xid.to_be_bytes());
        out.extend_from_slice(&self.secs.to_be_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.ciaddr.octets());
        out.extend_from_slice(&self.yiaddr.octets());
        out.extend_from_slice(&self.siaddr.octets());
        out.extend_from_slice(&self.giaddr.octets());

        out.extend_from_slice(&self.chaddr);
        out.resize(28 + CHADDR_FIELD_SIZE, 0);

        out.extend_from_slice(&self.sname);
        out.extend_from_slice(&self.file);

        out.extend_from_slice(&MAGIC_COOKIE);
        out.extend_from_slice(&encode_options(&self.options));

        out.resize(out.len().max(MIN_MESSAGE_SIZE), 0);
        Ok(out)
    }

    /// Decodes a message from raw bytes.
    ///
    /// # Errors
    ///
    /// [`MalformedMessage`](LeasewireError::MalformedMessage) when the buffer
    /// is shorter than the fixed header, the opcode is unknown, or the magic
    /// cookie mismatches; [`MalformedOption`](LeasewireError::MalformedOption)
    /// when the option section is corrupt.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_DECODE_SIZE {
            return Err(LeasewireError::MalformedMessage(format!(
                "{} bytes is shorter than the {MIN_DECODE_SIZE}-byte fixed header",
                data.len()
            )));
        }

        if data[FIXED_HEADER_SIZE..MIN_DECODE_SIZE] != MAGIC_COOKIE {
            return Err(LeasewireError::MalformedMessage(
                "magic cookie mismatch".to_string(),
            ));
        }

        let op = data[0];
        if op != BOOT_REQUEST && op != BOOT_REPLY {
            return Err(LeasewireError::MalformedMessage(format!(
                "unknown opcode {op}"
            )));
        }

        let hlen = (data[2] as usize).min(CHADDR_FIELD_SIZE);

        let mut sname = [0u8; 64];
        sname.copy_from_slice(&data[44..108]);
        let mut file = [0u8; 128];
        file.copy_from_slice(&data[108..236]);

        Ok(Self {
            op,
            htype: data[1],
            hops: data[3],
            xid: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            secs: u16::from_be_bytes([data[8], data[9]]),
            flags: u16::from_be_bytes([data[10], data[11]]),
            ciaddr: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            yiaddr: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
            siaddr: Ipv4Addr::new(data[20], data[21], data[22], data[23]),
            giaddr: Ipv4Addr::new(data[24], data[25], data[26], data[27]),
            chaddr: Bytes::copy_from_slice(&data[28..28 + hlen]),
            sname,
            file,
            options: parse_options(&data[MIN_DECODE_SIZE..])?,
        })
    }
}

/// Merges caller-supplied options into `msg`, dropping the codes the engine
/// controls so they can never appear twice.
fn merge_caller_options(msg: &mut Message, extra: &[DhcpOption]) {
    for option in extra {
        if ENGINE_CONTROLLED_CODES.contains(&option.code()) {
            continue;
        }
        msg.insert_option(option.clone());
    }
}

/// Option codes requested from the server by default.
fn default_parameter_request_list() -> DhcpOption {
    DhcpOption::ParameterRequestList(vec![
        OptionCode::SubnetMask as u8,
        OptionCode::Router as u8,
        OptionCode::DomainNameServer as u8,
        OptionCode::DomainName as u8,
        OptionCode::LeaseTime as u8,
        OptionCode::RenewalTime as u8,
        OptionCode::RebindingTime as u8,
    ])
}

/// Builds a DISCOVER message.
///
/// Caller options are merged afterwards so a caller-supplied client
/// identifier (61) or parameter request list (55) replaces the default one;
/// engine-controlled codes in the caller's list are ignored.
pub fn build_discover(
    xid: u32,
    chaddr: &Bytes,
    broadcast: bool,
    extra: &[DhcpOption],
) -> Message {
    let mut msg = Message::new_request(xid, chaddr.clone());
    msg.set_broadcast(broadcast);
    msg.insert_option(DhcpOption::MessageType(MessageType::Discover));
    msg.insert_option(DhcpOption::ClientIdentifier {
        hardware_type: HTYPE_ETHERNET,
        hardware_addr: chaddr.to_vec(),
    });
    msg.insert_option(default_parameter_request_list());
    merge_caller_options(&mut msg, extra);
    msg
}

/// Builds a REQUEST echoing the offered address and the offering server's
/// identifier.
pub fn build_request(
    xid: u32,
    chaddr: &Bytes,
    offered_ip: Ipv4Addr,
    server_id: Ipv4Addr,
    broadcast: bool,
    extra: &[DhcpOption],
) -> Message {
    let mut msg = Message::new_request(xid, chaddr.clone());
    msg.set_broadcast(broadcast);
    msg.insert_option(DhcpOption::MessageType(MessageType::Request));
    msg.insert_option(DhcpOption::RequestedIpAddress(offered_ip));
    msg.insert_option(DhcpOption::ServerIdentifier(server_id));
    msg.insert_option(DhcpOption::ClientIdentifier {
        hardware_type: HTYPE_ETHERNET,
        hardware_addr: chaddr.to_vec(),
    });
    msg.insert_option(default_parameter_request_list());
    merge_caller_options(&mut msg, extra);
    msg
}
