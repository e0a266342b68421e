//! DHCP option codec (RFC 2132).
//!
//! Options are TLV encoded: a 1-byte code, a 1-byte length, and a
//! variable-length payload. Known codes map to typed [`DhcpOption`]
//! variants; unknown codes round-trip as [`DhcpOption::Unknown`] so that
//! nothing a server sends is silently dropped.
//!
//! A declared length that overruns the remaining buffer aborts the decode
//! of the whole option section with
//! [`MalformedOption`](crate::LeasewireError::MalformedOption). There is no
//! partial recovery: a message with one bad option is a bad message.

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::{LeasewireError, Result};

/// Option codes handled by this implementation (RFC 2132).
///
/// Codes outside this set are carried via [`DhcpOption::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OptionCode {
    /// Padding byte, skipped during parsing.
    Pad = 0,
    SubnetMask = 1,
    Router = 3,
    DomainNameServer = 6,
    Hostname = 12,
    DomainName = 15,
    BroadcastAddress = 28,
    RequestedIpAddress = 50,
    LeaseTime = 51,
    MessageType = 53,
    ServerIdentifier = 54,
    ParameterRequestList = 55,
    /// Free-form error/info text, typically attached to a NAK (RFC 2132 §9.9).
    Message = 56,
    RenewalTime = 58,
    RebindingTime = 59,
    ClientIdentifier = 61,
    /// End-of-options marker, terminal.
    End = 255,
}

impl TryFrom<u8> for OptionCode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0 => Ok(Self::Pad),
            1 => Ok(Self::SubnetMask),
            3 => Ok(Self::Router),
            6 => Ok(Self::DomainNameServer),
            12 => Ok(Self::Hostname),
            15 => Ok(Self::DomainName),
            28 => Ok(Self::BroadcastAddress),
            50 => Ok(Self::RequestedIpAddress),
            51 => Ok(Self::LeaseTime),
            53 => Ok(Self::MessageType),
            54 => Ok(Self::ServerIdentifier),
            55 => Ok(Self::ParameterRequestList),
            56 => Ok(Self::Message),
            58 => Ok(Self::RenewalTime),
            59 => Ok(Self::RebindingTime),
            61 => Ok(Self::ClientIdentifier),
            255 => Ok(Self::End),
            other => Err(other),
        }
    }
}

/// DHCP message types (option 53, RFC 2132 §9.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            1 => Ok(Self::Discover),
            2 => Ok(Self::Offer),
            3 => Ok(Self::Request),
            4 => Ok(Self::Decline),
            5 => Ok(Self::Ack),
            6 => Ok(Self::Nak),
            7 => Ok(Self::Release),
            8 => Ok(Self::Inform),
            other => Err(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discover => "DISCOVER",
            Self::Offer => "OFFER",
            Self::Request => "REQUEST",
            Self::Decline => "DECLINE",
            Self::Ack => "ACK",
            Self::Nak => "NAK",
            Self::Release => "RELEASE",
            Self::Inform => "INFORM",
        };
        f.write_str(name)
    }
}

/// A typed DHCP option.
///
/// The enum is closed: every supported code has an explicit variant with a
/// semantic value, and anything else is preserved byte-for-byte as
/// [`Unknown`](Self::Unknown). Construction is always through the variants
/// (or the typed constructors such as [`client_identifier`](Self::client_identifier)),
/// never through untyped maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhcpOption {
    /// Subnet mask (1).
    SubnetMask(Ipv4Addr),
    /// Gateway addresses in preference order (3).
    Router(Vec<Ipv4Addr>),
    /// DNS server addresses (6).
    DomainNameServer(Vec<Ipv4Addr>),
    /// Client hostname (12).
    Hostname(String),
    /// DNS domain name (15).
    DomainName(String),
    /// Broadcast address (28).
    BroadcastAddress(Ipv4Addr),
    /// Requested IP address (50). Set by the engine in REQUEST messages.
    RequestedIpAddress(Ipv4Addr),
    /// Lease duration in seconds (51).
    LeaseTime(u32),
    /// Message type (53). Set by the engine on every outgoing message.
    MessageType(MessageType),
    /// Identifier (address) of the responding server (54).
    ServerIdentifier(Ipv4Addr),
    /// Option codes the client wants in the reply (55).
    ParameterRequestList(Vec<u8>),
    /// Server-supplied text, usually the reason for a NAK (56).
    Message(String),
    /// Renewal time T1 in seconds (58).
    RenewalTime(u32),
    /// Rebinding time T2 in seconds (59).
    RebindingTime(u32),
    /// Client identifier (61): hardware type followed by the hardware address.
    ClientIdentifier {
        hardware_type: u8,
        hardware_addr: Vec<u8>,
    },
    /// Any code this implementation does not interpret, kept verbatim.
    Unknown(u8, Vec<u8>),
}

fn read_ipv4(code: OptionCode, data: &[u8]) -> Result<Ipv4Addr> {
    let octets: [u8; 4] = data.try_into().map_err(|_| {
        LeasewireError::MalformedOption(format!(
            "option {} expects 4 bytes, got {}",
            code as u8,
            data.len()
        ))
    })?;
    Ok(Ipv4Addr::from(octets))
}

fn read_ipv4_list(code: OptionCode, data: &[u8]) -> Result<Vec<Ipv4Addr>> {
    if data.is_empty() || data.len() % 4 != 0 {
        return Err(LeasewireError::MalformedOption(format!(
            "option {} expects a non-empty multiple of 4 bytes, got {}",
            code as u8,
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(4)
        .map(|c| Ipv4Addr::new(c[0], c[1], c[2], c[3]))
        .collect())
}

fn read_u32(code: OptionCode, data: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = data.try_into().map_err(|_| {
        LeasewireError::MalformedOption(format!(
            "option {} expects 4 bytes, got {}",
            code as u8,
            data.len()
        ))
    })?;
    Ok(u32::from_be_bytes(bytes))
}

impl DhcpOption {
    /// Builds a client identifier option from a hardware type and a
    /// colon-separated MAC string such as `"aa:bb:cc:dd:ee:ff"`.
    pub fn client_identifier(hardware_type: u8, mac: &str) -> Result<Self> {
        Ok(Self::ClientIdentifier {
            hardware_type,
            hardware_addr: parse_mac_address(mac)?,
        })
    }

    /// The RFC 2132 code this option encodes to.
    pub fn code(&self) -> u8 {
        match self {
            Self::SubnetMask(_) => OptionCode::SubnetMask as u8,
            Self::Router(_) => OptionCode::Router as u8,
            Self::DomainNameServer(_) => OptionCode::DomainNameServer as u8,
            Self::Hostname(_) => OptionCode::Hostname as u8,
            Self::DomainName(_) => OptionCode::DomainName as u8,
            Self::BroadcastAddress(_) => OptionCode::BroadcastAddress as u8,
            Self::RequestedIpAddress(_) => OptionCode::RequestedIpAddress as u8,
            Self::LeaseTime(_) => OptionCode::LeaseTime as u8,
            Self::MessageType(_) => OptionCode::MessageType as u8,
            Self::ServerIdentifier(_) => OptionCode::ServerIdentifier as u8,
            Self::ParameterRequestList(_) => OptionCode::ParameterRequestList as u8,
            Self::Message(_) => OptionCode::Message as u8,
            Self::RenewalTime(_) => OptionCode::RenewalTime as u8,
            Self::RebindingTime(_) => OptionCode::RebindingTime as u8,
            Self::ClientIdentifier { .. } => OptionCode::ClientIdentifier as u8,
            Self::Unknown(code, _) => *code,
        }
    }

    /// Parses one option from its code and payload (the bytes after the
    /// code and length).
    ///
    /// # Errors
    ///
    /// [`MalformedOption`](LeasewireError::MalformedOption) when the payload
    /// length or value is invalid for the code.
    pub fn parse(code: u8, data: &[u8]) -> Result<Self> {
        let known = match OptionCode::try_from(code) {
            Ok(known) => known,
            Err(unknown) => return Ok(Self::Unknown(unknown, data.to_vec())),
        };

        match known {
            OptionCode::SubnetMask => Ok(Self::SubnetMask(read_ipv4(known, data)?)),
            OptionCode::Router => Ok(Self::Router(read_ipv4_list(known, data)?)),
            OptionCode::DomainNameServer => {
                Ok(Self::DomainNameServer(read_ipv4_list(known, data)?))
            }
            OptionCode::Hostname => Ok(Self::Hostname(String::from_utf8_lossy(data).into_owned())),
            OptionCode::DomainName => {
                Ok(Self::DomainName(String::from_utf8_lossy(data).into_owned()))
            }
            OptionCode::BroadcastAddress => Ok(Self::BroadcastAddress(read_ipv4(known, data)?)),
            OptionCode::RequestedIpAddress => {
                Ok(Self::RequestedIpAddress(read_ipv4(known, data)?))
            }
            OptionCode::LeaseTime => Ok(Self::LeaseTime(read_u32(known, data)?)),
            OptionCode::MessageType => {
                let &[value] = data else {
                    return Err(LeasewireError::MalformedOption(format!(
                        "message type expects 1 byte, got {}",
                        data.len()
                    )));
                };
                let msg_type = MessageType::try_from(value).map_err(|v| {
                    LeasewireError::MalformedOption(format!("unknown message type {v}"))
                })?;
                Ok(Self::MessageType(msg_type))
            }
            OptionCode::ServerIdentifier => Ok(Self::ServerIdentifier(read_ipv4(known, data)?)),
            OptionCode::ParameterRequestList => Ok(Self::ParameterRequestList(data.to_vec())),
            OptionCode::Message => Ok(Self::Message(String::from_utf8_lossy(data).into_owned())),
            OptionCode::RenewalTime => Ok(Self::RenewalTime(read_u32(known, data)?)),
            OptionCode::RebindingTime => Ok(Self::RebindingTime(read_u32(known, data)?)),
            OptionCode::ClientIdentifier => {
                if data.len() < 2 {
                    return Err(LeasewireError::MalformedOption(format!(
                        "client identifier expects at least 2 bytes, got {}",
                        data.len()
                    )));
                }
                Ok(Self::ClientIdentifier {
                    hardware_type: data[0],
                    hardware_addr: data[1..].to_vec(),
                })
            }
            OptionCode::Pad | OptionCode::End => Err(LeasewireError::MalformedOption(
                "pad/end markers are not options".to_string(),
            )),
        }
    }

    /// Encodes this option to wire format: code, length, payload.
    pub fn encode(&self) -> Vec<u8> {
        fn tlv(code: u8, payload: &[u8]) -> Vec<u8> {
            // Length is a single byte; clamp oversized payloads.
            let len = payload.len().min(255);
            let mut out = Vec::with_capacity(2 + len);
            out.push(code);
            out.push(len as u8);
            out.extend_from_slice(&payload[..len]);
            out
        }

        match self {
            Self::SubnetMask(addr)
            | Self::BroadcastAddress(addr)
            | Self::RequestedIpAddress(addr)
            | Self::ServerIdentifier(addr) => tlv(self.code(), &addr.octets()),
            Self::Router(addrs) | Self::DomainNameServer(addrs) => {
                let payload: Vec<u8> = addrs.iter().flat_map(|a| a.octets()).collect();
                tlv(self.code(), &payload)
            }
            Self::Hostname(text) | Self::DomainName(text) | Self::Message(text) => {
                tlv(self.code(), text.as_bytes())
            }
            Self::LeaseTime(secs) | Self::RenewalTime(secs) | Self::RebindingTime(secs) => {
                tlv(self.code(), &secs.to_be_bytes())
            }
            Self::MessageType(msg_type) => tlv(self.code(), &[*msg_type as u8]),
            Self::ParameterRequestList(codes) => tlv(self.code(), codes),
            Self::ClientIdentifier {
                hardware_type,
                hardware_addr,
            } => {
                let mut payload = Vec::with_capacity(1 + hardware_addr.len());
                payload.push(*hardware_type);
                payload.extend_from_slice(hardware_addr);
                tlv(self.code(), &payload)
            }
            Self::Unknown(code, data) => tlv(*code, data),
        }
    }
}

/// Encodes an option list to wire format, terminated by the END marker.
pub fn encode_options(options: &[DhcpOption]) -> Vec<u8> {
    let mut out = Vec::new();
    for option in options {
        out.extend_from_slice(&option.encode());
    }
    out.push(OptionCode::End as u8);
    out
}

/// Parses an option section until the END marker or buffer exhaustion.
///
/// PAD bytes are skipped. A missing length byte or a declared length running
/// past the buffer aborts the whole parse with
/// [`MalformedOption`](LeasewireError::MalformedOption).
///
/// Duplicate codes from the wire are kept as-is; lookups through
/// [`Message::option`](crate::v4::message::Message::option) take the first
/// occurrence. Outbound messages never carry duplicates because
/// `insert_option` replaces by code.
pub fn parse_options(data: &[u8]) -> Result<Vec<DhcpOption>> {
    let mut options = Vec::new();
    let mut index = 0;

    while index < data.len() {
        let code = data[index];

        if code == OptionCode::Pad as u8 {
            index += 1;
            continue;
        }
        if code == OptionCode::End as u8 {
            break;
        }

        let Some(&length) = data.get(index + 1) else {
            return Err(LeasewireError::MalformedOption(format!(
                "option {code} is missing its length byte"
            )));
        };
        let length = length as usize;

        let Some(payload) = data.get(index + 2..index + 2 + length) else {
            return Err(LeasewireError::MalformedOption(format!(
                "option {code} declares {length} bytes past the end of the buffer"
            )));
        };

        options.push(DhcpOption::parse(code, payload)?);
        index += 2 + length;
    }

    Ok(options)
}

/// Parses a colon-separated MAC string such as `"0a:1b:2c:3d:4e:5f"`.
pub fn parse_mac_address(mac: &str) -> Result<Vec<u8>> {
    let bytes: Vec<u8> = mac
        .split(':')
        .map(|part| u8::from_str_radix(part, 16))
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| LeasewireError::MacParse(mac.to_string()))?;
    if bytes.is_empty() || bytes.len() > 16 {
        return Err(LeasewireError::MacParse(mac.to_string()));
    }
    Ok(bytes)
}
