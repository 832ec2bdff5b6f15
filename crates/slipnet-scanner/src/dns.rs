//! Minimal DNS Codec
//!
//! Builds single-question A queries and extracts the first A record from a
//! reply, following the RFC 1035 message layout:
//!
//! ```text
//! +---------------------+
//! | Header (12 bytes)   |  id, flags, qdcount, ancount, nscount, arcount
//! +---------------------+
//! | Question            |  labels..., 0, qtype, qclass
//! +---------------------+
//! | Answer              |  name, type, class, ttl, rdlength, rdata
//! +---------------------+
//! ```
//!
//! Compression pointers are understood on read and never written. Every
//! read is bounds-checked; truncated input yields `None`, never a panic.

use std::net::Ipv4Addr;

/// Header length
pub const HEADER_LEN: usize = 12;

/// Classic UDP payload limit
pub const MAX_MESSAGE_LEN: usize = 512;

pub const TYPE_A: u16 = 0x0001;
pub const CLASS_IN: u16 = 0x0001;

/// Standard query with recursion desired
const FLAGS_STANDARD_QUERY: u16 = 0x0100;

const FLAG_RESPONSE: u16 = 0x8000;
const POINTER_MASK: u8 = 0xC0;
const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;

/// Codec errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DnsCodecError {
    #[error("Empty domain name")]
    EmptyName,

    #[error("Empty label in {0:?}")]
    EmptyLabel(String),

    #[error("Label too long: {0:?}")]
    LabelTooLong(String),

    #[error("Domain name too long")]
    NameTooLong,

    #[error("Non-ASCII domain name: {0:?}")]
    NonAscii(String),

    #[error("Message shorter than a DNS header ({0} bytes)")]
    Truncated(usize),
}

/// Message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsHeader {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl DnsHeader {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        Some(Self {
            id: read_u16(buf, 0)?,
            flags: read_u16(buf, 2)?,
            qdcount: read_u16(buf, 4)?,
            ancount: read_u16(buf, 6)?,
            nscount: read_u16(buf, 8)?,
            arcount: read_u16(buf, 10)?,
        })
    }

    /// QR bit
    pub fn is_response(&self) -> bool {
        self.flags & FLAG_RESPONSE != 0
    }

    /// Response code nibble
    pub fn rcode(&self) -> u8 {
        (self.flags & 0x000F) as u8
    }
}

/// What the prober needs from a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsResponse {
    pub header: DnsHeader,
    /// First A record in the answer section
    pub address: Option<Ipv4Addr>,
}

/// Build an A/IN query for `domain`
pub fn build_query(id: u16, domain: &str) -> Result<Vec<u8>, DnsCodecError> {
    let name = encode_name(domain)?;

    let mut msg = Vec::with_capacity(HEADER_LEN + name.len() + 4);
    msg.extend_from_slice(&id.to_be_bytes());
    msg.extend_from_slice(&FLAGS_STANDARD_QUERY.to_be_bytes());
    msg.extend_from_slice(&1u16.to_be_bytes()); // qdcount
    msg.extend_from_slice(&[0, 0, 0, 0, 0, 0]); // an/ns/ar counts
    msg.extend_from_slice(&name);
    msg.extend_from_slice(&TYPE_A.to_be_bytes());
    msg.extend_from_slice(&CLASS_IN.to_be_bytes());
    Ok(msg)
}

/// Build a query with a random transaction id
pub fn random_query(domain: &str) -> Result<(u16, Vec<u8>), DnsCodecError> {
    let id: u16 = rand::random();
    Ok((id, build_query(id, domain)?))
}

fn encode_name(domain: &str) -> Result<Vec<u8>, DnsCodecError> {
    let trimmed = domain.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(DnsCodecError::EmptyName);
    }
    if !trimmed.is_ascii() {
        return Err(DnsCodecError::NonAscii(domain.to_string()));
    }

    let mut out = Vec::with_capacity(trimmed.len() + 2);
    for label in trimmed.split('.') {
        if label.is_empty() {
            return Err(DnsCodecError::EmptyLabel(domain.to_string()));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(DnsCodecError::LabelTooLong(label.to_string()));
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);

    if out.len() > MAX_NAME_LEN {
        return Err(DnsCodecError::NameTooLong);
    }
    Ok(out)
}

/// Parse a reply into its header and first A record
pub fn parse_response(buf: &[u8]) -> Result<DnsResponse, DnsCodecError> {
    let header = DnsHeader::parse(buf).ok_or(DnsCodecError::Truncated(buf.len()))?;
    Ok(DnsResponse {
        header,
        address: first_a_record(buf),
    })
}

/// Walk the answer section and return the first A record
///
/// Returns `None` when the answer count runs out, the buffer ends early, or
/// a name is malformed.
pub fn first_a_record(buf: &[u8]) -> Option<Ipv4Addr> {
    let header = DnsHeader::parse(buf)?;
    let mut pos = HEADER_LEN;

    for _ in 0..header.qdcount {
        pos = skip_name(buf, pos)?;
        pos = advance(buf, pos, 4)?; // qtype + qclass
    }

    for _ in 0..header.ancount {
        pos = skip_name(buf, pos)?;
        let rtype = read_u16(buf, pos)?;
        // type, class, ttl
        pos = advance(buf, pos, 8)?;
        let rdlength = read_u16(buf, pos)? as usize;
        pos = advance(buf, pos, 2)?;

        if rtype == TYPE_A && rdlength == 4 {
            let octets = buf.get(pos..pos + 4)?;
            return Some(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]));
        }
        pos = advance(buf, pos, rdlength)?;
    }

    None
}

/// Position just past the name starting at `pos`
fn skip_name(buf: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let len = *buf.get(pos)?;
        if len == 0 {
            return Some(pos + 1);
        }
        if len & POINTER_MASK == POINTER_MASK {
            // Two-byte pointer ends the name
            buf.get(pos + 1)?;
            return Some(pos + 2);
        }
        if len & POINTER_MASK != 0 {
            // 0x40 / 0x80 label types are reserved
            return None;
        }
        pos = advance(buf, pos, 1 + len as usize)?;
    }
}

/// `pos + n`, if it stays within the buffer
fn advance(buf: &[u8], pos: usize, n: usize) -> Option<usize> {
    let next = pos.checked_add(n)?;
    (next <= buf.len()).then_some(next)
}

fn read_u16(buf: &[u8], pos: usize) -> Option<u16> {
    let bytes = buf.get(pos..pos.checked_add(2)?)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}
