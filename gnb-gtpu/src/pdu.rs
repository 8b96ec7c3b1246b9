//! GTP-U v1 PDU codec.
//!
//! Header layout (3GPP TS 29.281 Sec. 5):
//!
//! ```text
//!        | 8 | 7 | 6 | 5 | 4 | 3 | 2 | 1 |
//! 1      |  Version  |PT | * | E | S |PN |
//! 2      |         Message Type          |
//! 3-4    |            Length             |
//! 5-8    |             TEID              |
//! [9-10  |        Sequence Number        |
//!  11    |          N-PDU Number         |
//!  12    |  Next Extension Header Type   ]
//! [extension headers, 4-byte quads ...   ]
//! ```
//!
//! The optional 4-byte block is present whenever any of the E/S/PN flags is
//! set; extension headers follow while E is set, each shaped
//! `[len_quads | content | next_type]` and terminated by `next_type == 0`.

use smallvec::SmallVec;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::Range;
use thiserror::Error;

/// Mandatory GTP-U header length.
pub const GTPU_BASE_HEADER_LEN: usize = 8;
/// Header length when any of the E/S/PN flags is set.
pub const GTPU_EXTENDED_HEADER_LEN: usize = 12;
/// Supported number of chained extension headers per PDU.
pub const GTPU_MAX_NOF_HEADER_EXTENSIONS: usize = 10;

pub const GTPU_MSG_ECHO_REQUEST: u8 = 1;
pub const GTPU_MSG_ECHO_RESPONSE: u8 = 2;
pub const GTPU_MSG_ERROR_INDICATION: u8 = 26;
pub const GTPU_MSG_SUPPORTED_EXT_HDR_NOTIFICATION: u8 = 31;
pub const GTPU_MSG_END_MARKER: u8 = 254;
pub const GTPU_MSG_DATA_PDU: u8 = 255;

/// GTP-U information element types (TS 29.281 Sec. 8.1).
pub const GTPU_IE_RECOVERY: u8 = 14;
pub const GTPU_IE_TEID_I: u8 = 16;
pub const GTPU_IE_GSN_ADDRESS: u8 = 133;
pub const GTPU_IE_PRIVATE_EXTENSION: u8 = 255;

/// Tunnel Endpoint Identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Teid(pub u32);

/// TEID 0 is reserved for path-management messages (echo, error indication).
pub const PATH_MANAGEMENT_TEID: Teid = Teid(0);

impl Teid {
    pub fn to_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Teid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// GTP-U extension header type codes (TS 29.281 figure 5.2.1-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionHeaderType(pub u8);

impl ExtensionHeaderType {
    pub const NO_MORE_HEADERS: Self = Self(0b0000_0000);
    pub const LONG_PDCP_PDU_NUMBER_0: Self = Self(0b0000_0011);
    pub const SERVICE_CLASS_INDICATOR: Self = Self(0b0010_0000);
    pub const UDP_PORT: Self = Self(0b0100_0000);
    pub const RAN_CONTAINER: Self = Self(0b1000_0001);
    pub const LONG_PDCP_PDU_NUMBER_1: Self = Self(0b1000_0010);
    pub const XW_RAN_CONTAINER: Self = Self(0b1000_0011);
    pub const NR_RAN_CONTAINER: Self = Self(0b1000_0100);
    pub const PDU_SESSION_CONTAINER: Self = Self(0b1000_0101);
    pub const PDCP_PDU_NUMBER: Self = Self(0b1100_0000);

    const RESERVED: [u8; 4] = [0b0000_0001, 0b0000_0010, 0b1100_0001, 0b1100_0010];

    /// Comprehension policy check (TS 29.281 Sec. 5.2.1): the top two bits
    /// of the type code state whether the receiving endpoint must
    /// comprehend the extension. Types this implementation does not
    /// comprehend are acceptable as opaque content only when comprehension
    /// is not required.
    pub fn comprehension_ok(self) -> bool {
        if self == Self::NO_MORE_HEADERS
            || self == Self::PDU_SESSION_CONTAINER
            || self == Self::PDCP_PDU_NUMBER
        {
            return true;
        }
        if Self::RESERVED.contains(&self.0) {
            return false;
        }
        // 0b00/0b01: comprehension not required, forward or skip.
        // 0b10/0b11: comprehension required by the endpoint.
        self.0 >> 6 < 0b10
    }

    fn name(self) -> &'static str {
        match self {
            t if t == Self::NO_MORE_HEADERS => "no more headers",
            t if t == Self::SERVICE_CLASS_INDICATOR => "service class indicator",
            t if t == Self::UDP_PORT => "UDP port",
            t if t == Self::RAN_CONTAINER => "RAN container",
            t if t == Self::LONG_PDCP_PDU_NUMBER_0 || t == Self::LONG_PDCP_PDU_NUMBER_1 => {
                "long PDCP PDU number"
            }
            t if t == Self::XW_RAN_CONTAINER => "XW RAN container",
            t if t == Self::NR_RAN_CONTAINER => "NR RAN container",
            t if t == Self::PDU_SESSION_CONTAINER => "PDU session container",
            t if t == Self::PDCP_PDU_NUMBER => "PDCP PDU number",
            t if Self::RESERVED.contains(&t.0) => "reserved",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ExtensionHeaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PduError {
    #[error("PDU too short. pdu_len={0}")]
    TooShort(usize),
    #[error("unsupported GTP-U flags: {0}")]
    UnsupportedFlag(&'static str),
    #[error("unknown GTP-U message type {0:#04x}")]
    UnknownMessageType(u8),
    #[error("malformed extension header: {0}")]
    MalformedExtension(&'static str),
    #[error("comprehension-required extension header not understood. type={0:#04x}")]
    UncomprehendedExtension(u8),
    #[error("malformed information element: {0}")]
    MalformedIe(&'static str),
}

/// Flags byte of the GTP-U header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GtpuFlags {
    pub version: u8,
    pub protocol_type: u8,
    pub ext_hdr: bool,
    pub seq_number: bool,
    pub n_pdu: bool,
}

impl Default for GtpuFlags {
    fn default() -> Self {
        Self {
            version: 1,
            protocol_type: 1,
            ext_hdr: false,
            seq_number: false,
            n_pdu: false,
        }
    }
}

impl GtpuFlags {
    fn any_optional(&self) -> bool {
        self.ext_hdr || self.seq_number || self.n_pdu
    }
}

impl fmt::Display for GtpuFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v={} pt={} e={} s={} pn={}",
            self.version, self.protocol_type, self.ext_hdr, self.seq_number, self.n_pdu
        )
    }
}

/// An extension header to be written into an outgoing PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionHeader {
    pub ext_type: ExtensionHeaderType,
    /// Container content; `(len + 2) % 4 == 0` must hold.
    pub container: SmallVec<[u8; 4]>,
}

/// GTP-U header, including the extension list for the write path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GtpuHeader {
    pub flags: GtpuFlags,
    pub message_type: u8,
    /// Payload length (everything after the first 8 octets). Recomputed
    /// from the buffer on write.
    pub length: u16,
    pub teid: Teid,
    pub seq_number: u16,
    pub n_pdu: u8,
    pub next_ext_hdr_type: ExtensionHeaderType,
    pub ext_list: SmallVec<[ExtensionHeader; 2]>,
}

impl Default for ExtensionHeaderType {
    fn default() -> Self {
        Self::NO_MORE_HEADERS
    }
}

impl fmt::Display for GtpuHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} len={} teid={}",
            self.flags, self.length, self.teid
        )
    }
}

/// A parsed extension header whose content is a view into the dissected
/// PDU's retained buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DissectedExtension {
    pub ext_type: ExtensionHeaderType,
    container: Range<usize>,
}

/// Intermediate representation of a received GTP-U PDU.
///
/// Holds the original buffer; extension-header content is accessed as
/// borrowed views into it. [`DissectedPdu::into_t_pdu`] consumes the object
/// and advances past the parsed header, which invalidates all views by
/// ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DissectedPdu {
    buf: Vec<u8>,
    hdr: GtpuHeader,
    ext_list: SmallVec<[DissectedExtension; 2]>,
    hdr_len: usize,
}

impl DissectedPdu {
    pub fn header(&self) -> &GtpuHeader {
        &self.hdr
    }

    pub fn ext_headers(&self) -> &[DissectedExtension] {
        &self.ext_list
    }

    /// Content view of a parsed extension header.
    pub fn container(&self, ext: &DissectedExtension) -> &[u8] {
        &self.buf[ext.container.clone()]
    }

    /// On-the-wire length of the whole PDU.
    pub fn pdu_len(&self) -> usize {
        self.buf.len()
    }

    /// Total parsed header length; start of the T-PDU.
    pub fn hdr_len(&self) -> usize {
        self.hdr_len
    }

    /// Extracts the T-PDU by advancing the retained buffer past the header.
    pub fn into_t_pdu(mut self) -> Vec<u8> {
        self.buf.drain(..self.hdr_len);
        self.buf
    }
}

fn check_supported_flags(flags: &GtpuFlags) -> Result<(), PduError> {
    if flags.version != 1 {
        return Err(PduError::UnsupportedFlag("version"));
    }
    if flags.protocol_type != 1 {
        return Err(PduError::UnsupportedFlag("protocol type"));
    }
    if flags.n_pdu {
        return Err(PduError::UnsupportedFlag("N-PDU number"));
    }
    Ok(())
}

fn check_supported_msg_type(message_type: u8) -> Result<(), PduError> {
    match message_type {
        GTPU_MSG_ECHO_REQUEST
        | GTPU_MSG_ECHO_RESPONSE
        | GTPU_MSG_ERROR_INDICATION
        | GTPU_MSG_SUPPORTED_EXT_HDR_NOTIFICATION
        | GTPU_MSG_END_MARKER
        | GTPU_MSG_DATA_PDU => Ok(()),
        other => Err(PduError::UnknownMessageType(other)),
    }
}

fn check_comprehension(ext_type: ExtensionHeaderType) -> Result<(), PduError> {
    if ext_type.comprehension_ok() {
        Ok(())
    } else {
        Err(PduError::UncomprehendedExtension(ext_type.0))
    }
}

/// Reads the TEID of a raw PDU without dissecting it.
pub fn read_teid(pdu: &[u8]) -> Result<Teid, PduError> {
    if pdu.len() < GTPU_BASE_HEADER_LEN {
        return Err(PduError::TooShort(pdu.len()));
    }
    Ok(Teid(u32::from_be_bytes([pdu[4], pdu[5], pdu[6], pdu[7]])))
}

/// Creates a dissected representation of a raw GTP-U PDU, taking ownership
/// of the buffer so that extension-header views stay valid.
pub fn dissect(raw: Vec<u8>) -> Result<DissectedPdu, PduError> {
    if raw.len() < GTPU_BASE_HEADER_LEN {
        return Err(PduError::TooShort(raw.len()));
    }

    let b0 = raw[0];
    let flags = GtpuFlags {
        version: b0 >> 5,
        protocol_type: (b0 >> 4) & 0x1,
        ext_hdr: b0 & 0x04 != 0,
        seq_number: b0 & 0x02 != 0,
        n_pdu: b0 & 0x01 != 0,
    };
    check_supported_flags(&flags)?;

    let message_type = raw[1];
    check_supported_msg_type(message_type)?;

    let length = u16::from_be_bytes([raw[2], raw[3]]);
    let teid = Teid(u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]));

    let mut hdr = GtpuHeader {
        flags,
        message_type,
        length,
        teid,
        ..Default::default()
    };

    let mut offset = GTPU_BASE_HEADER_LEN;
    if flags.any_optional() {
        if raw.len() < GTPU_EXTENDED_HEADER_LEN {
            return Err(PduError::TooShort(raw.len()));
        }
        hdr.seq_number = u16::from_be_bytes([raw[8], raw[9]]);
        hdr.n_pdu = raw[10];
        hdr.next_ext_hdr_type = ExtensionHeaderType(raw[11]);
        offset = GTPU_EXTENDED_HEADER_LEN;
        check_comprehension(hdr.next_ext_hdr_type)?;
    }

    let mut ext_list: SmallVec<[DissectedExtension; 2]> = SmallVec::new();
    if flags.ext_hdr {
        if hdr.next_ext_hdr_type == ExtensionHeaderType::NO_MORE_HEADERS {
            return Err(PduError::MalformedExtension(
                "E flag set but no extension follows",
            ));
        }
        let mut next_type = hdr.next_ext_hdr_type;
        while next_type != ExtensionHeaderType::NO_MORE_HEADERS {
            check_comprehension(next_type)?;
            let len_quads = *raw.get(offset).ok_or(PduError::TooShort(raw.len()))? as usize;
            if len_quads == 0 {
                return Err(PduError::MalformedExtension("zero length indicator"));
            }
            // Four bytes per quad, minus the length and next-type octets.
            let content_len = len_quads * 4 - 2;
            let content_start = offset + 1;
            let next_type_at = content_start + content_len;
            if next_type_at >= raw.len() {
                return Err(PduError::TooShort(raw.len()));
            }
            if ext_list.len() == GTPU_MAX_NOF_HEADER_EXTENSIONS {
                return Err(PduError::MalformedExtension("too many extension headers"));
            }
            ext_list.push(DissectedExtension {
                ext_type: next_type,
                container: content_start..next_type_at,
            });
            next_type = ExtensionHeaderType(raw[next_type_at]);
            offset += len_quads * 4;
        }
    }

    Ok(DissectedPdu {
        buf: raw,
        hdr,
        ext_list,
        hdr_len: offset,
    })
}

/// Prepends the encoded GTP-U header to `buf`, which holds the payload
/// (T-PDU or information elements). The length field is computed from the
/// final buffer length minus the 8 mandatory octets.
pub fn write_header(buf: &mut Vec<u8>, hdr: &GtpuHeader) -> Result<(), PduError> {
    check_supported_flags(&hdr.flags)?;
    check_supported_msg_type(hdr.message_type)?;

    let mut hdr_buf: Vec<u8> = Vec::with_capacity(GTPU_EXTENDED_HEADER_LEN);
    let b0 = (hdr.flags.version << 5)
        | (hdr.flags.protocol_type << 4)
        | ((hdr.flags.ext_hdr as u8) << 2)
        | ((hdr.flags.seq_number as u8) << 1)
        | hdr.flags.n_pdu as u8;
    hdr_buf.push(b0);
    hdr_buf.push(hdr.message_type);
    hdr_buf.extend_from_slice(&[0, 0]); // length, patched below
    hdr_buf.extend_from_slice(&hdr.teid.0.to_be_bytes());

    if hdr.flags.any_optional() {
        hdr_buf.extend_from_slice(&hdr.seq_number.to_be_bytes());
        hdr_buf.push(hdr.n_pdu);
        hdr_buf.push(hdr.next_ext_hdr_type.0);
    }

    for (i, ext) in hdr.ext_list.iter().enumerate() {
        if (ext.container.len() + 2) % 4 != 0 {
            return Err(PduError::MalformedExtension(
                "container not padded to 4-byte quads",
            ));
        }
        hdr_buf.push(((ext.container.len() + 2) / 4) as u8);
        hdr_buf.extend_from_slice(&ext.container);
        let next = hdr
            .ext_list
            .get(i + 1)
            .map_or(ExtensionHeaderType::NO_MORE_HEADERS, |e| e.ext_type);
        hdr_buf.push(next.0);
    }

    let length = (buf.len() + hdr_buf.len() - GTPU_BASE_HEADER_LEN) as u16;
    hdr_buf[2..4].copy_from_slice(&length.to_be_bytes());

    buf.splice(0..0, hdr_buf);
    Ok(())
}

/// Appends the "Recovery" information element (TS 29.281 Sec. 8.2). The
/// restart counter is always 0 and ignored by receivers; the IE exists for
/// backward compatibility.
pub fn write_ie_recovery(buf: &mut Vec<u8>) {
    buf.extend_from_slice(&[GTPU_IE_RECOVERY, 0]);
}

/// Error Indication message content (TS 29.281 Sec. 7.3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorIndication {
    /// Tunnel Endpoint Identifier Data I.
    pub teid_i: Teid,
    /// GTP-U Peer Address.
    pub peer_addr: IpAddr,
}

impl fmt::Display for ErrorIndication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "teid_i={} peer_addr={}", self.teid_i, self.peer_addr)
    }
}

/// Parses the information elements of an Error Indication T-PDU. Both the
/// TEID-I and the peer-address IEs are mandatory.
pub fn read_error_indication(msg: &[u8]) -> Result<ErrorIndication, PduError> {
    let mut teid_i = None;
    let mut peer_addr = None;
    let mut offset = 0;

    while offset < msg.len() {
        let ie_type = msg[offset];
        offset += 1;
        match ie_type {
            GTPU_IE_TEID_I => {
                let val = msg
                    .get(offset..offset + 4)
                    .ok_or(PduError::MalformedIe("truncated TEID-I"))?;
                teid_i = Some(Teid(u32::from_be_bytes([val[0], val[1], val[2], val[3]])));
                offset += 4;
            }
            GTPU_IE_RECOVERY => {
                // TV, single octet; ignored.
                offset = offset
                    .checked_add(1)
                    .filter(|&o| o <= msg.len())
                    .ok_or(PduError::MalformedIe("truncated recovery"))?;
            }
            GTPU_IE_GSN_ADDRESS => {
                let len_bytes = msg
                    .get(offset..offset + 2)
                    .ok_or(PduError::MalformedIe("truncated address length"))?;
                let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
                offset += 2;
                let addr = msg
                    .get(offset..offset + len)
                    .ok_or(PduError::MalformedIe("truncated address"))?;
                peer_addr = Some(match len {
                    4 => IpAddr::V4(Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3])),
                    16 => {
                        let mut octets = [0u8; 16];
                        octets.copy_from_slice(addr);
                        IpAddr::V6(Ipv6Addr::from(octets))
                    }
                    _ => return Err(PduError::MalformedIe("invalid address length")),
                });
                offset += len;
            }
            GTPU_IE_PRIVATE_EXTENSION => {
                let len_bytes = msg
                    .get(offset..offset + 2)
                    .ok_or(PduError::MalformedIe("truncated private extension"))?;
                let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
                offset += 2 + len;
                if offset > msg.len() {
                    return Err(PduError::MalformedIe("truncated private extension"));
                }
            }
            _ => return Err(PduError::MalformedIe("unexpected IE type")),
        }
    }

    match (teid_i, peer_addr) {
        (Some(teid_i), Some(peer_addr)) => Ok(ErrorIndication { teid_i, peer_addr }),
        _ => Err(PduError::MalformedIe("missing mandatory IE")),
    }
}
