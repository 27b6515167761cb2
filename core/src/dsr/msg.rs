//! DSR options header and its bit-exact wire codec
//!
//! Format:
//! [1 byte]  next header (protocol of the encapsulated content)
//! [1 byte]  reserved, zero
//! [2 bytes] length of the options that follow (BE u16)
//! [N bytes] options, each `[type][data len][data]` except Pad1 which is a
//!           lone type byte
//!
//! The encapsulated content is carried as a typed [`Payload`]; only opaque
//! application data is appended when encoding.

use super::DsrError;
use crate::net::{NetAddress, Payload, Protocol};

pub const OPT_ROUTE_REPLY: u8 = 1;
pub const OPT_ROUTE_REQUEST: u8 = 2;
pub const OPT_ROUTE_ERROR: u8 = 3;
pub const OPT_ACK: u8 = 32;
pub const OPT_SOURCE_ROUTE: u8 = 96;
pub const OPT_ACK_REQUEST: u8 = 160;
pub const OPT_PAD1: u8 = 224;
pub const OPT_PADN: u8 = 0;

/// Largest segments-left value the 6-bit field holds
pub const MAX_SEGMENTS_LEFT: u8 = 0x3F;
/// Largest salvage count the 4-bit field holds
pub const MAX_SALVAGE: u8 = 0xF;

const HEADER_SIZE: usize = 4;
const ADDR: usize = NetAddress::SIZE;

/// What to do with an option whose type is not understood, selected by
/// bits 5 and 6 of the type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnrecognizedPolicy {
    Ignore,
    Remove,
    /// Set the high bit of the first data byte and carry on
    Mark,
    DropPacket,
}

impl UnrecognizedPolicy {
    pub fn from_type(ty: u8) -> Self {
        match (ty & 0x60) >> 5 {
            0 => UnrecognizedPolicy::Ignore,
            1 => UnrecognizedPolicy::Remove,
            2 => UnrecognizedPolicy::Mark,
            _ => UnrecognizedPolicy::DropPacket,
        }
    }
}

/// Route error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RouteErrorType {
    NodeUnreachable = 1,
    FlowStateNotSupported = 2,
    OptionNotSupported = 3,
}

impl RouteErrorType {
    pub fn from_u8(value: u8) -> Result<Self, DsrError> {
        match value {
            1 => Ok(RouteErrorType::NodeUnreachable),
            2 => Ok(RouteErrorType::FlowStateNotSupported),
            3 => Ok(RouteErrorType::OptionNotSupported),
            other => Err(DsrError::UnknownErrorType(other)),
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequestOption {
    pub id: u16,
    pub target: NetAddress,
    /// Nodes the request has passed through, originator excluded
    pub addrs: Vec<NetAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteReplyOption {
    pub last_hop_external: bool,
    /// Full discovered path, originator first and target last
    pub addrs: Vec<NetAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteErrorOption {
    pub err_type: RouteErrorType,
    pub salvage: u8,
    /// Node that detected the error
    pub src: NetAddress,
    /// Node the error is reported to
    pub dst: NetAddress,
    pub type_specific: Vec<u8>,
}

impl RouteErrorOption {
    pub fn node_unreachable(
        salvage: u8,
        src: NetAddress,
        dst: NetAddress,
        unreachable: NetAddress,
    ) -> Self {
        Self {
            err_type: RouteErrorType::NodeUnreachable,
            salvage,
            src,
            dst,
            type_specific: unreachable.to_bytes().to_vec(),
        }
    }

    /// Address that could not be reached, for `NodeUnreachable` errors
    pub fn unreachable(&self) -> Option<NetAddress> {
        match self.err_type {
            RouteErrorType::NodeUnreachable => NetAddress::from_slice(&self.type_specific),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRouteOption {
    pub first_hop_external: bool,
    pub last_hop_external: bool,
    pub salvage: u8,
    pub segments_left: u8,
    /// Intermediate hops, neither source nor destination included
    pub addrs: Vec<NetAddress>,
}

impl SourceRouteOption {
    /// Fresh route with every hop still to go
    pub fn new(addrs: Vec<NetAddress>) -> Self {
        Self::with_segments(0, addrs.len() as u8, addrs)
    }

    pub fn with_segments(salvage: u8, segments_left: u8, addrs: Vec<NetAddress>) -> Self {
        Self {
            first_hop_external: false,
            last_hop_external: false,
            salvage,
            segments_left,
            addrs,
        }
    }

    /// Index of the next recipient in `addrs`; `addrs.len()` means the
    /// destination itself. `None` if segments-left overshoots the route.
    pub fn current(&self) -> Option<usize> {
        self.addrs.len().checked_sub(self.segments_left as usize)
    }

    /// Who should receive the packet next
    pub fn next_recipient(&self, dst: NetAddress) -> Option<NetAddress> {
        let cur = self.current()?;
        if cur < self.addrs.len() {
            Some(self.addrs[cur])
        } else {
            Some(dst)
        }
    }

    /// Who transmitted the packet last
    pub fn prev_recipient(&self, src: NetAddress) -> Option<NetAddress> {
        match self.current()? {
            0 => Some(src),
            cur => self.addrs.get(cur - 1).copied(),
        }
    }
}

/// One DSR option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DsrOption {
    RouteRequest(RouteRequestOption),
    RouteReply(RouteReplyOption),
    RouteError(RouteErrorOption),
    AckRequest { id: u16 },
    Ack { id: u16, src: NetAddress, dst: NetAddress },
    SourceRoute(SourceRouteOption),
    Pad1,
    PadN(u8),
    /// Option type this node does not understand, kept verbatim
    Unknown { ty: u8, data: Vec<u8> },
}

impl DsrOption {
    pub fn option_type(&self) -> u8 {
        match self {
            DsrOption::RouteRequest(_) => OPT_ROUTE_REQUEST,
            DsrOption::RouteReply(_) => OPT_ROUTE_REPLY,
            DsrOption::RouteError(_) => OPT_ROUTE_ERROR,
            DsrOption::AckRequest { .. } => OPT_ACK_REQUEST,
            DsrOption::Ack { .. } => OPT_ACK,
            DsrOption::SourceRoute(_) => OPT_SOURCE_ROUTE,
            DsrOption::Pad1 => OPT_PAD1,
            DsrOption::PadN(_) => OPT_PADN,
            DsrOption::Unknown { ty, .. } => *ty,
        }
    }

    /// Encoded size including type and length bytes
    pub fn size(&self) -> usize {
        match self {
            DsrOption::Pad1 => 1,
            other => 2 + other.data_len(),
        }
    }

    fn data_len(&self) -> usize {
        match self {
            DsrOption::RouteRequest(o) => 6 + ADDR * o.addrs.len(),
            DsrOption::RouteReply(o) => 1 + ADDR * o.addrs.len(),
            DsrOption::RouteError(o) => 10 + o.type_specific.len(),
            DsrOption::AckRequest { .. } => 2,
            DsrOption::Ack { .. } => 10,
            DsrOption::SourceRoute(o) => 2 + ADDR * o.addrs.len(),
            DsrOption::Pad1 => 0,
            DsrOption::PadN(n) => *n as usize,
            DsrOption::Unknown { data, .. } => data.len(),
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), DsrError> {
        let ty = self.option_type();
        if let DsrOption::Pad1 = self {
            buf.push(ty);
            return Ok(());
        }

        let len = self.data_len();
        if len > u8::MAX as usize {
            return Err(DsrError::OptionTooLong { ty, len });
        }
        buf.push(ty);
        buf.push(len as u8);

        match self {
            DsrOption::RouteRequest(o) => {
                buf.extend_from_slice(&o.id.to_be_bytes());
                buf.extend_from_slice(&o.target.to_bytes());
                put_addrs(buf, &o.addrs);
            }
            DsrOption::RouteReply(o) => {
                buf.push(if o.last_hop_external { 0x80 } else { 0 });
                put_addrs(buf, &o.addrs);
            }
            DsrOption::RouteError(o) => {
                if o.salvage > MAX_SALVAGE {
                    return Err(DsrError::SalvageOutOfRange(o.salvage));
                }
                buf.push(o.err_type.as_u8());
                buf.push(o.salvage);
                buf.extend_from_slice(&o.src.to_bytes());
                buf.extend_from_slice(&o.dst.to_bytes());
                buf.extend_from_slice(&o.type_specific);
            }
            DsrOption::AckRequest { id } => buf.extend_from_slice(&id.to_be_bytes()),
            DsrOption::Ack { id, src, dst } => {
                buf.extend_from_slice(&id.to_be_bytes());
                buf.extend_from_slice(&src.to_bytes());
                buf.extend_from_slice(&dst.to_bytes());
            }
            DsrOption::SourceRoute(o) => {
                if o.salvage > MAX_SALVAGE {
                    return Err(DsrError::SalvageOutOfRange(o.salvage));
                }
                if o.segments_left > MAX_SEGMENTS_LEFT || o.current().is_none() {
                    return Err(DsrError::SegmentsLeftOutOfRange {
                        segments_left: o.segments_left,
                        addrs: o.addrs.len(),
                    });
                }
                // Salvage straddles bytes 2 and 3
                let mut b2 = o.salvage >> 2;
                if o.first_hop_external {
                    b2 |= 0x80;
                }
                if o.last_hop_external {
                    b2 |= 0x40;
                }
                buf.push(b2);
                buf.push(((o.salvage << 6) & 0xC0) | o.segments_left);
                put_addrs(buf, &o.addrs);
            }
            DsrOption::PadN(n) => buf.resize(buf.len() + *n as usize, 0),
            DsrOption::Unknown { data, .. } => buf.extend_from_slice(data),
            DsrOption::Pad1 => {}
        }
        Ok(())
    }

    fn decode(ty: u8, data: &[u8]) -> Result<Self, DsrError> {
        let bad_len = || DsrError::BadOptionLength {
            ty,
            len: data.len(),
        };
        let opt = match ty {
            OPT_ROUTE_REQUEST => {
                if data.len() < 6 || (data.len() - 6) % ADDR != 0 {
                    return Err(bad_len());
                }
                DsrOption::RouteRequest(RouteRequestOption {
                    id: u16::from_be_bytes([data[0], data[1]]),
                    target: get_addr(&data[2..6])?,
                    addrs: get_addrs(&data[6..])?,
                })
            }
            OPT_ROUTE_REPLY => {
                if data.is_empty() || (data.len() - 1) % ADDR != 0 {
                    return Err(bad_len());
                }
                DsrOption::RouteReply(RouteReplyOption {
                    last_hop_external: data[0] & 0x80 != 0,
                    addrs: get_addrs(&data[1..])?,
                })
            }
            OPT_ROUTE_ERROR => {
                if data.len() < 10 {
                    return Err(bad_len());
                }
                DsrOption::RouteError(RouteErrorOption {
                    err_type: RouteErrorType::from_u8(data[0])?,
                    salvage: data[1] & MAX_SALVAGE,
                    src: get_addr(&data[2..6])?,
                    dst: get_addr(&data[6..10])?,
                    type_specific: data[10..].to_vec(),
                })
            }
            OPT_ACK_REQUEST => {
                if data.len() != 2 {
                    return Err(bad_len());
                }
                DsrOption::AckRequest {
                    id: u16::from_be_bytes([data[0], data[1]]),
                }
            }
            OPT_ACK => {
                if data.len() != 10 {
                    return Err(bad_len());
                }
                DsrOption::Ack {
                    id: u16::from_be_bytes([data[0], data[1]]),
                    src: get_addr(&data[2..6])?,
                    dst: get_addr(&data[6..10])?,
                }
            }
            OPT_SOURCE_ROUTE => {
                if data.len() < 2 || (data.len() - 2) % ADDR != 0 {
                    return Err(bad_len());
                }
                let opt = SourceRouteOption {
                    first_hop_external: data[0] & 0x80 != 0,
                    last_hop_external: data[0] & 0x40 != 0,
                    salvage: ((data[0] & 0x3) << 2) | ((data[1] & 0xC0) >> 6),
                    segments_left: data[1] & MAX_SEGMENTS_LEFT,
                    addrs: get_addrs(&data[2..])?,
                };
                if opt.current().is_none() {
                    return Err(DsrError::SegmentsLeftOutOfRange {
                        segments_left: opt.segments_left,
                        addrs: opt.addrs.len(),
                    });
                }
                DsrOption::SourceRoute(opt)
            }
            OPT_PADN => DsrOption::PadN(data.len() as u8),
            _ => DsrOption::Unknown {
                ty,
                data: data.to_vec(),
            },
        };
        Ok(opt)
    }
}

/// DSR options header plus encapsulated content
#[derive(Debug, Clone, PartialEq)]
pub struct DsrPacket {
    /// Protocol of `content`
    pub next_header: Protocol,
    pub options: Vec<DsrOption>,
    pub content: Option<Box<Payload>>,
}

impl DsrPacket {
    /// Header with no content
    pub fn control(options: Vec<DsrOption>) -> Self {
        Self {
            next_header: crate::net::protocol::NO_NEXT_HEADER,
            options,
            content: None,
        }
    }

    /// Header wrapping `content` of protocol `next_header`
    pub fn encapsulate(next_header: Protocol, content: Payload) -> Self {
        Self {
            next_header,
            options: Vec::new(),
            content: Some(Box::new(content)),
        }
    }

    pub fn options_size(&self) -> usize {
        self.options.iter().map(DsrOption::size).sum()
    }

    pub fn size(&self) -> usize {
        HEADER_SIZE + self.options_size() + self.content.as_ref().map_or(0, |c| c.size())
    }

    pub fn with_option(mut self, opt: DsrOption) -> Self {
        self.options.push(opt);
        self
    }

    pub fn has_option(&self, ty: u8) -> bool {
        self.options.iter().any(|o| o.option_type() == ty)
    }

    pub fn source_route(&self) -> Option<&SourceRouteOption> {
        self.options.iter().find_map(|o| match o {
            DsrOption::SourceRoute(sr) => Some(sr),
            _ => None,
        })
    }

    /// Copy of this header with every Ack-Request stripped
    pub fn without_ack_requests(&self) -> Self {
        let mut copy = self.clone();
        copy.options
            .retain(|o| !matches!(o, DsrOption::AckRequest { .. }));
        copy
    }

    /// Serialize header and options; opaque data content is appended
    pub fn to_bytes(&self) -> Result<Vec<u8>, DsrError> {
        let opt_len = self.options_size();
        if opt_len > u16::MAX as usize {
            return Err(DsrError::OptionTooLong {
                ty: OPT_PADN,
                len: opt_len,
            });
        }

        let mut buf = Vec::with_capacity(HEADER_SIZE + opt_len);
        buf.push(self.next_header as u8);
        buf.push(0);
        buf.extend_from_slice(&(opt_len as u16).to_be_bytes());
        for opt in &self.options {
            opt.encode(&mut buf)?;
        }
        if let Some(content) = &self.content {
            if let Payload::Data(bytes) = content.as_ref() {
                buf.extend_from_slice(bytes);
            }
        }
        Ok(buf)
    }

    /// Parse a header; bytes after the options become opaque data content
    pub fn from_bytes(data: &[u8]) -> Result<Self, DsrError> {
        if data.len() < HEADER_SIZE {
            return Err(DsrError::BufferTooShort {
                need: HEADER_SIZE,
                got: data.len(),
            });
        }
        let opt_len = u16::from_be_bytes([data[2], data[3]]) as usize;
        let end = HEADER_SIZE + opt_len;
        if data.len() < end {
            return Err(DsrError::BufferTooShort {
                need: end,
                got: data.len(),
            });
        }

        let mut options = Vec::new();
        let mut pos = HEADER_SIZE;
        while pos < end {
            let ty = data[pos];
            if ty == OPT_PAD1 {
                options.push(DsrOption::Pad1);
                pos += 1;
                continue;
            }
            if pos + 2 > end {
                return Err(DsrError::OptionOverrun { ty });
            }
            let len = data[pos + 1] as usize;
            let start = pos + 2;
            if start + len > end {
                return Err(DsrError::OptionOverrun { ty });
            }
            options.push(DsrOption::decode(ty, &data[start..start + len])?);
            pos = start + len;
        }

        let content = if data.len() > end {
            Some(Box::new(Payload::Data(data[end..].to_vec())))
        } else {
            None
        };

        Ok(DsrPacket {
            next_header: data[0] as Protocol,
            options,
            content,
        })
    }
}

fn put_addrs(buf: &mut Vec<u8>, addrs: &[NetAddress]) {
    for addr in addrs {
        buf.extend_from_slice(&addr.to_bytes());
    }
}

fn get_addr(data: &[u8]) -> Result<NetAddress, DsrError> {
    NetAddress::from_slice(data).ok_or(DsrError::BufferTooShort {
        need: ADDR,
        got: data.len(),
    })
}

fn get_addrs(data: &[u8]) -> Result<Vec<NetAddress>, DsrError> {
    data.chunks(ADDR).map(get_addr).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol;

    fn addr(n: u32) -> NetAddress {
        NetAddress::from_index(n)
    }

    #[test]
    fn test_route_request_layout() {
        let pkt = DsrPacket::control(vec![DsrOption::RouteRequest(RouteRequestOption {
            id: 0x0102,
            target: addr(9),
            addrs: vec![addr(2)],
        })]);
        let bytes = pkt.to_bytes().unwrap();

        assert_eq!(bytes.len(), pkt.size());
        assert_eq!(&bytes[..4], &[protocol::NO_NEXT_HEADER as u8, 0, 0, 12]);
        assert_eq!(bytes[4], OPT_ROUTE_REQUEST);
        assert_eq!(bytes[5], 10);
        assert_eq!(&bytes[6..8], &[0x01, 0x02]);
        assert_eq!(&bytes[8..12], &addr(9).to_bytes());
        assert_eq!(&bytes[12..16], &addr(2).to_bytes());
    }

    #[test]
    fn test_source_route_salvage_straddles_bytes() {
        let opt = SourceRouteOption {
            first_hop_external: true,
            last_hop_external: false,
            salvage: 0b1011,
            segments_left: 2,
            addrs: vec![addr(1), addr(2), addr(3)],
        };
        let pkt = DsrPacket::control(vec![DsrOption::SourceRoute(opt.clone())]);
        let bytes = pkt.to_bytes().unwrap();

        assert_eq!(bytes[4], OPT_SOURCE_ROUTE);
        assert_eq!(bytes[5], 14);
        assert_eq!(bytes[6], 0x80 | 0b10);
        assert_eq!(bytes[7], 0b1100_0000 | 2);

        let parsed = DsrPacket::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.source_route(), Some(&opt));
    }

    #[test]
    fn test_ack_and_ack_request_sizes() {
        let pkt = DsrPacket::control(vec![
            DsrOption::AckRequest { id: 7 },
            DsrOption::Ack {
                id: 7,
                src: addr(1),
                dst: addr(2),
            },
        ]);
        let bytes = pkt.to_bytes().unwrap();
        assert_eq!(bytes.len(), 4 + 4 + 12);
        assert_eq!(&bytes[4..6], &[OPT_ACK_REQUEST, 2]);
        assert_eq!(&bytes[8..10], &[OPT_ACK, 10]);
    }

    #[test]
    fn test_route_reply_flag_byte() {
        let pkt = DsrPacket::control(vec![DsrOption::RouteReply(RouteReplyOption {
            last_hop_external: true,
            addrs: vec![addr(1), addr(4)],
        })]);
        let bytes = pkt.to_bytes().unwrap();
        assert_eq!(bytes[5], 9);
        assert_eq!(bytes[6], 0x80);
        assert_eq!(&bytes[7..11], &addr(1).to_bytes());
        assert_eq!(DsrPacket::from_bytes(&bytes).unwrap(), pkt);
    }

    #[test]
    fn test_padding_and_unknown_options_parse() {
        let bytes = [
            protocol::UDP as u8,
            0,
            0,
            9,
            OPT_PAD1,
            OPT_PADN,
            2,
            0,
            0,
            0x55,
            2,
            0xAA,
            0xBB,
            b'h',
            b'i',
        ];
        let pkt = DsrPacket::from_bytes(&bytes).unwrap();
        assert_eq!(pkt.next_header, protocol::UDP);
        assert_eq!(
            pkt.options,
            vec![
                DsrOption::Pad1,
                DsrOption::PadN(2),
                DsrOption::Unknown {
                    ty: 0x55,
                    data: vec![0xAA, 0xBB]
                },
            ]
        );
        assert_eq!(pkt.content.as_deref(), Some(&Payload::Data(b"hi".to_vec())));
        assert_eq!(pkt.to_bytes().unwrap(), bytes.to_vec());
    }

    #[test]
    fn test_route_error_unreachable() {
        let err = RouteErrorOption::node_unreachable(3, addr(2), addr(1), addr(3));
        assert_eq!(err.unreachable(), Some(addr(3)));

        let pkt = DsrPacket::control(vec![DsrOption::RouteError(err)]);
        let bytes = pkt.to_bytes().unwrap();
        assert_eq!(&bytes[4..8], &[OPT_ROUTE_ERROR, 14, 1, 3]);
        assert_eq!(DsrPacket::from_bytes(&bytes).unwrap(), pkt);
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(matches!(
            DsrPacket::from_bytes(&[0, 0]),
            Err(DsrError::BufferTooShort { need: 4, got: 2 })
        ));
        // Options length beyond the buffer
        assert!(matches!(
            DsrPacket::from_bytes(&[0, 0, 0, 8, OPT_PAD1]),
            Err(DsrError::BufferTooShort { .. })
        ));
        // Option running past the options area
        assert!(matches!(
            DsrPacket::from_bytes(&[0, 0, 0, 3, OPT_ACK_REQUEST, 2, 0]),
            Err(DsrError::OptionOverrun { ty: OPT_ACK_REQUEST })
        ));
        // Ack-Request with wrong data length
        assert!(matches!(
            DsrPacket::from_bytes(&[0, 0, 0, 3, OPT_ACK_REQUEST, 1, 0]),
            Err(DsrError::BadOptionLength { ty: OPT_ACK_REQUEST, len: 1 })
        ));
        // Segments left larger than the route
        assert!(matches!(
            DsrPacket::from_bytes(&[0, 0, 0, 4, OPT_SOURCE_ROUTE, 2, 0, 1]),
            Err(DsrError::SegmentsLeftOutOfRange { segments_left: 1, addrs: 0 })
        ));
        // Unknown route error type
        let mut bytes = vec![0, 0, 0, 12, OPT_ROUTE_ERROR, 10, 9, 0];
        bytes.extend_from_slice(&[0; 8]);
        assert!(matches!(
            DsrPacket::from_bytes(&bytes),
            Err(DsrError::UnknownErrorType(9))
        ));
    }

    #[test]
    fn test_encode_range_checks() {
        let salvage = DsrPacket::control(vec![DsrOption::SourceRoute(
            SourceRouteOption::with_segments(16, 0, vec![]),
        )]);
        assert!(matches!(
            salvage.to_bytes(),
            Err(DsrError::SalvageOutOfRange(16))
        ));

        let long = DsrPacket::control(vec![DsrOption::SourceRoute(SourceRouteOption::new(
            (0..64).map(addr).collect(),
        ))]);
        assert!(matches!(long.to_bytes(), Err(DsrError::OptionTooLong { .. })));
    }

    #[test]
    fn test_recipients_along_route() {
        let mut sr = SourceRouteOption::new(vec![addr(2), addr(3)]);
        assert_eq!(sr.next_recipient(addr(4)), Some(addr(2)));
        assert_eq!(sr.prev_recipient(addr(1)), Some(addr(1)));

        sr.segments_left = 0;
        assert_eq!(sr.next_recipient(addr(4)), Some(addr(4)));
        assert_eq!(sr.prev_recipient(addr(1)), Some(addr(3)));

        sr.segments_left = 3;
        assert_eq!(sr.next_recipient(addr(4)), None);
        assert_eq!(sr.prev_recipient(addr(1)), None);
    }

    #[test]
    fn test_unrecognized_policy_bits() {
        assert_eq!(UnrecognizedPolicy::from_type(0x05), UnrecognizedPolicy::Ignore);
        assert_eq!(UnrecognizedPolicy::from_type(0x25), UnrecognizedPolicy::Remove);
        assert_eq!(UnrecognizedPolicy::from_type(0x45), UnrecognizedPolicy::Mark);
        assert_eq!(UnrecognizedPolicy::from_type(0x65), UnrecognizedPolicy::DropPacket);
    }

    #[test]
    fn test_size_counts_content() {
        let pkt = DsrPacket::encapsulate(protocol::UDP, Payload::Data(vec![0; 10]))
            .with_option(DsrOption::SourceRoute(SourceRouteOption::new(vec![addr(2)])));
        assert_eq!(pkt.size(), 4 + 8 + 10);
        assert!(pkt.has_option(OPT_SOURCE_ROUTE));
        assert!(!pkt.has_option(OPT_ACK_REQUEST));
    }
}
