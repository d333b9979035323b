//! Packet framing: the tag octet, the two variable-length body encodings,
//! and the splitting of a byte buffer into a sequence of framed packets.
//!
//! See RFC 4880 section 4. Only new-format headers are emitted; old-format
//! headers are accepted on decode for compatibility.

use std::fmt;
use std::ops::Range;

use byteorder::{BigEndian, ByteOrder};

use crate::PgpError;

/// The packet type registry (RFC 4880 section 4.3).
///
/// This is a closed set: a tag octet outside it is a parse error, never a
/// silent skip.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum PacketTag {
    PublicKeyEncryptedSession = 1,
    Signature = 2,
    SymmetricKeyEncryptedSession = 3,
    OnePassSignature = 4,
    PublicKey = 6,
    LiteralData = 11,
    UserId = 13,
    PublicSubkey = 14,
    IntegrityProtectedData = 18,
    ModificationDetection = 19,
}

impl PacketTag {
    pub fn from_raw(tag: u8) -> Result<PacketTag, PgpError> {
        match tag {
            1 => Ok(PacketTag::PublicKeyEncryptedSession),
            2 => Ok(PacketTag::Signature),
            3 => Ok(PacketTag::SymmetricKeyEncryptedSession),
            4 => Ok(PacketTag::OnePassSignature),
            6 => Ok(PacketTag::PublicKey),
            11 => Ok(PacketTag::LiteralData),
            13 => Ok(PacketTag::UserId),
            14 => Ok(PacketTag::PublicSubkey),
            18 => Ok(PacketTag::IntegrityProtectedData),
            19 => Ok(PacketTag::ModificationDetection),
            _ => Err(PgpError::UnsupportedTag(tag)),
        }
    }

    pub fn raw(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PacketTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            PacketTag::PublicKeyEncryptedSession => "public-key encrypted session key",
            PacketTag::Signature => "signature",
            PacketTag::SymmetricKeyEncryptedSession => "symmetric-key encrypted session key",
            PacketTag::OnePassSignature => "one-pass signature",
            PacketTag::PublicKey => "public key",
            PacketTag::LiteralData => "literal data",
            PacketTag::UserId => "user ID",
            PacketTag::PublicSubkey => "public sub-key",
            PacketTag::IntegrityProtectedData => "integrity protected data",
            PacketTag::ModificationDetection => "modification detection code",
        })
    }
}

/// New-format length sub-formats (RFC 4880 section 4.2.2).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum NewFormatType {
    OneOctet,
    TwoOctet,
    FiveOctet,
}

/// Old-format length sub-formats (RFC 4880 section 4.2.1).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OldFormatType {
    OneOctet = 0,
    TwoOctet = 1,
    FourOctet = 2,
}

/// Which length family a packet header uses. Old-format packets are
/// decode-compatibility only; everything this crate emits is new-format.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum LengthFormat {
    New(NewFormatType),
    Old(OldFormatType),
}

/// A decoded or constructed packet body length, together with the exact
/// bytes of its encoded length field.
///
/// Encoding always selects the smallest sub-format able to represent the
/// body length, so encode/decode round-trips are byte-identical.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PacketLength {
    pub format: LengthFormat,
    pub body: usize,
    field: Vec<u8>,
}

impl PacketLength {
    /// Encode a body length in the new format.
    pub fn new(body: usize) -> Result<PacketLength, PgpError> {
        match body {
            0..=191 => Ok(PacketLength {
                format: LengthFormat::New(NewFormatType::OneOctet),
                body,
                field: vec![body as u8],
            }),
            192..=8383 => {
                let n = body - 192;
                Ok(PacketLength {
                    format: LengthFormat::New(NewFormatType::TwoOctet),
                    body,
                    field: vec![((n >> 8) + 192) as u8, (n & 0xff) as u8],
                })
            }
            _ if body <= u32::MAX as usize => {
                let mut field = vec![0xff, 0, 0, 0, 0];
                BigEndian::write_u32(&mut field[1..], body as u32);
                Ok(PacketLength {
                    format: LengthFormat::New(NewFormatType::FiveOctet),
                    body,
                    field,
                })
            }
            _ => Err(PgpError::BodyLengthTooLong(body)),
        }
    }

    /// Encode a body length in the old format. Decode-compatibility only;
    /// note the format's gaps at 255 and 65535.
    pub fn old(body: usize) -> Result<PacketLength, PgpError> {
        match body {
            0..=254 => Ok(PacketLength {
                format: LengthFormat::Old(OldFormatType::OneOctet),
                body,
                field: vec![body as u8],
            }),
            256..=65534 => {
                let mut field = vec![0, 0];
                BigEndian::write_u16(&mut field, body as u16);
                Ok(PacketLength {
                    format: LengthFormat::Old(OldFormatType::TwoOctet),
                    body,
                    field,
                })
            }
            65536..=0x7fff_ffff => {
                let mut field = vec![0, 0, 0, 0];
                BigEndian::write_u32(&mut field, body as u32);
                Ok(PacketLength {
                    format: LengthFormat::Old(OldFormatType::FourOctet),
                    body,
                    field,
                })
            }
            _ => Err(PgpError::BodyLengthTooLong(body)),
        }
    }

    /// Decode a new-format length field from the bytes following the tag
    /// octet.
    pub fn from_new_format(bytes: &[u8]) -> Result<PacketLength, PgpError> {
        match bytes.first() {
            None => Err(PgpError::TooShort(0)),
            Some(&octet @ 0..=191) => Ok(PacketLength {
                format: LengthFormat::New(NewFormatType::OneOctet),
                body: octet as usize,
                field: vec![octet],
            }),
            Some(&octet @ 192..=253) => {
                if bytes.len() < 2 {
                    return Err(PgpError::TooShort(bytes.len()));
                }
                let body = (((octet as usize) - 192) << 8) + bytes[1] as usize + 192;
                Ok(PacketLength {
                    format: LengthFormat::New(NewFormatType::TwoOctet),
                    body,
                    field: bytes[..2].to_vec(),
                })
            }
            Some(&255) => {
                if bytes.len() < 5 {
                    return Err(PgpError::TooShort(bytes.len()));
                }
                Ok(PacketLength {
                    format: LengthFormat::New(NewFormatType::FiveOctet),
                    body: BigEndian::read_u32(&bytes[1..5]) as usize,
                    field: bytes[..5].to_vec(),
                })
            }
            Some(&octet) => Err(PgpError::UnsupportedNewFormatLength(octet)),
        }
    }

    /// Decode an old-format length field given the length-type bits from
    /// the tag octet.
    pub fn from_old_format(bytes: &[u8], length_type: u8) -> Result<PacketLength, PgpError> {
        match length_type {
            0 => {
                if bytes.is_empty() {
                    return Err(PgpError::TooShort(0));
                }
                Ok(PacketLength {
                    format: LengthFormat::Old(OldFormatType::OneOctet),
                    body: bytes[0] as usize,
                    field: bytes[..1].to_vec(),
                })
            }
            1 => {
                if bytes.len() < 2 {
                    return Err(PgpError::TooShort(bytes.len()));
                }
                Ok(PacketLength {
                    format: LengthFormat::Old(OldFormatType::TwoOctet),
                    body: BigEndian::read_u16(&bytes[..2]) as usize,
                    field: bytes[..2].to_vec(),
                })
            }
            2 => {
                if bytes.len() < 4 {
                    return Err(PgpError::TooShort(bytes.len()));
                }
                Ok(PacketLength {
                    format: LengthFormat::Old(OldFormatType::FourOctet),
                    body: BigEndian::read_u32(&bytes[..4]) as usize,
                    field: bytes[..4].to_vec(),
                })
            }
            _ => Err(PgpError::UnsupportedOldFormatLength(length_type)),
        }
    }

    /// The exact encoded bytes of the length field.
    pub fn field_bytes(&self) -> &[u8] {
        &self.field
    }

    /// The number of bytes the encoded length field occupies.
    pub fn byte_len(&self) -> usize {
        self.field.len()
    }

    pub fn is_new_format(&self) -> bool {
        matches!(self.format, LengthFormat::New(_))
    }
}

/// A packet header: the tag plus the encoded body length.
///
/// Tag octet layout: bit 7 always set, bit 6 selects new format. New-format
/// headers carry the tag in the low six bits; old-format headers carry
/// `tag << 2 | length_type`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PacketHeader {
    pub tag: PacketTag,
    pub length: PacketLength,
}

impl PacketHeader {
    /// Build a new-format header for a body of the given length.
    pub fn new(tag: PacketTag, body_len: usize) -> Result<PacketHeader, PgpError> {
        Ok(PacketHeader {
            tag,
            length: PacketLength::new(body_len)?,
        })
    }

    /// Parse a header from the start of `data`.
    pub fn from_bytes(data: &[u8]) -> Result<PacketHeader, PgpError> {
        let first = *data.first().ok_or(PgpError::TooShort(0))?;

        if first & 0b1000_0000 == 0 {
            return Err(PgpError::MsbUnset);
        }

        if first & 0b0100_0000 != 0 {
            let tag = PacketTag::from_raw(first & 0b0011_1111)?;
            let length = PacketLength::from_new_format(&data[1..])?;
            Ok(PacketHeader { tag, length })
        } else {
            let tag = PacketTag::from_raw((first & 0b0011_1100) >> 2)?;
            let length = PacketLength::from_old_format(&data[1..], first & 0b0000_0011)?;
            Ok(PacketHeader { tag, length })
        }
    }

    /// Header size on the wire: one tag octet plus the length field.
    pub fn real_length(&self) -> usize {
        1 + self.length.byte_len()
    }

    /// The body's byte range within a buffer that starts at this header.
    ///
    /// A declared body length that does not fit the address space is an
    /// error, not a wrap-around.
    pub fn body_range(&self) -> Result<Range<usize>, PgpError> {
        let start = self.real_length();
        let end = start
            .checked_add(self.length.body)
            .ok_or(PgpError::BodyLengthTooLong(self.length.body))?;
        Ok(start..end)
    }

    fn tag_byte(&self) -> u8 {
        const MSB: u8 = 0b1000_0000;
        match self.length.format {
            LengthFormat::New(_) => MSB | 0b0100_0000 | self.tag.raw(),
            LengthFormat::Old(length_type) => MSB | (self.tag.raw() << 2) | length_type as u8,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.real_length());
        bytes.push(self.tag_byte());
        bytes.extend_from_slice(self.length.field_bytes());
        bytes
    }
}

/// A single framed packet: header plus owned body bytes.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Packet {
    pub header: PacketHeader,
    pub body: Vec<u8>,
}

impl Packet {
    /// Frame a body under a new-format header.
    pub fn new(tag: PacketTag, body: Vec<u8>) -> Result<Packet, PgpError> {
        let header = PacketHeader::new(tag, body.len())?;
        Ok(Packet { header, body })
    }

    /// Total size on the wire, header included.
    pub fn wire_len(&self) -> usize {
        self.header.real_length() + self.body.len()
    }

    pub fn body_is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = self.header.to_bytes();
        data.extend_from_slice(&self.body);
        data
    }
}

/// Split a buffer into its framed packets.
///
/// The buffer must be an exact concatenation of packets: a header whose
/// declared body extends past the end of the buffer is an error, and so is
/// any trailing garbage (it will fail to parse as a header).
pub fn parse_packets(data: &[u8]) -> Result<Vec<Packet>, PgpError> {
    let mut packets = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let rest = &data[offset..];
        let header = PacketHeader::from_bytes(rest)?;

        let range = header.body_range()?;
        if range.end > rest.len() {
            return Err(PgpError::BodyOutOfRange {
                end: range.end,
                available: rest.len(),
            });
        }

        let body = rest[range].to_vec();
        offset += header.real_length() + body.len();
        packets.push(Packet { header, body });
    }

    Ok(packets)
}

/// The capability contract typed packets implement: construct from a frame
/// and serialize back to one.
pub trait Packetable: Sized {
    /// The tag this payload type is framed under.
    const TAG: PacketTag;

    /// Decode the payload from a framed packet.
    fn from_packet(packet: &Packet) -> Result<Self, PgpError>;

    /// Serialize the payload to packet body bytes.
    fn body(&self) -> Result<Vec<u8>, PgpError>;

    /// Frame the payload under a new-format header.
    fn to_packet(&self) -> Result<Packet, PgpError> {
        Packet::new(Self::TAG, self.body()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PgpError;

    fn round_trip(body: usize) -> PacketLength {
        let length = PacketLength::new(body).unwrap();
        let decoded = PacketLength::from_new_format(length.field_bytes()).unwrap();
        assert_eq!(decoded.body, body);
        assert_eq!(decoded.byte_len(), length.byte_len());
        decoded
    }

    #[test]
    fn new_format_length_boundaries() {
        assert_eq!(round_trip(0).byte_len(), 1);
        assert_eq!(round_trip(191).byte_len(), 1);
        assert_eq!(round_trip(192).byte_len(), 2);
        assert_eq!(round_trip(8383).byte_len(), 2);
        assert_eq!(round_trip(8384).byte_len(), 5);
        assert_eq!(round_trip(u32::MAX as usize).byte_len(), 5);
    }

    #[test]
    fn new_format_two_octet_encoding() {
        let length = PacketLength::new(192).unwrap();
        assert_eq!(length.field_bytes(), &[192, 0]);
        let length = PacketLength::new(8383).unwrap();
        assert_eq!(length.field_bytes(), &[223, 255]);
    }

    #[test]
    fn new_format_five_octet_keeps_marker() {
        let length = PacketLength::from_new_format(&[0xff, 0, 0x01, 0x00, 0x00]).unwrap();
        assert_eq!(length.body, 0x10000);
        assert_eq!(length.field_bytes(), &[0xff, 0, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn length_too_long() {
        if usize::BITS > 32 {
            let body = u32::MAX as usize + 1;
            assert!(matches!(
                PacketLength::new(body),
                Err(PgpError::BodyLengthTooLong(_))
            ));
        }
    }

    #[test]
    fn partial_length_code_rejected() {
        assert!(matches!(
            PacketLength::from_new_format(&[254, 0]),
            Err(PgpError::UnsupportedNewFormatLength(254))
        ));
    }

    #[test]
    fn truncated_length_fields() {
        assert!(matches!(
            PacketLength::from_new_format(&[]),
            Err(PgpError::TooShort(0))
        ));
        assert!(matches!(
            PacketLength::from_new_format(&[200]),
            Err(PgpError::TooShort(1))
        ));
        assert!(matches!(
            PacketLength::from_new_format(&[255, 0, 0]),
            Err(PgpError::TooShort(3))
        ));
    }

    #[test]
    fn old_format_decode() {
        let length = PacketLength::from_old_format(&[0x2a], 0).unwrap();
        assert_eq!(length.body, 42);
        let length = PacketLength::from_old_format(&[0x01, 0x00], 1).unwrap();
        assert_eq!(length.body, 256);
        let length = PacketLength::from_old_format(&[0x00, 0x01, 0x00, 0x00], 2).unwrap();
        assert_eq!(length.body, 0x10000);
        assert!(matches!(
            PacketLength::from_old_format(&[0], 3),
            Err(PgpError::UnsupportedOldFormatLength(3))
        ));
    }

    #[test]
    fn old_format_encode_gaps() {
        assert_eq!(PacketLength::old(254).unwrap().byte_len(), 1);
        assert!(matches!(
            PacketLength::old(255),
            Err(PgpError::BodyLengthTooLong(255))
        ));
        assert_eq!(PacketLength::old(65534).unwrap().byte_len(), 2);
        assert!(matches!(
            PacketLength::old(65535),
            Err(PgpError::BodyLengthTooLong(65535))
        ));
        assert_eq!(PacketLength::old(65536).unwrap().byte_len(), 4);
    }

    #[test]
    fn header_round_trip() {
        let header = PacketHeader::new(PacketTag::Signature, 300).unwrap();
        let bytes = header.to_bytes();
        let parsed = PacketHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.real_length(), 3);
        assert_eq!(parsed.body_range().unwrap(), 3..303);
    }

    #[test]
    fn old_format_header_decode() {
        // Signature packet, old format, two-octet length: 0x89.
        let parsed = PacketHeader::from_bytes(&[0x89, 0x01, 0x00]).unwrap();
        assert_eq!(parsed.tag, PacketTag::Signature);
        assert_eq!(parsed.length.body, 256);
        assert!(!parsed.length.is_new_format());
        assert_eq!(parsed.to_bytes(), vec![0x89, 0x01, 0x00]);
    }

    #[test]
    fn msb_unset_is_an_error() {
        assert!(matches!(
            PacketHeader::from_bytes(&[0x00]),
            Err(PgpError::MsbUnset)
        ));
        assert!(matches!(
            PacketHeader::from_bytes(&[0x7f, 0x00]),
            Err(PgpError::MsbUnset)
        ));
    }

    #[test]
    fn unknown_tag_is_an_error() {
        // New format, tag 5 (secret key) is outside the registry.
        assert!(matches!(
            PacketHeader::from_bytes(&[0b1100_0101, 0x00]),
            Err(PgpError::UnsupportedTag(5))
        ));
    }

    #[test]
    fn parse_packets_round_trip() {
        let a = Packet::new(PacketTag::UserId, b"alice".to_vec()).unwrap();
        let b = Packet::new(PacketTag::LiteralData, vec![0x42; 500]).unwrap();

        let mut buffer = a.to_bytes();
        buffer.extend(b.to_bytes());

        let packets = parse_packets(&buffer).unwrap();
        assert_eq!(packets, vec![a, b]);

        let rejoined: Vec<u8> = packets.iter().flat_map(|p| p.to_bytes()).collect();
        assert_eq!(rejoined, buffer);
    }

    #[test]
    fn parse_packets_empty_buffer() {
        assert!(parse_packets(&[]).unwrap().is_empty());
    }

    #[test]
    fn parse_packets_truncated_body() {
        let packet = Packet::new(PacketTag::UserId, b"alice".to_vec()).unwrap();
        let bytes = packet.to_bytes();
        assert!(matches!(
            parse_packets(&bytes[..bytes.len() - 1]),
            Err(PgpError::BodyOutOfRange { .. })
        ));
    }

    #[test]
    fn parse_packets_maximal_declared_body() {
        // A five-octet length claiming u32::MAX bytes must error out, not
        // wrap or panic, however small the buffer is.
        let buffer = [0b1100_1011, 0xff, 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(
            parse_packets(&buffer),
            Err(PgpError::BodyOutOfRange { .. }) | Err(PgpError::BodyLengthTooLong(_))
        ));
    }

    #[test]
    fn wire_len_counts_the_header() {
        let packet = Packet::new(PacketTag::UserId, Vec::new()).unwrap();
        assert_eq!(packet.wire_len(), 2);
        assert!(packet.body_is_empty());
        assert_eq!(packet.to_bytes().len(), packet.wire_len());
    }

    #[test]
    fn parse_packets_zero_length_body() {
        let packet = Packet::new(PacketTag::UserId, Vec::new()).unwrap();
        let packets = parse_packets(&packet.to_bytes()).unwrap();
        assert_eq!(packets.len(), 1);
        assert!(packets[0].body.is_empty());
    }
}
