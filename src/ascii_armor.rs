//! ASCII armor: the base64 text envelope around raw packet bytes, with a
//! CRC-24 integrity trailer (RFC 4880 section 6).

use std::fmt::{self, Display};
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::message::Message;
use crate::packet::parse_packets;
use crate::sig::{HashAlgorithm, SigKind, SignatureBuilder, SignaturePacket};
use crate::key::PublicKeyPacket;
use crate::packet::Packetable;
use crate::PgpError;

const BEGIN_MARKER: &str = "-----BEGIN PGP ";
const END_MARKER: &str = "-----END PGP ";
const DASHES: &str = "-----";

/// Armor body lines wrap at this column.
const LINE_WIDTH: usize = 64;

/// Compute the OpenPGP CRC-24 of a byte sequence.
///
/// Translation of the checksum function from RFC 4880, section 6.1.
pub fn crc24(data: &[u8]) -> u32 {
    const CRC24_INIT: u32 = 0x00b7_04ce;
    const CRC24_POLY: u32 = 0x0186_4cfb;

    let mut crc = CRC24_INIT;

    for &byte in data {
        crc ^= (byte as u32) << 16;

        for _ in 0..8 {
            crc <<= 1;

            if (crc & 0x0100_0000) != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }

    crc & 0x00ff_ffff
}

/// The CRC-24 as the three big-endian octets that go into the armor trailer.
pub fn crc24_bytes(data: &[u8]) -> [u8; 3] {
    let crc = crc24(data);
    [(crc >> 16) as u8, (crc >> 8) as u8, crc as u8]
}

/// The block type named in the armor's begin and end lines.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ArmorBlock {
    PublicKey,
    Signature,
    Message,
}

impl ArmorBlock {
    fn label(self) -> &'static str {
        match self {
            ArmorBlock::PublicKey => "PUBLIC KEY BLOCK",
            ArmorBlock::Signature => "SIGNATURE",
            ArmorBlock::Message => "MESSAGE",
        }
    }

    pub fn begin_line(self) -> String {
        format!("{}{}{}", BEGIN_MARKER, self.label(), DASHES)
    }

    pub fn end_line(self) -> String {
        format!("{}{}{}", END_MARKER, self.label(), DASHES)
    }

    fn from_line(line: &str) -> Option<ArmorBlock> {
        let stripped = line
            .trim()
            .replace(BEGIN_MARKER, "")
            .replace(END_MARKER, "")
            .replace(DASHES, "");

        match stripped.as_str() {
            "PUBLIC KEY BLOCK" => Some(ArmorBlock::PublicKey),
            "SIGNATURE" => Some(ArmorBlock::Signature),
            "MESSAGE" => Some(ArmorBlock::Message),
            _ => None,
        }
    }
}

/// An ASCII armored message: raw packet bytes plus the envelope metadata.
///
/// ```text
/// -----BEGIN PGP MESSAGE-----
/// Version: ...
///
/// <base64 packet data, 64 columns>
/// =<base64 CRC-24>
/// -----END PGP MESSAGE-----
/// ```
///
/// Encoding is via `Display`, decoding via `FromStr`. A decoded envelope
/// whose CRC-24 trailer does not match the body is rejected outright.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct AsciiArmorMessage {
    pub packet_data: Vec<u8>,
    pub crc_checksum: [u8; 3],
    pub block_type: ArmorBlock,
    headers: Vec<(String, String)>,
}

impl AsciiArmorMessage {
    /// Wrap raw packet data in an armor envelope with the default headers.
    pub fn new(packet_data: Vec<u8>, block_type: ArmorBlock) -> AsciiArmorMessage {
        let crc_checksum = crc24_bytes(&packet_data);
        AsciiArmorMessage {
            packet_data,
            crc_checksum,
            block_type,
            headers: vec![
                (
                    "Version".to_string(),
                    concat!("chainpgp/", env!("CARGO_PKG_VERSION")).to_string(),
                ),
                ("Comment".to_string(), "chain-bound message".to_string()),
                ("Charset".to_string(), "UTF-8".to_string()),
            ],
        }
    }

    pub fn from_message(message: &Message, block_type: ArmorBlock) -> AsciiArmorMessage {
        AsciiArmorMessage::new(message.to_bytes(), block_type)
    }

    /// Header lines in emission order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Set a header, overwriting an existing key in place so emission order
    /// is stable.
    pub fn set_header(&mut self, key: &str, value: &str) {
        if let Some(entry) = self.headers.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value.to_string();
        } else {
            self.headers.push((key.to_string(), value.to_string()));
        }
    }

    /// Build a detached-signature armor from an externally computed hash and
    /// signature, optionally attaching the signer's public key packet.
    pub fn from_detached_signature(
        hash: &[u8],
        signature: Vec<u8>,
        chain_id: u8,
        public_key: Option<&PublicKeyPacket>,
    ) -> Result<AsciiArmorMessage, PgpError> {
        let builder = SignatureBuilder::new(SigKind::TextDocument, chain_id, HashAlgorithm::Sha256);
        let packet = builder.finish(hash, signature)?;

        let mut packet_data = packet.to_packet()?.to_bytes();
        if let Some(key) = public_key {
            packet_data.extend(key.to_packet()?.to_bytes());
        }

        Ok(AsciiArmorMessage::new(packet_data, ArmorBlock::Signature))
    }

    /// Extract the signature packet (and the signer's public key packet, if
    /// one follows it) from a decoded armor.
    pub fn decode_signature(
        &self,
    ) -> Result<(SignaturePacket, Option<PublicKeyPacket>), PgpError> {
        let packets = parse_packets(&self.packet_data)?;
        let first = packets.first().ok_or(PgpError::InvalidArmor)?;
        let signature = SignaturePacket::from_packet(first)?;

        let public_key = packets
            .get(1)
            .and_then(|packet| PublicKeyPacket::from_packet(packet).ok());

        Ok((signature, public_key))
    }
}

impl Display for AsciiArmorMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.block_type.begin_line())?;

        for (key, value) in &self.headers {
            writeln!(f, "{}: {}", key, value)?;
        }
        writeln!(f)?;

        // base64 output is pure ASCII, so slicing by byte index is safe
        let encoded = BASE64.encode(&self.packet_data);
        let mut rest = encoded.as_str();
        while !rest.is_empty() {
            let split = LINE_WIDTH.min(rest.len());
            writeln!(f, "{}", &rest[..split])?;
            rest = &rest[split..];
        }

        writeln!(f, "={}", BASE64.encode(self.crc_checksum))?;
        write!(f, "{}", self.block_type.end_line())
    }
}

impl FromStr for AsciiArmorMessage {
    type Err = PgpError;

    fn from_str(s: &str) -> Result<AsciiArmorMessage, PgpError> {
        // Anything before the begin marker is ignored, not an error.
        let start = s.find(BEGIN_MARKER.trim_end()).ok_or(PgpError::NoValidHeader)?;

        let lines: Vec<&str> = s[start..]
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let first = lines.first().ok_or(PgpError::NoValidHeader)?;
        let block_type = ArmorBlock::from_line(first).ok_or(PgpError::NoValidHeader)?;

        if lines.len() < 4 {
            return Err(PgpError::InvalidArmor);
        }

        // Header lines run until the first line without a colon.
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut cursor = 1;
        while cursor < lines.len() - 2 {
            let Some((key, value)) = lines[cursor].split_once(':') else {
                break;
            };
            let key = key.trim().to_string();
            let value = value.trim().to_string();
            if let Some(entry) = headers.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
            } else {
                headers.push((key, value));
            }
            cursor += 1;
        }

        let checksum_line = lines[lines.len() - 2];
        let checksum_b64 = checksum_line
            .strip_prefix('=')
            .ok_or(PgpError::MissingChecksum)?;
        let declared_crc = BASE64.decode(checksum_b64)?;

        let footer = ArmorBlock::from_line(lines[lines.len() - 1]).ok_or(PgpError::InvalidArmor)?;
        if footer != block_type {
            return Err(PgpError::BlockLineMismatch);
        }

        let packet_data = BASE64.decode(lines[cursor..lines.len() - 2].concat())?;

        let crc_checksum = crc24_bytes(&packet_data);
        if declared_crc.as_slice() != crc_checksum {
            return Err(PgpError::InvalidChecksum);
        }

        Ok(AsciiArmorMessage {
            packet_data,
            crc_checksum,
            block_type,
            headers,
        })
    }
}
