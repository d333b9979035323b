//! A message is an ordered sequence of packets, serialized by simple
//! concatenation, plus the exhaustive dispatch from packet tags to their
//! typed payload decoders.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::ascii_armor::{ArmorBlock, AsciiArmorMessage};
use crate::encrypted::{
    IntegrityProtectedDataPacket, LiteralDataPacket, ModificationDetectionPacket,
    PublicKeyEncryptedSessionPacket,
};
use crate::key::{PublicKeyPacket, UserIdPacket};
use crate::packet::{parse_packets, Packet, PacketTag, Packetable};
use crate::sig::SignaturePacket;
use crate::PgpError;

/// An ordered sequence of packets. Concatenation order is significant and
/// round-trips exactly.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Message {
    pub packets: Vec<Packet>,
}

impl Message {
    pub fn new(packets: Vec<Packet>) -> Message {
        Message { packets }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Message, PgpError> {
        Ok(Message {
            packets: parse_packets(data)?,
        })
    }

    pub fn from_base64(encoded: &str) -> Result<Message, PgpError> {
        Message::from_bytes(&BASE64.decode(encoded)?)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::new();
        for packet in &self.packets {
            data.extend(packet.to_bytes());
        }
        data
    }

    pub fn armored(&self, block_type: ArmorBlock) -> AsciiArmorMessage {
        AsciiArmorMessage::from_message(self, block_type)
    }
}

/// A decoded packet payload, one variant per payload codec.
///
/// The dispatch in [`AnyPacket::decode`] matches every [`PacketTag`]
/// variant with no fallthrough, so extending the tag registry without
/// wiring up a decoder fails to compile.
#[derive(Clone, Debug)]
pub enum AnyPacket {
    PublicKeyEncryptedSession(PublicKeyEncryptedSessionPacket),
    Signature(SignaturePacket),
    PublicKey(PublicKeyPacket),
    PublicSubkey(PublicKeyPacket),
    LiteralData(LiteralDataPacket),
    UserId(UserIdPacket),
    IntegrityProtectedData(IntegrityProtectedDataPacket),
    ModificationDetection(ModificationDetectionPacket),
}

impl AnyPacket {
    /// Decode a frame's payload according to its tag.
    ///
    /// Tags that are registered but carry no payload codec (symmetric-key
    /// session keys, one-pass signatures) are rejected explicitly.
    pub fn decode(packet: &Packet) -> Result<AnyPacket, PgpError> {
        match packet.header.tag {
            PacketTag::PublicKeyEncryptedSession => Ok(AnyPacket::PublicKeyEncryptedSession(
                PublicKeyEncryptedSessionPacket::from_packet(packet)?,
            )),
            PacketTag::Signature => Ok(AnyPacket::Signature(SignaturePacket::from_packet(packet)?)),
            PacketTag::SymmetricKeyEncryptedSession => {
                Err(PgpError::UnsupportedPacket(packet.header.tag))
            }
            PacketTag::OnePassSignature => Err(PgpError::UnsupportedPacket(packet.header.tag)),
            PacketTag::PublicKey => Ok(AnyPacket::PublicKey(PublicKeyPacket::from_packet(packet)?)),
            PacketTag::LiteralData => {
                Ok(AnyPacket::LiteralData(LiteralDataPacket::from_packet(packet)?))
            }
            PacketTag::UserId => Ok(AnyPacket::UserId(UserIdPacket::from_packet(packet)?)),
            PacketTag::PublicSubkey => {
                Ok(AnyPacket::PublicSubkey(PublicKeyPacket::from_packet(packet)?))
            }
            PacketTag::IntegrityProtectedData => Ok(AnyPacket::IntegrityProtectedData(
                IntegrityProtectedDataPacket::from_packet(packet)?,
            )),
            PacketTag::ModificationDetection => Ok(AnyPacket::ModificationDetection(
                ModificationDetectionPacket::from_packet(packet)?,
            )),
        }
    }
}
