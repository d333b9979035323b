//! This library implements an OpenPGP-derived binary message format for
//! wallet applications: typed, length-prefixed packets that carry detached
//! signatures and encrypted payloads bound to blockchain identities
//! (chain ID + public key) rather than classic OpenPGP key IDs.
//!
//! The wire format follows RFC 4880 packet framing (tag octet plus
//! old/new-format variable-length body) and ASCII armor (base64 envelope
//! with a CRC-24 trailer), but repurposes the signature packet's
//! public-key-algorithm octet as a chain identifier.
//!
//! Cryptographic primitives stay at the edge: signing and verification
//! happen outside this crate (it only prepares the exact byte string to
//! hash), while the sealed-data packet uses AES-256-GCM with a
//! caller-supplied key.

mod ascii_armor;
mod encrypted;
mod key;
mod message;
mod packet;
mod sig;

pub use ascii_armor::{crc24, crc24_bytes, ArmorBlock, AsciiArmorMessage};
pub use encrypted::{
    IntegrityProtectedDataPacket, LiteralDataPacket, LiteralFormat, ModificationDetectionPacket,
    PublicKeyEncryptedSessionPacket, SESSION_KEY_SIZE,
};
pub use key::{MPInt, PublicKeyAlgorithm, PublicKeyPacket, UserIdPacket, PUBLIC_KEY_VERSION};
pub use message::{AnyPacket, Message};
pub use packet::{
    parse_packets, LengthFormat, NewFormatType, OldFormatType, Packet, PacketHeader, PacketLength,
    PacketTag, Packetable,
};
pub use sig::{
    HashAlgorithm, SigKind, SignatureBuilder, SignaturePacket, Subpacket, SIGNATURE_VERSION,
};

use thiserror::Error;

/// An OpenPGP public key fingerprint (SHA-1, twenty octets).
pub type Fingerprint = [u8; 20];
/// The trailing eight octets of a key fingerprint.
pub type KeyId = [u8; 8];

/// An error raised while encoding or decoding packet data or ASCII armor.
///
/// Every variant is terminal for the operation that raised it: a single
/// malformed field invalidates the whole decode, and nothing is retried or
/// downgraded to a partial result.
#[derive(Error, Debug)]
pub enum PgpError {
    /// The most significant bit of a packet tag octet must always be set.
    #[error("packet tag octet has its most significant bit unset")]
    MsbUnset,
    /// A tag value outside the supported packet registry.
    #[error("unsupported packet tag {0}")]
    UnsupportedTag(u8),
    /// A frame with a known tag that has no payload codec.
    #[error("no payload codec for {0} packets")]
    UnsupportedPacket(PacketTag),
    /// A typed packet decoder was handed a frame with the wrong tag.
    #[error("unexpected packet tag {0}")]
    UnexpectedTag(PacketTag),
    /// First octet of a new-format length field is the reserved partial code.
    #[error("unsupported new-format length type {0}")]
    UnsupportedNewFormatLength(u8),
    /// Old-format length type code outside 0..=2.
    #[error("unsupported old-format length type {0}")]
    UnsupportedOldFormatLength(u8),
    /// A body length that no sub-format of the selected family can encode.
    #[error("packet body length {0} is too long to encode")]
    BodyLengthTooLong(usize),
    /// Fewer bytes available than the structure requires.
    #[error("data too short: {0} bytes available")]
    TooShort(usize),
    /// A header declared a body range extending past the available bytes.
    #[error("packet body ends at byte {end} but only {available} bytes are available")]
    BodyOutOfRange { end: usize, available: usize },
    /// A packet version this implementation does not support.
    #[error("unsupported packet version {0}")]
    UnsupportedVersion(u8),
    /// An unknown signature kind octet.
    #[error("unsupported signature kind {0}")]
    UnsupportedSignatureKind(u8),
    /// An unknown hash algorithm octet.
    #[error("unsupported hash algorithm {0}")]
    UnsupportedHashAlgorithm(u8),
    /// An unknown or unsupported public-key algorithm octet.
    #[error("unsupported public-key algorithm {0}")]
    UnsupportedAlgorithm(u8),
    /// A literal data packet with an unknown format octet.
    #[error("unsupported literal data format {0}")]
    UnsupportedLiteralFormat(u8),
    /// Public key material that is not a version 4 EdDSA key.
    #[error("unsupported public key packet")]
    UnsupportedPublicKeyPacket,
    /// The hash handed to a signature finish step is shorter than two bytes.
    #[error("invalid hash length {0}")]
    InvalidHashLength(usize),
    /// A signature that is not sixty-four raw ed25519 bytes.
    #[error("invalid signature length {0}")]
    InvalidSignatureLength(usize),
    /// Bytes left over after a structure was fully parsed.
    #[error("{0} extra bytes after a fully parsed structure")]
    ExtraBytes(usize),
    /// A subpacket section longer than its two-octet length prefix can state.
    #[error("subpacket section exceeds the two-octet length prefix")]
    TooManySubpackets,
    /// A modification detection packet whose digest is not twenty bytes.
    #[error("modification detection digest has length {0}, expected 20")]
    InvalidDigestLength(usize),
    /// A decrypted sealed box that does not hold exactly two packets.
    #[error("sealed box holds {0} packets, expected literal data plus detection code")]
    ContentMismatch(usize),
    /// The legacy SHA-1 detection digest does not match the literal data.
    #[error("content has been altered")]
    ContentHasBeenAltered,
    /// The AEAD primitive failed to seal.
    #[error("encryption failed")]
    EncryptionFailed,
    /// AEAD authentication failed: wrong key or tampered ciphertext.
    #[error("decryption failed")]
    DecryptionFailed,
    /// No recognizable armor begin line.
    #[error("no valid ASCII armor header")]
    NoValidHeader,
    /// Armor text that is structurally broken.
    #[error("invalid ASCII armor")]
    InvalidArmor,
    /// Armor begin and end lines name different block types.
    #[error("armor begin and end block types do not match")]
    BlockLineMismatch,
    /// The second-to-last armor line does not carry a checksum.
    #[error("missing armor checksum line")]
    MissingChecksum,
    /// The armor CRC-24 trailer does not match the decoded body.
    #[error("armor checksum mismatch")]
    InvalidChecksum,
    /// Invalid base64 in an armor body or checksum.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// A user ID payload that is not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}
