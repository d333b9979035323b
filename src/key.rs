//! Public key and user ID packets.
//!
//! Keys are version 4 EdDSA keys on curve ed25519 only. The fingerprint is
//! the RFC 4880 SHA-1 construction over the serialized key body, and the
//! key ID is its trailing eight octets.

use byteorder::{BigEndian, ByteOrder};
use sha1::{Digest, Sha1};

use crate::packet::{Packet, PacketTag, Packetable};
use crate::{Fingerprint, KeyId, PgpError};

/// The encoded curve OID for ed25519, including its leading length octet.
const CURVE: &[u8] = &[0x09, 0x2b, 0x06, 0x01, 0x04, 0x01, 0xda, 0x47, 0x0f, 0x01];

/// The only key packet version this crate reads or writes.
pub const PUBLIC_KEY_VERSION: u8 = 4;

/// Public-key algorithm octet. Only EdDSA is supported.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PublicKeyAlgorithm {
    Ed25519 = 22,
}

impl PublicKeyAlgorithm {
    pub fn from_raw(algorithm: u8) -> Result<PublicKeyAlgorithm, PgpError> {
        match algorithm {
            22 => Ok(PublicKeyAlgorithm::Ed25519),
            _ => Err(PgpError::UnsupportedAlgorithm(algorithm)),
        }
    }

    pub fn raw(self) -> u8 {
        self as u8
    }
}

/// A multiprecision integer: a two-octet big-endian bit count followed by
/// that many bits of big-endian integer, leading zero octets stripped.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct MPInt {
    pub data: Vec<u8>,
}

impl MPInt {
    /// Build from a big-endian integer, stripping leading zero octets.
    pub fn from_integer(integer: &[u8]) -> MPInt {
        let start = integer.iter().position(|&b| b != 0).unwrap_or(integer.len());
        MPInt {
            data: integer[start..].to_vec(),
        }
    }

    /// Parse from the start of `bytes`, returning the integer and the
    /// number of bytes consumed.
    pub fn parse(bytes: &[u8]) -> Result<(MPInt, usize), PgpError> {
        if bytes.len() < 2 {
            return Err(PgpError::TooShort(bytes.len()));
        }
        let bits = BigEndian::read_u16(&bytes[..2]) as usize;
        let len = (bits + 7) / 8;
        if bytes.len() < 2 + len {
            return Err(PgpError::TooShort(bytes.len()));
        }
        Ok((
            MPInt {
                data: bytes[2..2 + len].to_vec(),
            },
            2 + len,
        ))
    }

    /// The number of significant bits.
    pub fn bits(&self) -> u16 {
        match self.data.first() {
            None => 0,
            Some(&first) => (self.data.len() * 8) as u16 - first.leading_zeros() as u16,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0; 2];
        BigEndian::write_u16(&mut bytes, self.bits());
        bytes.extend_from_slice(&self.data);
        bytes
    }
}

/// A version 4 EdDSA public key packet.
///
/// The same payload codec serves both the public key and public sub-key
/// tags; serialization always emits the primary key tag.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct PublicKeyPacket {
    pub created: u32,
    pub algorithm: PublicKeyAlgorithm,
    key: [u8; 32],
}

impl PublicKeyPacket {
    pub fn ed25519(key: [u8; 32], created: u32) -> PublicKeyPacket {
        PublicKeyPacket {
            created,
            algorithm: PublicKeyAlgorithm::Ed25519,
            key,
        }
    }

    /// The raw thirty-two byte curve point.
    pub fn key_data(&self) -> &[u8; 32] {
        &self.key
    }

    /// SHA-1 over `0x99`, the body length as two big-endian octets, and the
    /// serialized body (RFC 4880 section 12.2).
    pub fn fingerprint(&self) -> Result<Fingerprint, PgpError> {
        let body = self.body()?;
        let mut hasher = Sha1::new();
        hasher.update([0x99]);
        let mut len = [0; 2];
        BigEndian::write_u16(&mut len, body.len() as u16);
        hasher.update(len);
        hasher.update(&body);
        Ok(hasher.finalize().into())
    }

    /// The trailing eight octets of the fingerprint.
    pub fn key_id(&self) -> Result<KeyId, PgpError> {
        let fingerprint = self.fingerprint()?;
        let mut key_id = [0; 8];
        key_id.copy_from_slice(&fingerprint[12..20]);
        Ok(key_id)
    }
}

impl Packetable for PublicKeyPacket {
    const TAG: PacketTag = PacketTag::PublicKey;

    fn from_packet(packet: &Packet) -> Result<PublicKeyPacket, PgpError> {
        if packet.header.tag != PacketTag::PublicKey
            && packet.header.tag != PacketTag::PublicSubkey
        {
            return Err(PgpError::UnexpectedTag(packet.header.tag));
        }
        let body = &packet.body;
        if body.len() < 6 + CURVE.len() + 2 {
            return Err(PgpError::TooShort(body.len()));
        }
        if body[0] != PUBLIC_KEY_VERSION {
            return Err(PgpError::UnsupportedVersion(body[0]));
        }

        let created = BigEndian::read_u32(&body[1..5]);
        let algorithm = PublicKeyAlgorithm::from_raw(body[5])?;

        let curve_end = 6 + CURVE.len();
        if &body[6..curve_end] != CURVE {
            return Err(PgpError::UnsupportedPublicKeyPacket);
        }

        let (point, consumed) = MPInt::parse(&body[curve_end..])?;
        let trailing = body.len() - curve_end - consumed;
        if trailing != 0 {
            return Err(PgpError::ExtraBytes(trailing));
        }

        // The curve point is the 0x40 native-point prefix plus 32 bytes.
        if point.data.len() != 33 || point.data[0] != 0x40 {
            return Err(PgpError::UnsupportedPublicKeyPacket);
        }
        let mut key = [0; 32];
        key.copy_from_slice(&point.data[1..]);

        Ok(PublicKeyPacket {
            created,
            algorithm,
            key,
        })
    }

    fn body(&self) -> Result<Vec<u8>, PgpError> {
        let mut body = vec![PUBLIC_KEY_VERSION, 0, 0, 0, 0];
        BigEndian::write_u32(&mut body[1..5], self.created);
        body.push(self.algorithm.raw());
        body.extend_from_slice(CURVE);

        let mut point = vec![0x40];
        point.extend_from_slice(&self.key);
        body.extend(MPInt::from_integer(&point).to_bytes());
        Ok(body)
    }
}

/// A user ID packet: freeform UTF-8, conventionally a name and address.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct UserIdPacket {
    pub content: String,
}

impl UserIdPacket {
    pub fn new(content: &str) -> UserIdPacket {
        UserIdPacket {
            content: content.to_string(),
        }
    }
}

impl Packetable for UserIdPacket {
    const TAG: PacketTag = PacketTag::UserId;

    fn from_packet(packet: &Packet) -> Result<UserIdPacket, PgpError> {
        if packet.header.tag != PacketTag::UserId {
            return Err(PgpError::UnexpectedTag(packet.header.tag));
        }
        Ok(UserIdPacket {
            content: String::from_utf8(packet.body.clone())?,
        })
    }

    fn body(&self) -> Result<Vec<u8>, PgpError> {
        Ok(self.content.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mpint_strips_leading_zeros() {
        let mpint = MPInt::from_integer(&[0, 0, 0x01, 0xff]);
        assert_eq!(mpint.data, vec![0x01, 0xff]);
        assert_eq!(mpint.bits(), 9);
        assert_eq!(mpint.to_bytes(), vec![0, 9, 0x01, 0xff]);
    }

    #[test]
    fn mpint_zero() {
        let mpint = MPInt::from_integer(&[0, 0]);
        assert!(mpint.data.is_empty());
        assert_eq!(mpint.to_bytes(), vec![0, 0]);
    }

    #[test]
    fn mpint_parse_round_trip() {
        let mpint = MPInt::from_integer(&[0x80, 0x00, 0x01]);
        assert_eq!(mpint.bits(), 24);

        let bytes = mpint.to_bytes();
        let (parsed, consumed) = MPInt::parse(&bytes).unwrap();
        assert_eq!(parsed, mpint);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn mpint_truncated() {
        assert!(matches!(MPInt::parse(&[0]), Err(PgpError::TooShort(1))));
        assert!(matches!(
            MPInt::parse(&[0, 16, 0xff]),
            Err(PgpError::TooShort(3))
        ));
    }

    #[test]
    fn key_round_trip() {
        let key = PublicKeyPacket::ed25519([0x9a; 32], 1_500_000_000);
        let packet = key.to_packet().unwrap();
        assert_eq!(packet.header.tag, PacketTag::PublicKey);

        let parsed = PublicKeyPacket::from_packet(&packet).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.key_data(), &[0x9a; 32]);
    }

    #[test]
    fn subkey_tag_is_accepted() {
        let key = PublicKeyPacket::ed25519([0x9a; 32], 0);
        let packet = Packet::new(PacketTag::PublicSubkey, key.body().unwrap()).unwrap();
        assert_eq!(PublicKeyPacket::from_packet(&packet).unwrap(), key);
    }

    #[test]
    fn key_id_is_the_fingerprint_tail() {
        let key = PublicKeyPacket::ed25519([0x11; 32], 42);
        let fingerprint = key.fingerprint().unwrap();
        assert_eq!(key.key_id().unwrap(), fingerprint[12..20]);
    }

    #[test]
    fn wrong_curve_is_rejected() {
        let key = PublicKeyPacket::ed25519([0x9a; 32], 0);
        let mut body = key.body().unwrap();
        body[7] ^= 0xff;
        let packet = Packet::new(PacketTag::PublicKey, body).unwrap();
        assert!(matches!(
            PublicKeyPacket::from_packet(&packet),
            Err(PgpError::UnsupportedPublicKeyPacket)
        ));
    }

    #[test]
    fn trailing_key_bytes_are_rejected() {
        let key = PublicKeyPacket::ed25519([0x9a; 32], 0);
        let mut body = key.body().unwrap();
        body.push(0);
        let packet = Packet::new(PacketTag::PublicKey, body).unwrap();
        assert!(matches!(
            PublicKeyPacket::from_packet(&packet),
            Err(PgpError::ExtraBytes(1))
        ));
    }

    #[test]
    fn user_id_round_trip() {
        let user_id = UserIdPacket::new("Alice <alice@example.org>");
        let parsed = UserIdPacket::from_packet(&user_id.to_packet().unwrap()).unwrap();
        assert_eq!(parsed, user_id);
    }

    #[test]
    fn user_id_must_be_utf8() {
        let packet = Packet::new(PacketTag::UserId, vec![0xff, 0xfe]).unwrap();
        assert!(matches!(
            UserIdPacket::from_packet(&packet),
            Err(PgpError::InvalidUtf8(_))
        ));
    }
}
