//! Encrypted payload packets: literal data, the legacy SHA-1 modification
//! detection code, the AEAD-sealed integrity protected data packet, and the
//! public-key encrypted session key packet that precedes it.
//!
//! The sealed box replaces classic CFB with AES-256-GCM: a random
//! twelve-byte nonce followed by the ciphertext and its sixteen-byte tag.
//! The plaintext inside is always a literal data frame followed by a
//! modification detection frame whose digest covers the literal frame.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use byteorder::{BigEndian, ByteOrder};
use rand::rngs::OsRng;
use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::key::{PublicKeyAlgorithm, PublicKeyPacket};
use crate::packet::{parse_packets, Packet, PacketTag, Packetable};
use crate::{KeyId, PgpError};

/// AES-256 session key size in bytes.
pub const SESSION_KEY_SIZE: usize = 32;

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// The only integrity protected data packet version.
const INTEGRITY_VERSION: u8 = 1;
/// The only session key packet version.
const SESSION_VERSION: u8 = 3;

/// Literal data format octet.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum LiteralFormat {
    Binary = 0x62,
    Utf8 = 0x75,
}

impl LiteralFormat {
    pub fn from_raw(format: u8) -> Result<LiteralFormat, PgpError> {
        match format {
            0x62 => Ok(LiteralFormat::Binary),
            0x75 => Ok(LiteralFormat::Utf8),
            _ => Err(PgpError::UnsupportedLiteralFormat(format)),
        }
    }

    pub fn raw(self) -> u8 {
        self as u8
    }
}

/// A literal data packet: a format octet, a length-prefixed filename, a
/// four-octet date, and the payload.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct LiteralDataPacket {
    pub format: LiteralFormat,
    pub filename: Vec<u8>,
    pub date: u32,
    pub contents: Vec<u8>,
}

impl LiteralDataPacket {
    /// Binary contents with no filename and a zero date.
    pub fn new(contents: Vec<u8>) -> LiteralDataPacket {
        LiteralDataPacket {
            format: LiteralFormat::Binary,
            filename: Vec::new(),
            date: 0,
            contents,
        }
    }

    pub fn utf8(text: &str) -> LiteralDataPacket {
        LiteralDataPacket {
            format: LiteralFormat::Utf8,
            filename: Vec::new(),
            date: 0,
            contents: text.as_bytes().to_vec(),
        }
    }
}

impl Packetable for LiteralDataPacket {
    const TAG: PacketTag = PacketTag::LiteralData;

    fn from_packet(packet: &Packet) -> Result<LiteralDataPacket, PgpError> {
        if packet.header.tag != PacketTag::LiteralData {
            return Err(PgpError::UnexpectedTag(packet.header.tag));
        }
        let body = &packet.body;
        if body.len() < 6 {
            return Err(PgpError::TooShort(body.len()));
        }

        let format = LiteralFormat::from_raw(body[0])?;
        let filename_len = body[1] as usize;
        let date_end = 2 + filename_len + 4;
        if body.len() < date_end {
            return Err(PgpError::TooShort(body.len()));
        }

        Ok(LiteralDataPacket {
            format,
            filename: body[2..2 + filename_len].to_vec(),
            date: BigEndian::read_u32(&body[2 + filename_len..date_end]),
            contents: body[date_end..].to_vec(),
        })
    }

    fn body(&self) -> Result<Vec<u8>, PgpError> {
        if self.filename.len() > u8::MAX as usize {
            return Err(PgpError::BodyLengthTooLong(self.filename.len()));
        }

        let mut body = vec![self.format.raw(), self.filename.len() as u8];
        body.extend_from_slice(&self.filename);
        let mut date = [0; 4];
        BigEndian::write_u32(&mut date, self.date);
        body.extend_from_slice(&date);
        body.extend_from_slice(&self.contents);
        Ok(body)
    }
}

/// The modification detection code packet: a SHA-1 digest over the literal
/// data frame it follows. Legacy, but kept so sealed content matches the
/// classic packet grammar.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ModificationDetectionPacket {
    digest: [u8; 20],
}

impl ModificationDetectionPacket {
    pub fn compute(data: &[u8]) -> ModificationDetectionPacket {
        ModificationDetectionPacket {
            digest: Sha1::digest(data).into(),
        }
    }

    pub fn digest(&self) -> &[u8; 20] {
        &self.digest
    }

    pub fn verify(&self, data: &[u8]) -> bool {
        self.digest == <[u8; 20]>::from(Sha1::digest(data))
    }
}

impl Packetable for ModificationDetectionPacket {
    const TAG: PacketTag = PacketTag::ModificationDetection;

    fn from_packet(packet: &Packet) -> Result<ModificationDetectionPacket, PgpError> {
        if packet.header.tag != PacketTag::ModificationDetection {
            return Err(PgpError::UnexpectedTag(packet.header.tag));
        }
        let digest: [u8; 20] = packet
            .body
            .as_slice()
            .try_into()
            .map_err(|_| PgpError::InvalidDigestLength(packet.body.len()))?;
        Ok(ModificationDetectionPacket { digest })
    }

    fn body(&self) -> Result<Vec<u8>, PgpError> {
        Ok(self.digest.to_vec())
    }
}

/// The sealed payload packet: a version octet followed by the sealed box
/// (nonce, ciphertext, tag).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct IntegrityProtectedDataPacket {
    sealed_box: Vec<u8>,
}

impl IntegrityProtectedDataPacket {
    /// Seal binary contents under a fresh random nonce.
    pub fn encrypt(
        plaintext: &[u8],
        key: &[u8; SESSION_KEY_SIZE],
    ) -> Result<IntegrityProtectedDataPacket, PgpError> {
        IntegrityProtectedDataPacket::seal(LiteralDataPacket::new(plaintext.to_vec()), key)
    }

    /// Seal UTF-8 text, marking the literal data format accordingly.
    pub fn encrypt_text(
        text: &str,
        key: &[u8; SESSION_KEY_SIZE],
    ) -> Result<IntegrityProtectedDataPacket, PgpError> {
        IntegrityProtectedDataPacket::seal(LiteralDataPacket::utf8(text), key)
    }

    fn seal(
        literal: LiteralDataPacket,
        key: &[u8; SESSION_KEY_SIZE],
    ) -> Result<IntegrityProtectedDataPacket, PgpError> {
        let frame = literal.to_packet()?.to_bytes();
        let detection = ModificationDetectionPacket::compute(&frame);

        let mut clear = frame;
        clear.extend(detection.to_packet()?.to_bytes());

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let mut nonce = [0; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), clear.as_slice())
            .map_err(|_| PgpError::EncryptionFailed)?;

        let mut sealed_box = nonce.to_vec();
        sealed_box.extend(ciphertext);
        Ok(IntegrityProtectedDataPacket { sealed_box })
    }

    /// Open the sealed box and return the literal contents.
    ///
    /// Both integrity layers must hold: the AEAD tag over the whole box and
    /// the detection digest over the literal frame inside it.
    pub fn decrypt(&self, key: &[u8; SESSION_KEY_SIZE]) -> Result<Vec<u8>, PgpError> {
        if self.sealed_box.len() < NONCE_SIZE + TAG_SIZE {
            return Err(PgpError::DecryptionFailed);
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let nonce = Nonce::from_slice(&self.sealed_box[..NONCE_SIZE]);
        let clear = cipher
            .decrypt(nonce, &self.sealed_box[NONCE_SIZE..])
            .map_err(|_| PgpError::DecryptionFailed)?;

        let packets = parse_packets(&clear)?;
        if packets.len() != 2 {
            return Err(PgpError::ContentMismatch(packets.len()));
        }

        let literal = LiteralDataPacket::from_packet(&packets[0])?;
        let detection = ModificationDetectionPacket::from_packet(&packets[1])?;
        if !detection.verify(&packets[0].to_bytes()) {
            return Err(PgpError::ContentHasBeenAltered);
        }

        Ok(literal.contents)
    }

    /// Open the sealed box and decode the contents as UTF-8.
    pub fn decrypt_text(&self, key: &[u8; SESSION_KEY_SIZE]) -> Result<String, PgpError> {
        Ok(String::from_utf8(self.decrypt(key)?)?)
    }

    pub fn sealed_box(&self) -> &[u8] {
        &self.sealed_box
    }
}

impl Packetable for IntegrityProtectedDataPacket {
    const TAG: PacketTag = PacketTag::IntegrityProtectedData;

    fn from_packet(packet: &Packet) -> Result<IntegrityProtectedDataPacket, PgpError> {
        if packet.header.tag != PacketTag::IntegrityProtectedData {
            return Err(PgpError::UnexpectedTag(packet.header.tag));
        }
        let body = &packet.body;
        if body.is_empty() {
            return Err(PgpError::TooShort(0));
        }
        if body[0] != INTEGRITY_VERSION {
            return Err(PgpError::UnsupportedVersion(body[0]));
        }
        Ok(IntegrityProtectedDataPacket {
            sealed_box: body[1..].to_vec(),
        })
    }

    fn body(&self) -> Result<Vec<u8>, PgpError> {
        let mut body = vec![INTEGRITY_VERSION];
        body.extend_from_slice(&self.sealed_box);
        Ok(body)
    }
}

/// The session key packet: which recipient key the session key was wrapped
/// for, and the wrapped key bytes. The wrapping itself happens outside this
/// crate.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PublicKeyEncryptedSessionPacket {
    pub key_id: KeyId,
    pub algorithm: PublicKeyAlgorithm,
    pub encrypted_session_key: Vec<u8>,
}

impl PublicKeyEncryptedSessionPacket {
    pub fn new(
        encrypted_session_key: Vec<u8>,
        recipient: &PublicKeyPacket,
    ) -> Result<PublicKeyEncryptedSessionPacket, PgpError> {
        Ok(PublicKeyEncryptedSessionPacket {
            key_id: recipient.key_id()?,
            algorithm: recipient.algorithm,
            encrypted_session_key,
        })
    }
}

impl Packetable for PublicKeyEncryptedSessionPacket {
    const TAG: PacketTag = PacketTag::PublicKeyEncryptedSession;

    fn from_packet(packet: &Packet) -> Result<PublicKeyEncryptedSessionPacket, PgpError> {
        if packet.header.tag != PacketTag::PublicKeyEncryptedSession {
            return Err(PgpError::UnexpectedTag(packet.header.tag));
        }
        let body = &packet.body;
        // Version, key ID, algorithm, and at least two ciphertext bytes.
        if body.len() < 12 {
            return Err(PgpError::TooShort(body.len()));
        }
        if body[0] != SESSION_VERSION {
            return Err(PgpError::UnsupportedVersion(body[0]));
        }

        let mut key_id = [0; 8];
        key_id.copy_from_slice(&body[1..9]);
        let algorithm = PublicKeyAlgorithm::from_raw(body[9])?;

        Ok(PublicKeyEncryptedSessionPacket {
            key_id,
            algorithm,
            encrypted_session_key: body[10..].to_vec(),
        })
    }

    fn body(&self) -> Result<Vec<u8>, PgpError> {
        let mut body = vec![SESSION_VERSION];
        body.extend_from_slice(&self.key_id);
        body.push(self.algorithm.raw());
        body.extend_from_slice(&self.encrypted_session_key);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; SESSION_KEY_SIZE] = [0x42; SESSION_KEY_SIZE];

    #[test]
    fn literal_round_trip() {
        let literal = LiteralDataPacket {
            format: LiteralFormat::Utf8,
            filename: b"note.txt".to_vec(),
            date: 1_600_000_000,
            contents: b"hello".to_vec(),
        };
        let parsed = LiteralDataPacket::from_packet(&literal.to_packet().unwrap()).unwrap();
        assert_eq!(parsed, literal);
    }

    #[test]
    fn literal_empty_contents() {
        let literal = LiteralDataPacket::new(Vec::new());
        let parsed = LiteralDataPacket::from_packet(&literal.to_packet().unwrap()).unwrap();
        assert!(parsed.contents.is_empty());
    }

    #[test]
    fn literal_filename_too_long() {
        let mut literal = LiteralDataPacket::new(b"x".to_vec());
        literal.filename = vec![b'a'; 256];
        assert!(matches!(
            literal.body(),
            Err(PgpError::BodyLengthTooLong(256))
        ));
    }

    #[test]
    fn literal_unknown_format() {
        let packet = Packet::new(PacketTag::LiteralData, vec![b'q', 0, 0, 0, 0, 0]).unwrap();
        assert!(matches!(
            LiteralDataPacket::from_packet(&packet),
            Err(PgpError::UnsupportedLiteralFormat(0x71))
        ));
    }

    #[test]
    fn detection_digest_matches() {
        let detection = ModificationDetectionPacket::compute(b"data");
        assert!(detection.verify(b"data"));
        assert!(!detection.verify(b"Data"));

        let parsed =
            ModificationDetectionPacket::from_packet(&detection.to_packet().unwrap()).unwrap();
        assert_eq!(parsed, detection);
    }

    #[test]
    fn detection_digest_length() {
        let packet = Packet::new(PacketTag::ModificationDetection, vec![0; 19]).unwrap();
        assert!(matches!(
            ModificationDetectionPacket::from_packet(&packet),
            Err(PgpError::InvalidDigestLength(19))
        ));
    }

    #[test]
    fn seal_and_open() {
        let sealed = IntegrityProtectedDataPacket::encrypt(b"wallet payload", &KEY).unwrap();
        assert_eq!(sealed.decrypt(&KEY).unwrap(), b"wallet payload");
    }

    #[test]
    fn seal_and_open_text() {
        let sealed = IntegrityProtectedDataPacket::encrypt_text("hi there", &KEY).unwrap();
        assert_eq!(sealed.decrypt_text(&KEY).unwrap(), "hi there");
    }

    #[test]
    fn sealed_packet_round_trip() {
        let sealed = IntegrityProtectedDataPacket::encrypt(b"payload", &KEY).unwrap();
        let packet = sealed.to_packet().unwrap();
        let parsed = IntegrityProtectedDataPacket::from_packet(&packet).unwrap();
        assert_eq!(parsed, sealed);
        assert_eq!(parsed.decrypt(&KEY).unwrap(), b"payload");
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = IntegrityProtectedDataPacket::encrypt(b"secret", &KEY).unwrap();
        assert!(matches!(
            sealed.decrypt(&[0; SESSION_KEY_SIZE]),
            Err(PgpError::DecryptionFailed)
        ));
    }

    #[test]
    fn tampered_box_fails() {
        let sealed = IntegrityProtectedDataPacket::encrypt(b"secret", &KEY).unwrap();
        let mut body = sealed.body().unwrap();
        let last = body.len() - 1;
        body[last] ^= 0x01;

        let packet = Packet::new(PacketTag::IntegrityProtectedData, body).unwrap();
        let tampered = IntegrityProtectedDataPacket::from_packet(&packet).unwrap();
        assert!(matches!(
            tampered.decrypt(&KEY),
            Err(PgpError::DecryptionFailed)
        ));
    }

    fn seal_raw(clear: &[u8]) -> IntegrityProtectedDataPacket {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&KEY));
        let nonce = [9; NONCE_SIZE];
        let ciphertext = cipher.encrypt(Nonce::from_slice(&nonce), clear).unwrap();

        let mut body = vec![INTEGRITY_VERSION];
        body.extend_from_slice(&nonce);
        body.extend(ciphertext);
        let packet = Packet::new(PacketTag::IntegrityProtectedData, body).unwrap();
        IntegrityProtectedDataPacket::from_packet(&packet).unwrap()
    }

    #[test]
    fn substituted_literal_fails_detection() {
        // Well-formed literal plus a digest over different bytes: the AEAD
        // layer opens fine, the detection layer must still catch it.
        let literal = LiteralDataPacket::new(b"real contents".to_vec());
        let wrong = ModificationDetectionPacket::compute(b"other contents");

        let mut clear = literal.to_packet().unwrap().to_bytes();
        clear.extend(wrong.to_packet().unwrap().to_bytes());

        assert!(matches!(
            seal_raw(&clear).decrypt(&KEY),
            Err(PgpError::ContentHasBeenAltered)
        ));
    }

    #[test]
    fn missing_detection_packet_fails() {
        let clear = LiteralDataPacket::new(b"lonely".to_vec())
            .to_packet()
            .unwrap()
            .to_bytes();
        assert!(matches!(
            seal_raw(&clear).decrypt(&KEY),
            Err(PgpError::ContentMismatch(1))
        ));
    }

    #[test]
    fn truncated_box_fails() {
        let packet = Packet::new(PacketTag::IntegrityProtectedData, vec![1; 10]).unwrap();
        let sealed = IntegrityProtectedDataPacket::from_packet(&packet).unwrap();
        assert!(matches!(
            sealed.decrypt(&KEY),
            Err(PgpError::DecryptionFailed)
        ));
    }

    #[test]
    fn session_key_round_trip() {
        let recipient = PublicKeyPacket::ed25519([0x31; 32], 1_650_000_000);
        let session =
            PublicKeyEncryptedSessionPacket::new(vec![0xee; 48], &recipient).unwrap();

        let parsed =
            PublicKeyEncryptedSessionPacket::from_packet(&session.to_packet().unwrap()).unwrap();
        assert_eq!(parsed, session);
        assert_eq!(parsed.key_id, recipient.key_id().unwrap());
    }

    #[test]
    fn session_key_unknown_algorithm() {
        let mut body = vec![SESSION_VERSION];
        body.extend_from_slice(&[0; 8]);
        body.push(1); // RSA
        body.extend_from_slice(&[0xee; 4]);
        let packet = Packet::new(PacketTag::PublicKeyEncryptedSession, body).unwrap();
        assert!(matches!(
            PublicKeyEncryptedSessionPacket::from_packet(&packet),
            Err(PgpError::UnsupportedAlgorithm(1))
        ));
    }

    #[test]
    fn session_key_short_body() {
        let packet = Packet::new(PacketTag::PublicKeyEncryptedSession, vec![3; 10]).unwrap();
        assert!(matches!(
            PublicKeyEncryptedSessionPacket::from_packet(&packet),
            Err(PgpError::TooShort(10))
        ));

        // One ciphertext byte after the algorithm octet is still too short.
        let mut body = vec![SESSION_VERSION];
        body.extend_from_slice(&[0; 8]);
        body.push(22);
        body.push(0xee);
        let packet = Packet::new(PacketTag::PublicKeyEncryptedSession, body).unwrap();
        assert!(matches!(
            PublicKeyEncryptedSessionPacket::from_packet(&packet),
            Err(PgpError::TooShort(11))
        ));
    }

    #[test]
    fn session_key_wrong_version() {
        let mut body = vec![4];
        body.extend_from_slice(&[0; 11]);
        let packet = Packet::new(PacketTag::PublicKeyEncryptedSession, body).unwrap();
        assert!(matches!(
            PublicKeyEncryptedSessionPacket::from_packet(&packet),
            Err(PgpError::UnsupportedVersion(4))
        ));
    }
}
