//! Version 4 signature packets.
//!
//! The classic public-key-algorithm octet is repurposed here as a chain
//! identifier: the signature binds to a blockchain identity instead of an
//! OpenPGP key algorithm, and the actual signing happens outside this
//! crate. This module only assembles the exact byte string to hash and
//! carries the resulting signature bytes.

use byteorder::{BigEndian, ByteOrder};

use crate::packet::{Packet, PacketLength, PacketTag, Packetable};
use crate::{Fingerprint, KeyId, PgpError};

#[cfg(feature = "dalek")]
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
#[cfg(feature = "dalek")]
use sha2::{Digest, Sha256};

/// The only signature packet version this crate reads or writes.
pub const SIGNATURE_VERSION: u8 = 4;

/// Signature kind octet (RFC 4880 section 5.2.1).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SigKind {
    BinaryDocument = 0x00,
    TextDocument = 0x01,
    Standalone = 0x02,
    GenericCertification = 0x10,
    PersonaCertification = 0x11,
    CasualCertification = 0x12,
    PositiveCertification = 0x13,
    SubkeyBinding = 0x18,
}

impl SigKind {
    pub fn from_raw(kind: u8) -> Result<SigKind, PgpError> {
        match kind {
            0x00 => Ok(SigKind::BinaryDocument),
            0x01 => Ok(SigKind::TextDocument),
            0x02 => Ok(SigKind::Standalone),
            0x10 => Ok(SigKind::GenericCertification),
            0x11 => Ok(SigKind::PersonaCertification),
            0x12 => Ok(SigKind::CasualCertification),
            0x13 => Ok(SigKind::PositiveCertification),
            0x18 => Ok(SigKind::SubkeyBinding),
            _ => Err(PgpError::UnsupportedSignatureKind(kind)),
        }
    }

    pub fn raw(self) -> u8 {
        self as u8
    }
}

/// Hash algorithm octet (RFC 4880 section 9.4).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum HashAlgorithm {
    Sha1 = 2,
    Sha256 = 8,
    Sha384 = 9,
    Sha512 = 10,
}

impl HashAlgorithm {
    pub fn from_raw(algorithm: u8) -> Result<HashAlgorithm, PgpError> {
        match algorithm {
            2 => Ok(HashAlgorithm::Sha1),
            8 => Ok(HashAlgorithm::Sha256),
            9 => Ok(HashAlgorithm::Sha384),
            10 => Ok(HashAlgorithm::Sha512),
            _ => Err(PgpError::UnsupportedHashAlgorithm(algorithm)),
        }
    }

    pub fn raw(self) -> u8 {
        self as u8
    }
}

/// A signature subpacket, carried opaquely.
///
/// The tag is kept raw so unknown subpacket kinds survive a decode and
/// re-encode unchanged. The length prefix reuses the new-format packet
/// length codec and counts the tag octet plus the contents.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Subpacket {
    pub tag: u8,
    pub contents: Vec<u8>,
}

impl Subpacket {
    pub const CREATION_TIME: u8 = 2;
    pub const ISSUER: u8 = 16;
    pub const ISSUER_FINGERPRINT: u8 = 33;

    pub fn new(tag: u8, contents: Vec<u8>) -> Subpacket {
        Subpacket { tag, contents }
    }

    /// Signature creation time as seconds since the Unix epoch.
    pub fn creation_time(timestamp: u32) -> Subpacket {
        let mut contents = vec![0; 4];
        BigEndian::write_u32(&mut contents, timestamp);
        Subpacket::new(Subpacket::CREATION_TIME, contents)
    }

    pub fn issuer(key_id: KeyId) -> Subpacket {
        Subpacket::new(Subpacket::ISSUER, key_id.to_vec())
    }

    /// Issuer fingerprint: a key version octet followed by the fingerprint.
    pub fn issuer_fingerprint(fingerprint: Fingerprint) -> Subpacket {
        let mut contents = vec![4];
        contents.extend_from_slice(&fingerprint);
        Subpacket::new(Subpacket::ISSUER_FINGERPRINT, contents)
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), PgpError> {
        let length = PacketLength::new(self.contents.len() + 1)?;
        out.extend_from_slice(length.field_bytes());
        out.push(self.tag);
        out.extend_from_slice(&self.contents);
        Ok(())
    }

    /// Parse the subpackets packed inside a section body.
    fn parse_section(mut rest: &[u8]) -> Result<Vec<Subpacket>, PgpError> {
        let mut subpackets = Vec::new();

        while !rest.is_empty() {
            let length = PacketLength::from_new_format(rest)?;
            let start = length.byte_len();
            let end = start + length.body;
            if length.body == 0 || end > rest.len() {
                return Err(PgpError::TooShort(rest.len()));
            }
            subpackets.push(Subpacket {
                tag: rest[start],
                contents: rest[start + 1..end].to_vec(),
            });
            rest = &rest[end..];
        }

        Ok(subpackets)
    }
}

/// Serialize a subpacket section: a two-octet big-endian byte count
/// followed by the packed subpackets.
fn write_section(subpackets: &[Subpacket], out: &mut Vec<u8>) -> Result<(), PgpError> {
    let mut packed = Vec::new();
    for subpacket in subpackets {
        subpacket.write(&mut packed)?;
    }
    if packed.len() > u16::MAX as usize {
        return Err(PgpError::TooManySubpackets);
    }

    let mut count = [0; 2];
    BigEndian::write_u16(&mut count, packed.len() as u16);
    out.extend_from_slice(&count);
    out.extend_from_slice(&packed);
    Ok(())
}

/// The portion of the packet covered by the signature hash: version, kind,
/// chain ID, hash algorithm, and the hashed subpacket section.
fn signed_data_parts(
    kind: SigKind,
    chain_id: u8,
    hash_algorithm: HashAlgorithm,
    hashed_subpackets: &[Subpacket],
) -> Result<Vec<u8>, PgpError> {
    let mut data = vec![SIGNATURE_VERSION, kind.raw(), chain_id, hash_algorithm.raw()];
    write_section(hashed_subpackets, &mut data)?;
    Ok(data)
}

/// The v4 trailer appended to the signed data before hashing: the version
/// octet, a 0xff sentinel, and the signed data's length as a big-endian
/// thirty-two bit count.
fn trailer(signed_data_len: usize) -> Vec<u8> {
    let mut trailer = vec![SIGNATURE_VERSION, 0xff, 0, 0, 0, 0];
    BigEndian::write_u32(&mut trailer[2..], signed_data_len as u32);
    trailer
}

/// An unsigned signature in preparation.
///
/// The builder assembles everything the hash covers, hands out the exact
/// byte string to hash via [`data_to_hash`](SignatureBuilder::data_to_hash),
/// and only [`finish`](SignatureBuilder::finish) - fed the externally
/// computed hash and signature - produces a [`SignaturePacket`]. Neither
/// side of that divide is mutable after the fact.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SignatureBuilder {
    pub kind: SigKind,
    pub chain_id: u8,
    pub hash_algorithm: HashAlgorithm,
    pub hashed_subpackets: Vec<Subpacket>,
    pub unhashed_subpackets: Vec<Subpacket>,
}

impl SignatureBuilder {
    pub fn new(kind: SigKind, chain_id: u8, hash_algorithm: HashAlgorithm) -> SignatureBuilder {
        SignatureBuilder {
            kind,
            chain_id,
            hash_algorithm,
            hashed_subpackets: Vec::new(),
            unhashed_subpackets: Vec::new(),
        }
    }

    pub fn hashed_subpacket(mut self, subpacket: Subpacket) -> SignatureBuilder {
        self.hashed_subpackets.push(subpacket);
        self
    }

    pub fn unhashed_subpacket(mut self, subpacket: Subpacket) -> SignatureBuilder {
        self.unhashed_subpackets.push(subpacket);
        self
    }

    pub fn signed_data(&self) -> Result<Vec<u8>, PgpError> {
        signed_data_parts(
            self.kind,
            self.chain_id,
            self.hash_algorithm,
            &self.hashed_subpackets,
        )
    }

    /// The full byte string the caller must hash: the signed data followed
    /// by the v4 trailer.
    pub fn data_to_hash(&self) -> Result<Vec<u8>, PgpError> {
        let mut data = self.signed_data()?;
        let trailer = trailer(data.len());
        data.extend_from_slice(&trailer);
        Ok(data)
    }

    /// Attach an externally computed hash and signature, yielding the
    /// finished packet. The hash supplies the two-octet quick-check
    /// prefix; the signature bytes are carried as-is.
    pub fn finish(self, hash: &[u8], signature: Vec<u8>) -> Result<SignaturePacket, PgpError> {
        if hash.len() < 2 {
            return Err(PgpError::InvalidHashLength(hash.len()));
        }
        if signature.is_empty() {
            return Err(PgpError::InvalidSignatureLength(0));
        }

        Ok(SignaturePacket {
            kind: self.kind,
            chain_id: self.chain_id,
            hash_algorithm: self.hash_algorithm,
            hashed_subpackets: self.hashed_subpackets,
            unhashed_subpackets: self.unhashed_subpackets,
            left_two_hash_bytes: [hash[0], hash[1]],
            signature,
        })
    }

    /// Hash `document` plus the signature trailer with SHA-256 and sign the
    /// digest with an ed25519 key.
    #[cfg(feature = "dalek")]
    pub fn sign(self, document: &[u8], key: &SigningKey) -> Result<SignaturePacket, PgpError> {
        if self.hash_algorithm != HashAlgorithm::Sha256 {
            return Err(PgpError::UnsupportedHashAlgorithm(self.hash_algorithm.raw()));
        }

        let mut data = document.to_vec();
        data.extend(self.data_to_hash()?);
        let hash: [u8; 32] = Sha256::digest(&data).into();

        let signature = key.sign(&hash).to_bytes().to_vec();
        self.finish(&hash, signature)
    }
}

/// A finished, immutable signature packet.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SignaturePacket {
    pub kind: SigKind,
    pub chain_id: u8,
    pub hash_algorithm: HashAlgorithm,
    pub hashed_subpackets: Vec<Subpacket>,
    pub unhashed_subpackets: Vec<Subpacket>,
    pub left_two_hash_bytes: [u8; 2],
    pub signature: Vec<u8>,
}

impl SignaturePacket {
    pub fn signed_data(&self) -> Result<Vec<u8>, PgpError> {
        signed_data_parts(
            self.kind,
            self.chain_id,
            self.hash_algorithm,
            &self.hashed_subpackets,
        )
    }

    /// The byte string whose hash this signature covers, reassembled from
    /// the decoded fields.
    pub fn data_to_hash(&self) -> Result<Vec<u8>, PgpError> {
        let mut data = self.signed_data()?;
        let trailer = trailer(data.len());
        data.extend_from_slice(&trailer);
        Ok(data)
    }

    /// Recompute the SHA-256 digest over `document` plus the trailer and
    /// check the carried ed25519 signature against it.
    #[cfg(feature = "dalek")]
    pub fn verify(&self, document: &[u8], key: &VerifyingKey) -> Result<bool, PgpError> {
        let mut data = document.to_vec();
        data.extend(self.data_to_hash()?);
        let hash: [u8; 32] = Sha256::digest(&data).into();

        if self.left_two_hash_bytes != [hash[0], hash[1]] {
            return Ok(false);
        }

        let bytes: &[u8; 64] = self
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| PgpError::InvalidSignatureLength(self.signature.len()))?;
        let signature = Signature::from_bytes(bytes);
        Ok(key.verify(&hash, &signature).is_ok())
    }
}

impl Packetable for SignaturePacket {
    const TAG: PacketTag = PacketTag::Signature;

    fn from_packet(packet: &Packet) -> Result<SignaturePacket, PgpError> {
        if packet.header.tag != PacketTag::Signature {
            return Err(PgpError::UnexpectedTag(packet.header.tag));
        }
        let body = &packet.body;
        if body.len() < 6 {
            return Err(PgpError::TooShort(body.len()));
        }
        if body[0] != SIGNATURE_VERSION {
            return Err(PgpError::UnsupportedVersion(body[0]));
        }

        let kind = SigKind::from_raw(body[1])?;
        let chain_id = body[2];
        let hash_algorithm = HashAlgorithm::from_raw(body[3])?;

        let mut cursor = 4;
        let hashed_len = BigEndian::read_u16(&body[cursor..cursor + 2]) as usize;
        cursor += 2;
        if cursor + hashed_len > body.len() {
            return Err(PgpError::TooShort(body.len()));
        }
        let hashed_subpackets = Subpacket::parse_section(&body[cursor..cursor + hashed_len])?;
        cursor += hashed_len;

        if cursor + 2 > body.len() {
            return Err(PgpError::TooShort(body.len()));
        }
        let unhashed_len = BigEndian::read_u16(&body[cursor..cursor + 2]) as usize;
        cursor += 2;
        if cursor + unhashed_len > body.len() {
            return Err(PgpError::TooShort(body.len()));
        }
        let unhashed_subpackets = Subpacket::parse_section(&body[cursor..cursor + unhashed_len])?;
        cursor += unhashed_len;

        if cursor + 2 > body.len() {
            return Err(PgpError::TooShort(body.len()));
        }
        let left_two_hash_bytes = [body[cursor], body[cursor + 1]];
        cursor += 2;

        // The signature runs to the end of the body.
        let signature = body[cursor..].to_vec();
        if signature.is_empty() {
            return Err(PgpError::InvalidSignatureLength(0));
        }

        Ok(SignaturePacket {
            kind,
            chain_id,
            hash_algorithm,
            hashed_subpackets,
            unhashed_subpackets,
            left_two_hash_bytes,
            signature,
        })
    }

    fn body(&self) -> Result<Vec<u8>, PgpError> {
        let mut body = self.signed_data()?;
        write_section(&self.unhashed_subpackets, &mut body)?;
        body.extend_from_slice(&self.left_two_hash_bytes);
        body.extend_from_slice(&self.signature);
        Ok(body)
    }
}
