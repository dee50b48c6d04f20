use crate::bus::MAX_FD_PAYLOAD;
use crate::codec::{Payload, DEFAULT_PAYLOAD_LEN, MAX_PAYLOAD_LEN};
use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes256Gcm, Key as CipherKey, KeyInit, Nonce, Tag};
use heapless::Vec;
use rand::{CryptoRng, RngCore};
use static_assertions::{const_assert, const_assert_eq};
use thiserror::Error;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
/// Bytes added to every payload on the wire: tag plus nonce.
pub const WIRE_OVERHEAD: usize = TAG_LEN + NONCE_LEN;

const_assert!(MAX_PAYLOAD_LEN + WIRE_OVERHEAD <= MAX_FD_PAYLOAD);
const_assert_eq!(DEFAULT_PAYLOAD_LEN + WIRE_OVERHEAD, 48);

pub type Key = [u8; KEY_LEN];

/// Pre-shared key compiled into every legitimate node. Override with `--key`.
pub const DEFAULT_KEY: Key = [
    0x22, 0x4E, 0x61, 0x6D, 0xE1, 0x72, 0x69, 0xEB, 0x21, 0x20, 0x4E, 0x61, 0x69, 0x20, 0x68, 0x69,
    0x72, 0x75, 0x76, 0x61, 0x6C, 0x79, 0xEB, 0x20, 0x56, 0x61, 0x6C, 0x69, 0x6D, 0x61, 0x72, 0x22,
];

pub type WireBytes = Vec<u8, MAX_FD_PAYLOAD>;

pub const fn wire_len(payload_len: usize) -> usize {
    payload_len + WIRE_OVERHEAD
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SealError {
    #[error("plaintext of {0} bytes exceeds the 36 byte limit")]
    PayloadTooLarge(usize),
    #[error("cipher rejected the plaintext")]
    Cipher,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("authentication tag invalid")]
    TagInvalid,
    #[error("frame of {actual} bytes, sealed length is {required}")]
    Length { required: usize, actual: usize },
    #[error("expected plaintext of {0} bytes exceeds the 36 byte limit")]
    PayloadTooLarge(usize),
}

/// A sealed frame ready for the bus: `ciphertext || tag || nonce`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    id: u32,
    bytes: WireBytes,
    plaintext_len: usize,
}

impl WireFrame {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.bytes[..self.plaintext_len]
    }

    pub fn tag(&self) -> &[u8] {
        &self.bytes[self.plaintext_len..self.plaintext_len + TAG_LEN]
    }

    pub fn nonce(&self) -> &[u8] {
        &self.bytes[self.plaintext_len + TAG_LEN..]
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Plaintext that passed tag verification. Only [`SecureChannel::open`]
/// can construct one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedPayload {
    bytes: Payload,
}

impl AuthenticatedPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// AES-256-GCM framing with a fresh random nonce per sealed frame.
///
/// `R` is only needed for sealing; a receive-only channel can carry any RNG.
pub struct SecureChannel<R> {
    cipher: Aes256Gcm,
    rng: R,
    sealed: u64,
}

impl<R> SecureChannel<R> {
    pub fn new(key: &Key, rng: R) -> Self {
        Self {
            cipher: Aes256Gcm::new(CipherKey::<Aes256Gcm>::from_slice(key)),
            rng,
            sealed: 0,
        }
    }

    /// Frames sealed since construction.
    pub fn sealed_count(&self) -> u64 {
        self.sealed
    }

    /// Split `bytes` as `ciphertext(expected_len) || tag || nonce` and verify.
    /// The frame must be exactly `expected_len + 28` bytes. On failure nothing
    /// of the plaintext escapes.
    pub fn open(&self, bytes: &[u8], expected_len: usize) -> Result<AuthenticatedPayload, AuthError> {
        if expected_len > MAX_PAYLOAD_LEN {
            return Err(AuthError::PayloadTooLarge(expected_len));
        }
        let required = wire_len(expected_len);
        if bytes.len() != required {
            return Err(AuthError::Length {
                required,
                actual: bytes.len(),
            });
        }

        let nonce = Nonce::from_slice(&bytes[expected_len + TAG_LEN..]);
        let tag = Tag::from_slice(&bytes[expected_len..expected_len + TAG_LEN]);

        let mut plaintext = Payload::new();
        plaintext
            .extend_from_slice(&bytes[..expected_len])
            .map_err(|_| AuthError::PayloadTooLarge(expected_len))?;

        if self
            .cipher
            .decrypt_in_place_detached(nonce, b"", &mut plaintext, tag)
            .is_err()
        {
            plaintext.clear();
            return Err(AuthError::TagInvalid);
        }

        Ok(AuthenticatedPayload { bytes: plaintext })
    }
}

impl<R: RngCore + CryptoRng> SecureChannel<R> {
    pub fn seal(&mut self, id: u32, plaintext: &[u8]) -> Result<WireFrame, SealError> {
        if plaintext.len() > MAX_PAYLOAD_LEN {
            return Err(SealError::PayloadTooLarge(plaintext.len()));
        }

        let nonce = self.fresh_nonce();

        let mut bytes = WireBytes::new();
        bytes
            .extend_from_slice(plaintext)
            .map_err(|_| SealError::PayloadTooLarge(plaintext.len()))?;

        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut bytes)
            .map_err(|_| SealError::Cipher)?;

        // Capacity is guaranteed by the const assertion on MAX_PAYLOAD_LEN
        bytes.extend_from_slice(&tag).map_err(|_| SealError::Cipher)?;
        bytes.extend_from_slice(&nonce).map_err(|_| SealError::Cipher)?;

        self.sealed = self.sealed.wrapping_add(1);

        Ok(WireFrame {
            id,
            bytes,
            plaintext_len: plaintext.len(),
        })
    }

    fn fresh_nonce(&mut self) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        for word in nonce.chunks_exact_mut(4) {
            word.copy_from_slice(&self.rng.next_u32().to_be_bytes());
        }
        nonce
    }
}

impl<R> core::fmt::Debug for SecureChannel<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("sealed", &self.sealed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn channel() -> SecureChannel<StdRng> {
        SecureChannel::new(&DEFAULT_KEY, StdRng::seed_from_u64(42))
    }

    #[test]
    fn test_wire_layout() {
        let mut channel = channel();
        let frame = channel.seal(0x6F, &[0xFF; 20]).unwrap();

        assert_eq!(frame.len(), 48);
        assert_eq!(frame.ciphertext().len(), 20);
        assert_eq!(frame.tag().len(), TAG_LEN);
        assert_eq!(frame.nonce().len(), NONCE_LEN);
        assert_ne!(frame.ciphertext(), &[0xFF; 20][..]);
        assert_eq!(channel.sealed_count(), 1);
    }

    #[test]
    fn test_nonce_words_are_big_endian() {
        let mut reference = StdRng::seed_from_u64(9);
        let first = reference.next_u32();

        let mut channel = SecureChannel::new(&DEFAULT_KEY, StdRng::seed_from_u64(9));
        let frame = channel.seal(0x14D, &[0u8; 8]).unwrap();
        assert_eq!(&frame.nonce()[..4], &first.to_be_bytes());
    }

    #[test]
    fn test_open_recovers_plaintext() {
        let mut channel = channel();
        let plaintext = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20];
        let frame = channel.seal(0x309, &plaintext).unwrap();

        let opened = channel.open(frame.as_bytes(), 20).unwrap();
        assert_eq!(opened.as_bytes(), &plaintext);
    }

    #[test]
    fn test_oversized_plaintext_rejected() {
        let mut channel = channel();
        assert_eq!(channel.seal(0x6F, &[0u8; 37]), Err(SealError::PayloadTooLarge(37)));
        assert_eq!(channel.open(&[0u8; 64], 37), Err(AuthError::PayloadTooLarge(37)));
    }

    #[test]
    fn test_frame_length_must_match() {
        let channel = channel();
        assert_eq!(
            channel.open(&[0u8; 47], 20),
            Err(AuthError::Length { required: 48, actual: 47 })
        );
        assert_eq!(
            channel.open(&[0u8; 64], 20),
            Err(AuthError::Length { required: 48, actual: 64 })
        );
    }
}
