//! Symmetric encryption for flagged setting values.
//!
//! Both providers share one authenticated envelope:
//!
//! ```text
//! [SALT(S)][IV(16)][AES-256-CBC CIPHERTEXT(16n)][HMAC-SHA256(32)]
//! ```
//!
//! The MAC covers everything before it (encrypt-then-MAC). The fixed-key
//! provider has no salt; the password provider derives a fresh encryption key
//! and integrity key from the password and a random salt on every call. A
//! buffer only counts as encrypted when it is large enough for the envelope
//! and its MAC verifies, so ciphertext from a provider with different keys is
//! never accepted.
//!
//! Text forms are standard base64. Empty input encrypts and decrypts to empty
//! output.

use std::fmt;

use aes::Aes256;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

pub const KEY_SIZE: usize = 32;
pub const IV_SIZE: usize = 16;
pub const MAC_SIZE: usize = 32;
const BLOCK_SIZE: usize = 16;

pub const DEFAULT_ITERATIONS: u32 = 10_000;
pub const DEFAULT_SALT_SIZE: usize = 16;
pub const MIN_SALT_SIZE: usize = 8;

/// Outcome of opening text that may or may not be ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope<T> {
    /// A valid envelope for this provider, decrypted.
    Opened(T),
    /// Not an envelope this provider produced.
    NotEncrypted,
    /// Authenticated but undecodable.
    Corrupt,
}

/// A pluggable symmetric-encryption strategy.
pub trait CryptoProvider: Send + Sync + fmt::Debug {
    /// Stable name this provider is registered under, if any.
    fn name(&self) -> &str;

    fn encrypt_bytes(&self, plain: &[u8]) -> Vec<u8>;

    /// `None` when `cipher` is not a valid envelope for this provider.
    fn decrypt_bytes(&self, cipher: &[u8]) -> Option<Vec<u8>>;

    fn is_encrypted_bytes(&self, candidate: &[u8]) -> bool;

    /// Recognize and decrypt `candidate` in one step.
    fn open_bytes(&self, candidate: &[u8]) -> Envelope<Vec<u8>> {
        if !self.is_encrypted_bytes(candidate) {
            return Envelope::NotEncrypted;
        }
        match self.decrypt_bytes(candidate) {
            Some(plain) => Envelope::Opened(plain),
            None => Envelope::Corrupt,
        }
    }

    fn encrypt(&self, plain: &str) -> String {
        if plain.is_empty() {
            return String::new();
        }
        BASE64.encode(self.encrypt_bytes(plain.as_bytes()))
    }

    /// `None` for text that is not base64, not a valid envelope, or not UTF-8.
    fn decrypt(&self, cipher: &str) -> Option<String> {
        if cipher.is_empty() {
            return Some(String::new());
        }
        let bytes = BASE64.decode(cipher.trim()).ok()?;
        String::from_utf8(self.decrypt_bytes(&bytes)?).ok()
    }

    fn is_encrypted(&self, candidate: &str) -> bool {
        match BASE64.decode(candidate.trim()) {
            Ok(bytes) => self.is_encrypted_bytes(&bytes),
            Err(_) => false,
        }
    }

    /// Text form of [`open_bytes`](Self::open_bytes). Empty or non-base64
    /// text is not encrypted.
    fn open(&self, candidate: &str) -> Envelope<String> {
        let Ok(bytes) = BASE64.decode(candidate.trim()) else {
            return Envelope::NotEncrypted;
        };
        if bytes.is_empty() {
            return Envelope::NotEncrypted;
        }
        match self.open_bytes(&bytes) {
            Envelope::Opened(plain) => match String::from_utf8(plain) {
                Ok(text) => Envelope::Opened(text),
                Err(_) => Envelope::Corrupt,
            },
            Envelope::NotEncrypted => Envelope::NotEncrypted,
            Envelope::Corrupt => Envelope::Corrupt,
        }
    }

    fn encrypt_opt(&self, plain: Option<&str>) -> Option<String> {
        plain.map(|p| self.encrypt(p))
    }

    fn decrypt_opt(&self, cipher: Option<&str>) -> Option<String> {
        cipher.and_then(|c| self.decrypt(c))
    }
}

fn mac_for(integrity_key: &[u8], data: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(integrity_key).expect("HMAC can take any size");
    mac.update(data);
    mac
}

/// Build `[prefix][IV][ciphertext][MAC]`.
fn seal(key: &[u8; KEY_SIZE], integrity_key: &[u8], prefix: &[u8], plain: &[u8]) -> Vec<u8> {
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new(key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plain);

    let mut out = Vec::with_capacity(prefix.len() + IV_SIZE + cipher.len() + MAC_SIZE);
    out.extend_from_slice(prefix);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&cipher);
    let tag = mac_for(integrity_key, &out).finalize().into_bytes();
    out.extend_from_slice(&tag);
    out
}

/// Whether `buf` has the shape of an envelope with a `prefix_len`-byte prefix.
fn well_formed(buf: &[u8], prefix_len: usize) -> bool {
    let min = prefix_len + IV_SIZE + BLOCK_SIZE + MAC_SIZE;
    buf.len() >= min && (buf.len() - prefix_len - IV_SIZE - MAC_SIZE) % BLOCK_SIZE == 0
}

fn verify(integrity_key: &[u8], buf: &[u8]) -> bool {
    let (body, tag) = buf.split_at(buf.len() - MAC_SIZE);
    mac_for(integrity_key, body).verify_slice(tag).is_ok()
}

/// Decrypt an envelope whose MAC has already been verified.
fn unseal(key: &[u8; KEY_SIZE], buf: &[u8], prefix_len: usize) -> Option<Vec<u8>> {
    let body = &buf[prefix_len..buf.len() - MAC_SIZE];
    let (iv, cipher) = body.split_at(IV_SIZE);
    let iv: [u8; IV_SIZE] = iv.try_into().ok()?;
    Aes256CbcDec::new(key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(cipher)
        .ok()
}

/// Symmetric provider with key material supplied by the application. Keys
/// are held in memory only.
#[derive(Clone)]
pub struct FixedKeyProvider {
    name: String,
    key: [u8; KEY_SIZE],
    integrity_key: [u8; KEY_SIZE],
}

impl FixedKeyProvider {
    pub fn new(key: [u8; KEY_SIZE], integrity_key: [u8; KEY_SIZE]) -> Self {
        Self {
            name: "FixedKeyProvider".into(),
            key,
            integrity_key,
        }
    }

    /// Set the name this provider is registered under.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl fmt::Debug for FixedKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedKeyProvider")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl CryptoProvider for FixedKeyProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn encrypt_bytes(&self, plain: &[u8]) -> Vec<u8> {
        if plain.is_empty() {
            return Vec::new();
        }
        seal(&self.key, &self.integrity_key, &[], plain)
    }

    fn decrypt_bytes(&self, cipher: &[u8]) -> Option<Vec<u8>> {
        if cipher.is_empty() {
            return Some(Vec::new());
        }
        if !self.is_encrypted_bytes(cipher) {
            return None;
        }
        unseal(&self.key, cipher, 0)
    }

    fn is_encrypted_bytes(&self, candidate: &[u8]) -> bool {
        well_formed(candidate, 0) && verify(&self.integrity_key, candidate)
    }
}

/// Symmetric provider keyed by a password. PBKDF2-HMAC-SHA256 over a fresh
/// random salt derives the encryption and integrity keys for every envelope.
#[derive(Clone)]
pub struct PasswordProvider {
    name: String,
    password: String,
    iterations: u32,
    salt_size: usize,
}

impl PasswordProvider {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            name: "PasswordProvider".into(),
            password: password.into(),
            iterations: DEFAULT_ITERATIONS,
            salt_size: DEFAULT_SALT_SIZE,
        }
    }

    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    /// Salt length in bytes, never below [`MIN_SALT_SIZE`].
    pub fn salt_size(mut self, salt_size: usize) -> Self {
        self.salt_size = salt_size.max(MIN_SALT_SIZE);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn derive(&self, salt: &[u8]) -> ([u8; KEY_SIZE], [u8; KEY_SIZE]) {
        let mut out = [0u8; KEY_SIZE * 2];
        pbkdf2::pbkdf2_hmac::<Sha256>(self.password.as_bytes(), salt, self.iterations, &mut out);
        let mut key = [0u8; KEY_SIZE];
        let mut integrity_key = [0u8; KEY_SIZE];
        key.copy_from_slice(&out[..KEY_SIZE]);
        integrity_key.copy_from_slice(&out[KEY_SIZE..]);
        (key, integrity_key)
    }
}

impl fmt::Debug for PasswordProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordProvider")
            .field("name", &self.name)
            .field("iterations", &self.iterations)
            .field("salt_size", &self.salt_size)
            .finish_non_exhaustive()
    }
}

impl CryptoProvider for PasswordProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn encrypt_bytes(&self, plain: &[u8]) -> Vec<u8> {
        if plain.is_empty() {
            return Vec::new();
        }
        let mut salt = vec![0u8; self.salt_size];
        rand::thread_rng().fill_bytes(&mut salt);
        let (key, integrity_key) = self.derive(&salt);
        seal(&key, &integrity_key, &salt, plain)
    }

    fn decrypt_bytes(&self, cipher: &[u8]) -> Option<Vec<u8>> {
        if cipher.is_empty() {
            return Some(Vec::new());
        }
        match self.open_bytes(cipher) {
            Envelope::Opened(plain) => Some(plain),
            Envelope::NotEncrypted | Envelope::Corrupt => None,
        }
    }

    /// One key derivation per call.
    fn open_bytes(&self, candidate: &[u8]) -> Envelope<Vec<u8>> {
        if !well_formed(candidate, self.salt_size) {
            return Envelope::NotEncrypted;
        }
        let (key, integrity_key) = self.derive(&candidate[..self.salt_size]);
        if !verify(&integrity_key, candidate) {
            return Envelope::NotEncrypted;
        }
        match unseal(&key, candidate, self.salt_size) {
            Some(plain) => Envelope::Opened(plain),
            None => Envelope::Corrupt,
        }
    }

    fn is_encrypted_bytes(&self, candidate: &[u8]) -> bool {
        if !well_formed(candidate, self.salt_size) {
            return false;
        }
        let (_, integrity_key) = self.derive(&candidate[..self.salt_size]);
        verify(&integrity_key, candidate)
    }
}
