//! HKDF-SHA256 key derivation and AES-128-CBC with PKCS#7 padding.
//!
//! The session key is stretched from the DH shared secret with no salt and
//! no info string. Every encryption draws a fresh random IV, so the same
//! plaintext sealed twice never produces the same ciphertext. There is no
//! MAC: this cipher hides payloads from passive observers only.

use aes::Aes128;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use num_bigint::BigUint;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Result, SecretError};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES-128 key size in bytes.
pub const KEY_SIZE: usize = 16;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// CBC initialization vector size in bytes.
pub const IV_SIZE: usize = 16;

/// Symmetric key bound to one session. Zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey([REDACTED])")
    }
}

/// Derive the 128-bit session key from a DH shared secret.
pub fn derive_key(shared_secret: &BigUint) -> Result<SessionKey> {
    let ikm = Zeroizing::new(shared_secret.to_bytes_be());
    let hk = Hkdf::<Sha256>::new(None, &ikm);

    let mut okm = [0u8; KEY_SIZE];
    hk.expand(&[], &mut okm)
        .map_err(|e| SecretError::Crypto(format!("HKDF expand failed: {e}")))?;

    let key = SessionKey::from_bytes(okm);
    okm.zeroize();
    Ok(key)
}

/// Encrypt `plaintext` under `key`.
///
/// Returns `(iv, ciphertext)`. Fails rather than encrypt if the system RNG
/// cannot produce a fresh IV.
pub fn encrypt(plaintext: &[u8], key: &SessionKey) -> Result<([u8; IV_SIZE], Vec<u8>)> {
    let mut iv = [0u8; IV_SIZE];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| SecretError::Crypto(format!("IV generation failed: {e}")))?;

    let padded = Zeroizing::new(pad_pkcs7(plaintext, BLOCK_SIZE));
    let cipher = Aes128CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| SecretError::Crypto(e.to_string()))?;

    let ciphertext = cipher.encrypt_padded_vec_mut::<NoPadding>(&padded);
    Ok((iv, ciphertext))
}

/// Decrypt data previously produced by [`encrypt`].
pub fn decrypt(iv: &[u8], ciphertext: &[u8], key: &SessionKey) -> Result<Vec<u8>> {
    if iv.len() != IV_SIZE {
        return Err(SecretError::Crypto(format!(
            "IV must be {IV_SIZE} bytes, got {}",
            iv.len()
        )));
    }
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(SecretError::Padding(
            "ciphertext is not a whole number of blocks",
        ));
    }

    let cipher = Aes128CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| SecretError::Crypto(e.to_string()))?;
    let padded = Zeroizing::new(
        cipher
            .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
            .map_err(|_| SecretError::Padding("ciphertext is not a whole number of blocks"))?,
    );

    unpad_pkcs7(&padded, BLOCK_SIZE)
}

/// Pad `data` to a multiple of `block_size` (1..=255).
///
/// A full block of padding is appended when the input is already aligned.
pub fn pad_pkcs7(data: &[u8], block_size: usize) -> Vec<u8> {
    let pad = block_size - data.len() % block_size;
    let mut padded = Vec::with_capacity(data.len() + pad);
    padded.extend_from_slice(data);
    padded.resize(data.len() + pad, pad as u8);
    padded
}

/// Strip PKCS#7 padding.
pub fn unpad_pkcs7(data: &[u8], block_size: usize) -> Result<Vec<u8>> {
    let Some(&last) = data.last() else {
        return Err(SecretError::Padding("empty buffer"));
    };
    if data.len() % block_size != 0 {
        return Err(SecretError::Padding(
            "length is not a multiple of the block size",
        ));
    }

    let pad = usize::from(last);
    if pad == 0 || pad > block_size || pad > data.len() {
        return Err(SecretError::Padding("pad length out of range"));
    }

    let (body, padding) = data.split_at(data.len() - pad);
    if !padding.iter().all(|&b| b == last) {
        return Err(SecretError::Padding("pad bytes disagree with pad length"));
    }

    Ok(body.to_vec())
}
