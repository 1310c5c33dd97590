//! XML-Encryption primitives.
//!
//! Encrypted SAML elements carry a symmetric content key wrapped with the
//! SP's RSA key (RSA-OAEP key transport) and content encrypted with AES in
//! CBC or GCM mode. The encrypted octets start with the IV:
//!
//! - CBC: `IV (16) || ciphertext`, padded as in ISO 10126 (only the final
//!   byte, the pad length, is meaningful)
//! - GCM: `IV (12) || ciphertext || tag (16)`

use aws_lc_rs::{
    aead::{self, Aad, LessSafeKey, Nonce, UnboundKey},
    cipher::{
        self, DecryptingKey, DecryptionContext, EncryptionContext, PaddedBlockEncryptingKey,
        UnboundCipherKey,
    },
    rsa::{
        OaepAlgorithm, OaepPrivateDecryptingKey, OaepPublicEncryptingKey, PrivateDecryptingKey,
        PublicEncryptingKey, OAEP_SHA1_MGF1SHA1, OAEP_SHA256_MGF1SHA256,
    },
};

use crate::error::{CryptoError, CryptoResult};
use crate::random::random_bytes;

const AES_BLOCK_LEN: usize = 16;
const GCM_IV_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;

/// Digest used by RSA-OAEP for both the label hash and MGF1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OaepDigest {
    /// `rsa-oaep-mgf1p` default.
    #[default]
    Sha1,
    /// SHA-256 digest and MGF1 with SHA-256.
    Sha256,
}

impl OaepDigest {
    fn algorithm(self) -> &'static OaepAlgorithm {
        match self {
            Self::Sha1 => &OAEP_SHA1_MGF1SHA1,
            Self::Sha256 => &OAEP_SHA256_MGF1SHA256,
        }
    }
}

/// Block cipher used for the encrypted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCipher {
    /// `xmlenc#aes128-cbc`
    Aes128Cbc,
    /// `xmlenc#aes256-cbc`
    Aes256Cbc,
    /// `xmlenc11#aes128-gcm`
    Aes128Gcm,
    /// `xmlenc11#aes256-gcm`
    Aes256Gcm,
}

impl BlockCipher {
    /// Returns the XML-Encryption algorithm URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Aes128Cbc => "http://www.w3.org/2001/04/xmlenc#aes128-cbc",
            Self::Aes256Cbc => "http://www.w3.org/2001/04/xmlenc#aes256-cbc",
            Self::Aes128Gcm => "http://www.w3.org/2009/xmlenc11#aes128-gcm",
            Self::Aes256Gcm => "http://www.w3.org/2009/xmlenc11#aes256-gcm",
        }
    }

    /// Parses an XML-Encryption algorithm URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        [
            Self::Aes128Cbc,
            Self::Aes256Cbc,
            Self::Aes128Gcm,
            Self::Aes256Gcm,
        ]
        .into_iter()
        .find(|c| c.uri() == uri)
    }

    /// Returns the key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc | Self::Aes128Gcm => 16,
            Self::Aes256Cbc | Self::Aes256Gcm => 32,
        }
    }

    /// Decrypts `IV || ciphertext [|| tag]` with `key`.
    pub fn decrypt(self, key: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
        if key.len() != self.key_len() {
            return Err(CryptoError::InvalidKey(format!(
                "expected a {}-byte content key, got {}",
                self.key_len(),
                key.len()
            )));
        }
        match self {
            Self::Aes128Cbc => aes_cbc_decrypt(&cipher::AES_128, key, data),
            Self::Aes256Cbc => aes_cbc_decrypt(&cipher::AES_256, key, data),
            Self::Aes128Gcm => aes_gcm_decrypt(&aead::AES_128_GCM, key, data),
            Self::Aes256Gcm => aes_gcm_decrypt(&aead::AES_256_GCM, key, data),
        }
    }

    /// Encrypts `plaintext` with `key` under a fresh random IV.
    ///
    /// The output layout matches what [`BlockCipher::decrypt`] expects.
    pub fn encrypt(self, key: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        if key.len() != self.key_len() {
            return Err(CryptoError::InvalidKey(format!(
                "expected a {}-byte content key, got {}",
                self.key_len(),
                key.len()
            )));
        }
        match self {
            Self::Aes128Cbc => aes_cbc_encrypt(&cipher::AES_128, key, plaintext),
            Self::Aes256Cbc => aes_cbc_encrypt(&cipher::AES_256, key, plaintext),
            Self::Aes128Gcm => aes_gcm_encrypt(&aead::AES_128_GCM, key, plaintext),
            Self::Aes256Gcm => aes_gcm_encrypt(&aead::AES_256_GCM, key, plaintext),
        }
    }
}

/// Unwraps a content key with the SP's RSA private key (PKCS#8 DER).
pub fn rsa_oaep_decrypt(
    private_key_der: &[u8],
    wrapped: &[u8],
    digest: OaepDigest,
) -> CryptoResult<Vec<u8>> {
    let key = PrivateDecryptingKey::from_pkcs8(private_key_der)
        .map_err(|e| CryptoError::InvalidKey(format!("Invalid RSA key: {e}")))?;
    let key = OaepPrivateDecryptingKey::new(key)
        .map_err(|e| CryptoError::InvalidKey(format!("RSA key unusable for OAEP: {e}")))?;

    let mut out = vec![0u8; key.min_output_size()];
    let plain = key
        .decrypt(digest.algorithm(), wrapped, &mut out, None)
        .map_err(|e| CryptoError::Decryption(format!("RSA-OAEP key unwrap failed: {e}")))?;
    Ok(plain.to_vec())
}

/// Wraps a content key with an RSA public key (X.509 `SubjectPublicKeyInfo` DER).
pub fn rsa_oaep_encrypt(
    public_key_der: &[u8],
    plaintext: &[u8],
    digest: OaepDigest,
) -> CryptoResult<Vec<u8>> {
    let key = PublicEncryptingKey::from_der(public_key_der)
        .map_err(|e| CryptoError::InvalidKey(format!("Invalid RSA public key: {e}")))?;
    let key = OaepPublicEncryptingKey::new(key)
        .map_err(|e| CryptoError::InvalidKey(format!("RSA key unusable for OAEP: {e}")))?;

    let mut out = vec![0u8; key.ciphertext_size()];
    let wrapped = key
        .encrypt(digest.algorithm(), plaintext, &mut out, None)
        .map_err(|e| CryptoError::Encryption(format!("RSA-OAEP key wrap failed: {e}")))?;
    Ok(wrapped.to_vec())
}

// CBC chaining is applied over raw AES block decryption so that ISO 10126
// padding (random filler bytes) is accepted.
fn aes_cbc_decrypt(
    algorithm: &'static cipher::Algorithm,
    key: &[u8],
    data: &[u8],
) -> CryptoResult<Vec<u8>> {
    if data.len() < 2 * AES_BLOCK_LEN || data.len() % AES_BLOCK_LEN != 0 {
        return Err(CryptoError::Decryption(format!(
            "invalid CBC payload length {}",
            data.len()
        )));
    }

    let key = UnboundCipherKey::new(algorithm, key)
        .map_err(|e| CryptoError::InvalidKey(format!("Invalid AES key: {e}")))?;
    let key = DecryptingKey::ecb(key)
        .map_err(|e| CryptoError::InvalidKey(format!("Invalid AES key: {e}")))?;

    let (iv, body) = data.split_at(AES_BLOCK_LEN);
    let mut plain = body.to_vec();
    key.decrypt(&mut plain, DecryptionContext::None)
        .map_err(|e| CryptoError::Decryption(format!("AES decryption failed: {e}")))?;

    for (i, block) in plain.chunks_mut(AES_BLOCK_LEN).enumerate() {
        let previous = if i == 0 {
            iv
        } else {
            &body[(i - 1) * AES_BLOCK_LEN..i * AES_BLOCK_LEN]
        };
        for (b, p) in block.iter_mut().zip(previous) {
            *b ^= p;
        }
    }

    let pad = usize::from(plain[plain.len() - 1]);
    if pad == 0 || pad > AES_BLOCK_LEN {
        return Err(CryptoError::Decryption("invalid CBC padding".to_string()));
    }
    plain.truncate(plain.len() - pad);
    Ok(plain)
}

fn aes_cbc_encrypt(
    algorithm: &'static cipher::Algorithm,
    key: &[u8],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let key = UnboundCipherKey::new(algorithm, key)
        .map_err(|e| CryptoError::InvalidKey(format!("Invalid AES key: {e}")))?;
    let key = PaddedBlockEncryptingKey::cbc_pkcs7(key)
        .map_err(|e| CryptoError::InvalidKey(format!("Invalid AES key: {e}")))?;

    let mut iv = [0u8; AES_BLOCK_LEN];
    iv.copy_from_slice(&random_bytes(AES_BLOCK_LEN));

    let mut body = plaintext.to_vec();
    key.less_safe_encrypt(&mut body, EncryptionContext::Iv128(iv.into()))
        .map_err(|e| CryptoError::Encryption(format!("AES encryption failed: {e}")))?;

    let mut out = iv.to_vec();
    out.extend_from_slice(&body);
    Ok(out)
}

fn aes_gcm_decrypt(
    algorithm: &'static aead::Algorithm,
    key: &[u8],
    data: &[u8],
) -> CryptoResult<Vec<u8>> {
    if data.len() < GCM_IV_LEN + GCM_TAG_LEN {
        return Err(CryptoError::Decryption(format!(
            "invalid GCM payload length {}",
            data.len()
        )));
    }

    let key = UnboundKey::new(algorithm, key)
        .map_err(|e| CryptoError::InvalidKey(format!("Invalid AES key: {e}")))?;
    let key = LessSafeKey::new(key);

    let (iv, body) = data.split_at(GCM_IV_LEN);
    let nonce = Nonce::try_assume_unique_for_key(iv)
        .map_err(|e| CryptoError::Decryption(format!("invalid GCM nonce: {e}")))?;

    let mut in_out = body.to_vec();
    let plain = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|e| CryptoError::Decryption(format!("AES-GCM authentication failed: {e}")))?;
    Ok(plain.to_vec())
}

fn aes_gcm_encrypt(
    algorithm: &'static aead::Algorithm,
    key: &[u8],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let key = UnboundKey::new(algorithm, key)
        .map_err(|e| CryptoError::InvalidKey(format!("Invalid AES key: {e}")))?;
    let key = LessSafeKey::new(key);

    let iv = random_bytes(GCM_IV_LEN);
    let nonce = Nonce::try_assume_unique_for_key(&iv)
        .map_err(|e| CryptoError::Encryption(format!("invalid GCM nonce: {e}")))?;

    let mut body = plaintext.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut body)
        .map_err(|e| CryptoError::Encryption(format!("AES-GCM encryption failed: {e}")))?;

    let mut out = iv;
    out.extend_from_slice(&body);
    Ok(out)
}
