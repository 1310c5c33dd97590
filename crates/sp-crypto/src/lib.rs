//! # sp-crypto
//!
//! Cryptographic operations for the SAML 2.0 service provider using aws-lc-rs.
//!
//! ## Modules
//!
//! - [`random`] - Secure random bytes and hex identifiers
//! - [`hash`] - SHA-1 (digest verification only) and SHA-2 digests
//! - [`rsa`] - RSA PKCS#1 v1.5 signatures as required by XML-DSig
//! - [`encryption`] - XML-Encryption primitives (RSA-OAEP key transport, AES-CBC, AES-GCM)
//! - [`pem`] - PEM armor decoding
//!
//! SAML 2.0 deployments still rely on SHA-256 signatures and SHA-1 OAEP
//! key transport. Those algorithms are exposed here for interoperability
//! with external identity providers only.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod encryption;
pub mod error;
pub mod hash;
pub mod pem;
pub mod random;
pub mod rsa;

pub use encryption::{BlockCipher, OaepDigest};
pub use error::{CryptoError, CryptoResult};
pub use hash::{sha1, sha256, sha384, sha512};
pub use random::{random_bytes, random_hex};
pub use rsa::{rsa_sign, rsa_verify, RsaAlgorithm};
