//! XML Digital Signature support.
//!
//! Enveloped signatures over SAML elements, digested and signed over the
//! exclusive canonical form of [`crate::xml::XmlElement`] subtrees:
//!
//! - [`XmlSigner`] signs outbound messages with the SP key
//! - [`X509TrustEngine`] checks inbound signatures against the certificates
//!   configured for one identity provider
//!
//! Trust is reported as a [`SignatureTrust`] tri-state so that callers can
//! fall back on other signed objects when a signature is merely absent.

mod signer;
mod validator;

pub use signer::XmlSigner;
pub use validator::X509TrustEngine;

use std::fmt;

use crate::error::{SamlError, SamlResult};
use crate::types::XMLDSIG_NS;
use crate::xml::XmlElement;

pub use sp_crypto::RsaAlgorithm as SignatureAlgorithm;

/// Exclusive XML canonicalization URI.
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// Enveloped signature transform URI.
pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

/// Digest algorithms for signature references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// SHA-1 (verification only).
    Sha1,
    /// SHA-256.
    #[default]
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl DigestAlgorithm {
    /// Returns the XML-DSig digest URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
            Self::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            Self::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            Self::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    /// Parses an XML-DSig digest URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        [Self::Sha1, Self::Sha256, Self::Sha384, Self::Sha512]
            .into_iter()
            .find(|d| d.uri() == uri)
    }

    /// Digests `data`.
    #[must_use]
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => sp_crypto::sha1(data),
            Self::Sha256 => sp_crypto::sha256(data),
            Self::Sha384 => sp_crypto::sha384(data),
            Self::Sha512 => sp_crypto::sha512(data),
        }
    }
}

/// Outcome of evaluating the signature of one SAML object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureTrust {
    /// The object carries no signature.
    Absent,
    /// A signature is present but malformed, wrong or untrusted.
    Invalid(String),
    /// A valid signature from a trusted credential covers the object.
    Trusted,
}

impl SignatureTrust {
    /// Returns `true` for [`SignatureTrust::Trusted`].
    #[must_use]
    pub const fn is_trusted(&self) -> bool {
        matches!(self, Self::Trusted)
    }

    /// Requires a trusted signature on `what`.
    ///
    /// An absent signature yields [`SamlError::NotSigned`]; an invalid one a
    /// [`SamlError::Security`] error.
    pub fn require(self, what: &str) -> SamlResult<()> {
        match self {
            Self::Trusted => Ok(()),
            Self::Absent => Err(SamlError::NotSigned(format!("{what} is not signed"))),
            Self::Invalid(reason) => Err(SamlError::Security(format!(
                "{what} signature cannot be trusted: {reason}"
            ))),
        }
    }
}

/// Evaluates enveloped signatures for one identity provider.
pub trait SignatureTrustEngine: Send + Sync + fmt::Debug {
    /// Evaluates the signature that is an immediate child of `element`.
    ///
    /// `issuer` is the entity ID claimed by the message; engines scoped to
    /// another entity must not report the signature as trusted.
    fn evaluate(&self, element: &XmlElement, issuer: Option<&str>) -> SignatureTrust;
}

/// Returns the canonical content covered by an enveloped signature on
/// `element`.
pub(crate) fn signed_content(
    element: &XmlElement,
    inclusive_prefixes: &[String],
) -> SamlResult<String> {
    element
        .without_children(XMLDSIG_NS, "Signature")
        .canonicalize_with_prefixes(inclusive_prefixes)
}
