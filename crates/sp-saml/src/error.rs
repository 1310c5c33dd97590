//! SAML error types.
//!
//! The taxonomy separates failures the host must treat differently:
//! building errors on the outbound side, processing and validation errors
//! for inbound messages that are merely unusable, and security errors for
//! messages that look forged or replayed.

use sp_cache::CacheError;
use sp_crypto::CryptoError;
use thiserror::Error;

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// SAML service provider errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// An outbound message could not be constructed.
    #[error("unable to build SAML message: {0}")]
    Building(String),

    /// An inbound message could not be validated or processed.
    #[error("unable to process SAML message: {0}")]
    Processing(String),

    /// Signature, trust or replay violation.
    #[error("SAML security violation: {0}")]
    Security(String),

    /// A validity window was violated.
    #[error("SAML validation failed: {0}")]
    Validation(String),

    /// The object carries no signature at all.
    ///
    /// Only used to drive fallback logic; it never leaves the state machine.
    #[error("SAML object is not signed: {0}")]
    NotSigned(String),

    /// Unknown binding, message type or SAML feature.
    #[error("unsupported SAML operation: {0}")]
    UnsupportedOperation(String),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Deflate compression or decompression error.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// Cryptographic operation error.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Correlation store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// An authentication is already stored under this session index.
    #[error("an authentication is already stored for session index {0}")]
    DuplicateAuthentication(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Outbound HTTP delivery failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl SamlError {
    /// Returns `true` for errors that must be reported on the security-audit channel.
    #[must_use]
    pub const fn is_security(&self) -> bool {
        matches!(self, Self::Security(_))
    }

    /// Converts inbound decoding and validation failures into processing errors.
    ///
    /// Security, unsupported-operation and processing errors are returned unchanged.
    #[must_use]
    pub fn into_processing(self) -> Self {
        match self {
            Self::Validation(msg)
            | Self::XmlParse(msg)
            | Self::Base64Decode(msg)
            | Self::Deflate(msg)
            | Self::Crypto(msg) => Self::Processing(msg),
            other => other,
        }
    }

    /// Returns the SAML status code matching this error.
    #[must_use]
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::UnsupportedOperation(_) => "urn:oasis:names:tc:SAML:2.0:status:RequestUnsupported",
            Self::Security(_) | Self::NotSigned(_) => {
                "urn:oasis:names:tc:SAML:2.0:status:RequestDenied"
            }
            Self::Processing(_)
            | Self::Validation(_)
            | Self::XmlParse(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_) => "urn:oasis:names:tc:SAML:2.0:status:Requester",
            _ => "urn:oasis:names:tc:SAML:2.0:status:Responder",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Processing(_)
            | Self::Validation(_)
            | Self::XmlParse(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_) => 400,
            Self::Security(_) | Self::NotSigned(_) | Self::DuplicateAuthentication(_) => 403,
            Self::UnsupportedOperation(_) => 501,
            _ => 500,
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for SamlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

impl From<std::io::Error> for SamlError {
    fn from(err: std::io::Error) -> Self {
        Self::Deflate(err.to_string())
    }
}

impl From<CacheError> for SamlError {
    fn from(err: CacheError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<CryptoError> for SamlError {
    fn from(err: CryptoError) -> Self {
        Self::Crypto(err.to_string())
    }
}
