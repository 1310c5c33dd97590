//! SAML 2.0 constants and URIs.
//!
//! Contains namespace URIs, binding URIs, name ID formats, and other
//! constants defined by SAML 2.0.

/// SAML 2.0 namespace URI.
pub const SAML_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

/// SAML 2.0 protocol namespace URI.
pub const SAMLP_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";

/// XML Digital Signature namespace URI.
pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XML Encryption namespace URI.
pub const XMLENC_NS: &str = "http://www.w3.org/2001/04/xmlenc#";

/// SAML protocol version.
pub const SAML_VERSION: &str = "2.0";

// ============================================================================
// Bindings
// ============================================================================

/// SAML bindings supported by the service provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SamlBinding {
    /// HTTP POST binding.
    #[serde(rename = "POST")]
    HttpPost,
    /// HTTP Redirect binding.
    #[serde(rename = "Redirect")]
    HttpRedirect,
}

impl SamlBinding {
    /// All supported bindings, in ordinal order.
    pub const ALL: [Self; 2] = [Self::HttpPost, Self::HttpRedirect];

    /// Returns the URI for this binding.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::HttpPost => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST",
            Self::HttpRedirect => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect",
        }
    }

    /// Parses a binding from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.uri() == uri)
    }

    /// Returns the HTTP method used to deliver messages with this binding.
    #[must_use]
    pub const fn http_method(self) -> &'static str {
        match self {
            Self::HttpPost => "POST",
            Self::HttpRedirect => "GET",
        }
    }

    /// Returns the ordinal carried in relay-state tokens.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::HttpPost => 0,
            Self::HttpRedirect => 1,
        }
    }

    /// Parses a relay-state ordinal.
    #[must_use]
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.ordinal() == ordinal)
    }
}

// ============================================================================
// Status codes
// ============================================================================

/// Top-level success status.
pub const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";

/// The request could not be performed due to an error on the requester side.
pub const STATUS_REQUESTER: &str = "urn:oasis:names:tc:SAML:2.0:status:Requester";

/// The request could not be performed due to an error on the responder side.
pub const STATUS_RESPONDER: &str = "urn:oasis:names:tc:SAML:2.0:status:Responder";

// ============================================================================
// Name ID Formats
// ============================================================================

/// Transient name identifier format.
pub const NAMEID_FORMAT_TRANSIENT: &str = "urn:oasis:names:tc:SAML:2.0:nameid-format:transient";

/// Persistent name identifier format.
pub const NAMEID_FORMAT_PERSISTENT: &str = "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent";

/// Email address name identifier format.
pub const NAMEID_FORMAT_EMAIL: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress";

/// Bearer subject confirmation method.
pub const CONFIRMATION_METHOD_BEARER: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";
