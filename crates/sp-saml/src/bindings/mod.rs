//! SAML bindings implementation.
//!
//! This module implements the two SAML 2.0 bindings used by the service
//! provider:
//!
//! - **HTTP-POST Binding** - Messages are base64-encoded and sent as form fields
//! - **HTTP-Redirect Binding** - Messages are deflated, base64-encoded, and URL-encoded
//!
//! # Usage
//!
//! ```rust,ignore
//! use sp_saml::bindings::{HttpRedirectBinding, SamlMessageType};
//!
//! let token = HttpRedirectBinding::encode_message(&request_xml)?;
//! let url = HttpRedirectBinding::build_url(
//!     "https://idp.example.com/sso",
//!     SamlMessageType::Request,
//!     &token,
//!     &relay_state,
//! )?;
//! ```

mod post;
mod redirect;

pub use post::*;
pub use redirect::*;

use crate::error::{SamlError, SamlResult};
use crate::types::SamlBinding;

/// SAML message type for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// `AuthnRequest` or `LogoutRequest`.
    Request,
    /// `Response` or `LogoutResponse`.
    Response,
}

impl SamlMessageType {
    /// Returns the form parameter name for this message type.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }
}

/// Decoded SAML binding message.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    /// The decoded XML message.
    pub xml: String,
    /// The message type (request or response).
    pub message_type: SamlMessageType,
    /// The RelayState if present.
    pub relay_state: Option<String>,
}

/// Decodes a message received with `binding`.
///
/// `saml_request` and `saml_response` are the raw (already URL-decoded)
/// parameter values; exactly one of them is expected.
pub fn decode_message(
    binding: SamlBinding,
    saml_request: Option<&str>,
    saml_response: Option<&str>,
    relay_state: Option<&str>,
) -> SamlResult<DecodedMessage> {
    let (encoded, message_type) = match (saml_request, saml_response) {
        (Some(req), None) => (req, SamlMessageType::Request),
        (None, Some(resp)) => (resp, SamlMessageType::Response),
        (Some(_), Some(_)) => {
            return Err(SamlError::Processing(
                "SAMLRequest and SAMLResponse are mutually exclusive".to_string(),
            ))
        }
        (None, None) => {
            return Err(SamlError::Processing(
                "No SAMLRequest or SAMLResponse parameter".to_string(),
            ))
        }
    };

    let xml = match binding {
        SamlBinding::HttpPost => HttpPostBinding::decode_message(encoded)?,
        SamlBinding::HttpRedirect => HttpRedirectBinding::decode_message(encoded)?,
    };

    Ok(DecodedMessage {
        xml,
        message_type,
        relay_state: relay_state.filter(|rs| !rs.is_empty()).map(String::from),
    })
}
