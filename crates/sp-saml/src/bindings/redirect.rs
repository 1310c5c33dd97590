//! HTTP-Redirect Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-Redirect binding for sending SAML messages
//! via URL query parameters with DEFLATE compression.

use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::{SamlError, SamlResult};

use super::{DecodedMessage, SamlMessageType};

/// Largest inflated message accepted from a redirect token.
pub const MAX_MESSAGE_BYTES: u64 = 1024 * 1024;

/// HTTP-Redirect binding encoder/decoder.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Deflates and base64-encodes a message.
    ///
    /// The token is not URL-encoded; [`HttpRedirectBinding::build_url`] does that.
    pub fn encode_message(xml: &str) -> SamlResult<String> {
        if xml.is_empty() {
            return Err(SamlError::Building(
                "cannot encode an empty SAML message".to_string(),
            ));
        }
        let compressed = deflate_compress(xml.as_bytes())?;
        Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
    }

    /// Base64-decodes and inflates a token back into the XML message.
    pub fn decode_message(token: &str) -> SamlResult<String> {
        let compressed = base64::engine::general_purpose::STANDARD.decode(token.trim())?;
        let xml_bytes = deflate_decompress(&compressed)?;
        String::from_utf8(xml_bytes)
            .map_err(|e| SamlError::Processing(format!("Invalid UTF-8 in message: {e}")))
    }

    /// Builds the redirect URL carrying `token` and `relay_state`.
    ///
    /// Both values must be non-empty. `RelayState` comes first, followed by
    /// `SAMLRequest` or `SAMLResponse`.
    pub fn build_url(
        endpoint: &str,
        message_type: SamlMessageType,
        token: &str,
        relay_state: &str,
    ) -> SamlResult<String> {
        if token.is_empty() || relay_state.is_empty() {
            return Err(SamlError::Building(
                "redirect URL requires both a message and a relay state".to_string(),
            ));
        }

        let separator = if endpoint.contains('?') { '&' } else { '?' };
        Ok(format!(
            "{endpoint}{separator}RelayState={}&{}={}",
            urlencoding::encode(relay_state),
            message_type.form_param(),
            urlencoding::encode(token)
        ))
    }

    /// Decodes a message from a full redirect URL.
    pub fn decode_url(url: &str) -> SamlResult<DecodedMessage> {
        let parsed = url::Url::parse(url)
            .map_err(|e| SamlError::Processing(format!("Invalid URL: {e}")))?;

        let mut saml_request = None;
        let mut saml_response = None;
        let mut relay_state = None;

        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "SAMLRequest" => saml_request = Some(value.to_string()),
                "SAMLResponse" => saml_response = Some(value.to_string()),
                "RelayState" => relay_state = Some(value.to_string()),
                _ => {}
            }
        }

        super::decode_message(
            crate::types::SamlBinding::HttpRedirect,
            saml_request.as_deref(),
            saml_response.as_deref(),
            relay_state.as_deref(),
        )
    }
}

/// Compresses data using raw DEFLATE.
fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Deflate(format!("Compression error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SamlError::Deflate(format!("Compression finish error: {e}")))
}

/// Decompresses raw DEFLATE data, refusing output over [`MAX_MESSAGE_BYTES`].
fn deflate_decompress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data).take(MAX_MESSAGE_BYTES + 1);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| SamlError::Deflate(format!("Decompression error: {e}")))?;
    if decompressed.len() as u64 > MAX_MESSAGE_BYTES {
        return Err(SamlError::Deflate(format!(
            "inflated message exceeds {MAX_MESSAGE_BYTES} bytes"
        )));
    }
    Ok(decompressed)
}
