//! HTTP-POST Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-POST binding for sending SAML messages
//! via HTML form POST.

use base64::Engine;

use crate::error::{SamlError, SamlResult};

use super::SamlMessageType;

/// HTTP-POST binding encoder/decoder.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Base64-encodes a message (no compression, no line breaks).
    pub fn encode_message(xml: &str) -> SamlResult<String> {
        if xml.is_empty() {
            return Err(SamlError::Building(
                "cannot encode an empty SAML message".to_string(),
            ));
        }
        Ok(base64::engine::general_purpose::STANDARD.encode(xml))
    }

    /// Base64-decodes a form field back into the XML message.
    ///
    /// Line breaks inserted by some identity providers are tolerated.
    pub fn decode_message(encoded: &str) -> SamlResult<String> {
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = base64::engine::general_purpose::STANDARD.decode(compact)?;
        String::from_utf8(decoded)
            .map_err(|e| SamlError::Processing(format!("Invalid UTF-8 in message: {e}")))
    }

    /// Returns the form fields for a POST: `RelayState` (when non-empty) then the message.
    #[must_use]
    pub fn form_params(
        message_type: SamlMessageType,
        token: &str,
        relay_state: &str,
    ) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(2);
        if !relay_state.is_empty() {
            params.push(("RelayState".to_string(), relay_state.to_string()));
        }
        params.push((message_type.form_param().to_string(), token.to_string()));
        params
    }

    /// Renders an HTML page that auto-submits `params` to `destination`.
    #[must_use]
    pub fn render_form(destination: &str, params: &[(String, String)]) -> String {
        let inputs: String = params
            .iter()
            .map(|(name, value)| {
                format!(
                    r#"<input type="hidden" name="{}" value="{}"/>"#,
                    html_escape(name),
                    html_escape(value)
                )
            })
            .collect::<Vec<_>>()
            .join("\n        ");

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>SAML POST Binding</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{}">
        {}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
            html_escape(destination),
            inputs
        )
    }
}

/// Escapes HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
