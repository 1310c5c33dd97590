//! Wire-level message envelopes.

use std::sync::OnceLock;

use crate::bindings::{HttpPostBinding, HttpRedirectBinding, SamlMessageType};
use crate::error::{SamlError, SamlResult};
use crate::query::Query;
use crate::types::SamlBinding;

/// A SAML message ready to be sent to an IdP.
///
/// The binding specific renderings are computed on first use and cached.
#[derive(Debug)]
pub struct OutgoingMessage {
    binding: SamlBinding,
    message_type: SamlMessageType,
    endpoint_url: String,
    message: String,
    encoded: String,
    relay_state: Option<String>,
    query: Query,
    redirect_url: OnceLock<String>,
    post_params: OnceLock<Vec<(String, String)>>,
    html_form: OnceLock<String>,
}

impl OutgoingMessage {
    /// Encodes `message` for `binding`.
    ///
    /// Fails with a building error when the message is empty.
    pub fn new(
        binding: SamlBinding,
        message_type: SamlMessageType,
        endpoint_url: impl Into<String>,
        message: String,
        relay_state: Option<String>,
        query: Query,
    ) -> SamlResult<Self> {
        let encoded = match binding {
            SamlBinding::HttpPost => HttpPostBinding::encode_message(&message)?,
            SamlBinding::HttpRedirect => HttpRedirectBinding::encode_message(&message)?,
        };
        Ok(Self {
            binding,
            message_type,
            endpoint_url: endpoint_url.into(),
            message,
            encoded,
            relay_state: relay_state.filter(|rs| !rs.is_empty()),
            query,
            redirect_url: OnceLock::new(),
            post_params: OnceLock::new(),
            html_form: OnceLock::new(),
        })
    }

    /// Transport binding.
    #[must_use]
    pub const fn binding(&self) -> SamlBinding {
        self.binding
    }

    /// Request or response.
    #[must_use]
    pub const fn message_type(&self) -> SamlMessageType {
        self.message_type
    }

    /// Destination endpoint.
    #[must_use]
    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// Plain XML message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Binding encoded message (deflated for Redirect).
    #[must_use]
    pub fn encoded_message(&self) -> &str {
        &self.encoded
    }

    /// Relay state, if any.
    #[must_use]
    pub fn relay_state(&self) -> Option<&str> {
        self.relay_state.as_deref()
    }

    /// The query this message carries.
    #[must_use]
    pub const fn query(&self) -> &Query {
        &self.query
    }

    /// Redirect URL of an HTTP-Redirect message.
    pub fn redirect_url(&self) -> SamlResult<&str> {
        if self.binding != SamlBinding::HttpRedirect {
            return Err(SamlError::Building(
                "redirect URL requested for a message using the POST binding".to_string(),
            ));
        }
        if let Some(url) = self.redirect_url.get() {
            return Ok(url);
        }
        let url = HttpRedirectBinding::build_url(
            &self.endpoint_url,
            self.message_type,
            &self.encoded,
            self.relay_state.as_deref().unwrap_or_default(),
        )?;
        Ok(self.redirect_url.get_or_init(|| url))
    }

    /// Form parameters of an HTTP-POST message: `RelayState` when present,
    /// then the message.
    pub fn post_params(&self) -> SamlResult<&[(String, String)]> {
        if self.binding != SamlBinding::HttpPost {
            return Err(SamlError::Building(
                "POST parameters requested for a message using the Redirect binding".to_string(),
            ));
        }
        Ok(self.post_params.get_or_init(|| {
            HttpPostBinding::form_params(
                self.message_type,
                &self.encoded,
                self.relay_state.as_deref().unwrap_or_default(),
            )
        }))
    }

    /// Auto-submitting HTML form of an HTTP-POST message.
    pub fn html_form(&self) -> SamlResult<&str> {
        if let Some(form) = self.html_form.get() {
            return Ok(form);
        }
        let form = HttpPostBinding::render_form(&self.endpoint_url, self.post_params()?);
        Ok(self.html_form.get_or_init(|| form))
    }
}

/// A validated SAML message received from an IdP.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Transport binding.
    pub binding: SamlBinding,
    /// Endpoint the message was received on, without session suffix.
    pub endpoint_url: String,
    /// Plain XML message.
    pub message: String,
    /// Relay state, if any.
    pub relay_state: Option<String>,
    /// The validated query.
    pub query: Query,
}
