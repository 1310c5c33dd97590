//! SAML protocol status.

use serde::{Deserialize, Serialize};

use super::{SAMLP_NS, STATUS_SUCCESS};
use crate::xml::XmlElement;

/// A `samlp:Status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Top-level status code URI.
    pub code: String,
    /// Second-level status code URI.
    pub sub_code: Option<String>,
    /// Human readable message.
    pub message: Option<String>,
}

impl Status {
    /// Success status.
    #[must_use]
    pub fn success() -> Self {
        Self {
            code: STATUS_SUCCESS.to_string(),
            sub_code: None,
            message: None,
        }
    }

    /// Returns `true` for the top-level success code.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == STATUS_SUCCESS
    }

    /// Reads a `samlp:Status` element.
    #[must_use]
    pub fn from_element(element: &XmlElement) -> Self {
        let code = element.child(SAMLP_NS, "StatusCode");
        Self {
            code: code
                .and_then(|c| c.attr("Value"))
                .unwrap_or_default()
                .to_string(),
            sub_code: code
                .and_then(|c| c.child(SAMLP_NS, "StatusCode"))
                .and_then(|c| c.attr("Value"))
                .map(str::to_string),
            message: element
                .child_text(SAMLP_NS, "StatusMessage")
                .map(str::to_string),
        }
    }

    /// Renders a `samlp:Status` element.
    #[must_use]
    pub fn to_element(&self) -> XmlElement {
        let mut code =
            XmlElement::new("samlp", "StatusCode", SAMLP_NS).with_attr("Value", self.code.as_str());
        if let Some(sub) = &self.sub_code {
            code = code.with_child(
                XmlElement::new("samlp", "StatusCode", SAMLP_NS).with_attr("Value", sub.as_str()),
            );
        }
        let mut status = XmlElement::new("samlp", "Status", SAMLP_NS).with_child(code);
        if let Some(message) = &self.message {
            status = status.with_child(
                XmlElement::new("samlp", "StatusMessage", SAMLP_NS).with_text(message.as_str()),
            );
        }
        status
    }
}
