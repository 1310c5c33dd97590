//! SAML authentication responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    instant_attr, issuer_of, required_id, Assertion, EncryptedElement, Status, SAMLP_NS, SAML_NS,
};
use crate::error::SamlResult;
use crate::xml::XmlElement;

/// A `samlp:Response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Response ID.
    pub id: String,
    /// ID of the request this response answers.
    pub in_response_to: Option<String>,
    /// Issue instant.
    pub issue_instant: Option<DateTime<Utc>>,
    /// Destination URL.
    pub destination: Option<String>,
    /// Issuer entity ID.
    pub issuer: Option<String>,
    /// Response status.
    pub status: Option<Status>,
    /// Clear assertions.
    pub assertions: Vec<Assertion>,
    /// Encrypted assertions.
    pub encrypted_assertions: Vec<EncryptedElement>,
    /// Source element.
    pub element: XmlElement,
}

impl Response {
    /// Reads a `samlp:Response` element.
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            id: required_id(element)?,
            in_response_to: element.attr("InResponseTo").map(str::to_string),
            issue_instant: instant_attr(element, "IssueInstant")?,
            destination: element.attr("Destination").map(str::to_string),
            issuer: issuer_of(element),
            status: element.child(SAMLP_NS, "Status").map(Status::from_element),
            assertions: element
                .children_named(SAML_NS, "Assertion")
                .map(Assertion::from_element)
                .collect::<SamlResult<_>>()?,
            encrypted_assertions: element
                .children_named(SAML_NS, "EncryptedAssertion")
                .cloned()
                .map(EncryptedElement::new)
                .collect(),
            element: element.clone(),
        })
    }
}
