//! SAML single logout messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    format_instant, instant_attr, issuer_element, issuer_of, required_id, NameId, Status,
    SubjectIdentifier, SAMLP_NS, SAML_NS, SAML_VERSION,
};
use crate::error::SamlResult;
use crate::xml::XmlElement;

/// A `samlp:LogoutRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoutRequest {
    /// Request ID.
    pub id: String,
    /// Issue instant.
    pub issue_instant: DateTime<Utc>,
    /// Destination URL.
    pub destination: Option<String>,
    /// Issuer entity ID.
    pub issuer: Option<String>,
    /// Expiry of the request.
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// Logout reason URI.
    pub reason: Option<String>,
    /// Principal being logged out.
    pub identifier: Option<SubjectIdentifier>,
    /// Session indexes to terminate.
    pub session_indexes: Vec<String>,
    /// Source element (empty for locally built requests).
    pub element: XmlElement,
}

impl LogoutRequest {
    /// Creates a new logout request for a principal.
    #[must_use]
    pub fn new(id: impl Into<String>, issuer: impl Into<String>, name_id: NameId) -> Self {
        Self {
            id: id.into(),
            issue_instant: Utc::now(),
            destination: None,
            issuer: Some(issuer.into()),
            not_on_or_after: None,
            reason: None,
            identifier: Some(SubjectIdentifier::NameId(name_id)),
            session_indexes: Vec::new(),
            element: XmlElement::default(),
        }
    }

    /// Sets the issue instant.
    #[must_use]
    pub fn with_issue_instant(mut self, instant: DateTime<Utc>) -> Self {
        self.issue_instant = instant;
        self
    }

    /// Sets the destination.
    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Sets the expiry.
    #[must_use]
    pub fn with_not_on_or_after(mut self, instant: DateTime<Utc>) -> Self {
        self.not_on_or_after = Some(instant);
        self
    }

    /// Adds a session index.
    #[must_use]
    pub fn with_session_index(mut self, index: impl Into<String>) -> Self {
        self.session_indexes.push(index.into());
        self
    }

    /// Returns the clear name identifier, if any.
    #[must_use]
    pub fn name_id(&self) -> Option<&NameId> {
        match &self.identifier {
            Some(SubjectIdentifier::NameId(name_id)) => Some(name_id),
            _ => None,
        }
    }

    /// Reads a `samlp:LogoutRequest` element.
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            id: required_id(element)?,
            issue_instant: instant_attr(element, "IssueInstant")?.unwrap_or_else(Utc::now),
            destination: element.attr("Destination").map(str::to_string),
            issuer: issuer_of(element),
            not_on_or_after: instant_attr(element, "NotOnOrAfter")?,
            reason: element.attr("Reason").map(str::to_string),
            identifier: SubjectIdentifier::from_parent(element),
            session_indexes: element
                .children_named(SAMLP_NS, "SessionIndex")
                .map(|s| s.text.trim().to_string())
                .collect(),
            element: element.clone(),
        })
    }

    /// Renders the request as a root element.
    #[must_use]
    pub fn to_element(&self) -> XmlElement {
        let mut element = XmlElement::new("samlp", "LogoutRequest", SAMLP_NS)
            .with_namespace("samlp", SAMLP_NS)
            .with_namespace("saml", SAML_NS)
            .with_attr("ID", self.id.as_str())
            .with_attr("Version", SAML_VERSION)
            .with_attr("IssueInstant", format_instant(&self.issue_instant));
        if let Some(destination) = &self.destination {
            element.set_attr("Destination", destination.as_str());
        }
        if let Some(not_on_or_after) = &self.not_on_or_after {
            element.set_attr("NotOnOrAfter", format_instant(not_on_or_after));
        }
        if let Some(reason) = &self.reason {
            element.set_attr("Reason", reason.as_str());
        }
        if let Some(issuer) = &self.issuer {
            element = element.with_child(issuer_element(issuer));
        }
        if let Some(name_id) = self.name_id() {
            element = element.with_child(name_id.to_element());
        }
        for index in &self.session_indexes {
            element = element
                .with_child(XmlElement::new("samlp", "SessionIndex", SAMLP_NS).with_text(index.as_str()));
        }
        element
    }
}

/// A `samlp:LogoutResponse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoutResponse {
    /// Response ID.
    pub id: String,
    /// ID of the logout request this response answers.
    pub in_response_to: Option<String>,
    /// Issue instant.
    pub issue_instant: DateTime<Utc>,
    /// Destination URL.
    pub destination: Option<String>,
    /// Issuer entity ID.
    pub issuer: Option<String>,
    /// Response status.
    pub status: Status,
    /// Source element (empty for locally built responses).
    pub element: XmlElement,
}

impl LogoutResponse {
    /// Creates a successful logout response.
    #[must_use]
    pub fn success(id: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            in_response_to: None,
            issue_instant: Utc::now(),
            destination: None,
            issuer: Some(issuer.into()),
            status: Status::success(),
            element: XmlElement::default(),
        }
    }

    /// Sets the request this response answers.
    #[must_use]
    pub fn with_in_response_to(mut self, id: impl Into<String>) -> Self {
        self.in_response_to = Some(id.into());
        self
    }

    /// Sets the destination.
    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Reads a `samlp:LogoutResponse` element.
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            id: required_id(element)?,
            in_response_to: element.attr("InResponseTo").map(str::to_string),
            issue_instant: instant_attr(element, "IssueInstant")?.unwrap_or_else(Utc::now),
            destination: element.attr("Destination").map(str::to_string),
            issuer: issuer_of(element),
            status: element
                .child(SAMLP_NS, "Status")
                .map(Status::from_element)
                .unwrap_or_else(Status::success),
            element: element.clone(),
        })
    }

    /// Renders the response as a root element.
    #[must_use]
    pub fn to_element(&self) -> XmlElement {
        let mut element = XmlElement::new("samlp", "LogoutResponse", SAMLP_NS)
            .with_namespace("samlp", SAMLP_NS)
            .with_namespace("saml", SAML_NS)
            .with_attr("ID", self.id.as_str())
            .with_attr("Version", SAML_VERSION)
            .with_attr("IssueInstant", format_instant(&self.issue_instant));
        if let Some(in_response_to) = &self.in_response_to {
            element.set_attr("InResponseTo", in_response_to.as_str());
        }
        if let Some(destination) = &self.destination {
            element.set_attr("Destination", destination.as_str());
        }
        if let Some(issuer) = &self.issuer {
            element = element.with_child(issuer_element(issuer));
        }
        element.with_child(self.status.to_element())
    }
}
