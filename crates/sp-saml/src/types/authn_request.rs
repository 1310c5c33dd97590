//! SAML authentication requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    format_instant, instant_attr, issuer_element, issuer_of, required_id, SamlBinding,
    NAMEID_FORMAT_TRANSIENT, SAMLP_NS, SAML_NS, SAML_VERSION,
};
use crate::error::SamlResult;
use crate::xml::XmlElement;

/// A `samlp:AuthnRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthnRequest {
    /// Request ID.
    pub id: String,
    /// Issue instant.
    pub issue_instant: DateTime<Utc>,
    /// IdP SSO endpoint the request is sent to.
    pub destination: Option<String>,
    /// SP entity ID.
    pub issuer: String,
    /// Force re-authentication at the IdP.
    pub force_authn: bool,
    /// Passive authentication.
    pub is_passive: bool,
    /// Binding the IdP must use for the response.
    pub protocol_binding: SamlBinding,
    /// SP endpoint receiving the response.
    pub assertion_consumer_service_url: Option<String>,
    /// Attribute consuming service index.
    pub attribute_consuming_service_index: Option<u16>,
    /// Requested name ID policy.
    pub name_id_policy: NameIdPolicy,
    /// Start of the request validity window.
    pub not_before: Option<DateTime<Utc>>,
    /// End of the request validity window.
    pub not_on_or_after: Option<DateTime<Utc>>,
}

/// A `samlp:NameIDPolicy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameIdPolicy {
    /// Requested format URI.
    pub format: Option<String>,
    /// Whether the IdP may create a new identifier.
    pub allow_create: bool,
}

impl Default for NameIdPolicy {
    fn default() -> Self {
        Self {
            format: Some(NAMEID_FORMAT_TRANSIENT.to_string()),
            allow_create: false,
        }
    }
}

impl AuthnRequest {
    /// Creates a request with default settings.
    #[must_use]
    pub fn new(id: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            issue_instant: Utc::now(),
            destination: None,
            issuer: issuer.into(),
            force_authn: true,
            is_passive: false,
            protocol_binding: SamlBinding::HttpPost,
            assertion_consumer_service_url: None,
            attribute_consuming_service_index: None,
            name_id_policy: NameIdPolicy::default(),
            not_before: None,
            not_on_or_after: None,
        }
    }

    /// Renders the request as a root element.
    #[must_use]
    pub fn to_element(&self) -> XmlElement {
        let mut element = XmlElement::new("samlp", "AuthnRequest", SAMLP_NS)
            .with_namespace("samlp", SAMLP_NS)
            .with_namespace("saml", SAML_NS)
            .with_attr("ID", self.id.as_str())
            .with_attr("Version", SAML_VERSION)
            .with_attr("IssueInstant", format_instant(&self.issue_instant))
            .with_attr("ForceAuthn", self.force_authn.to_string())
            .with_attr("IsPassive", self.is_passive.to_string())
            .with_attr("ProtocolBinding", self.protocol_binding.uri());
        if let Some(destination) = &self.destination {
            element.set_attr("Destination", destination.as_str());
        }
        if let Some(acs) = &self.assertion_consumer_service_url {
            element.set_attr("AssertionConsumerServiceURL", acs.as_str());
        }
        if let Some(index) = self.attribute_consuming_service_index {
            element.set_attr("AttributeConsumingServiceIndex", index.to_string());
        }

        let mut policy = XmlElement::new("samlp", "NameIDPolicy", SAMLP_NS)
            .with_attr("AllowCreate", self.name_id_policy.allow_create.to_string());
        if let Some(format) = &self.name_id_policy.format {
            policy.set_attr("Format", format.as_str());
        }

        element = element
            .with_child(issuer_element(&self.issuer))
            .with_child(policy);

        if self.not_before.is_some() || self.not_on_or_after.is_some() {
            let mut conditions = XmlElement::new("saml", "Conditions", SAML_NS);
            if let Some(not_before) = &self.not_before {
                conditions.set_attr("NotBefore", format_instant(not_before));
            }
            if let Some(not_on_or_after) = &self.not_on_or_after {
                conditions.set_attr("NotOnOrAfter", format_instant(not_on_or_after));
            }
            element = element.with_child(conditions);
        }
        element
    }

    /// Reads a `samlp:AuthnRequest` element.
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        let policy = element.child(SAMLP_NS, "NameIDPolicy");
        let conditions = element.child(SAML_NS, "Conditions");
        Ok(Self {
            id: required_id(element)?,
            issue_instant: instant_attr(element, "IssueInstant")?.unwrap_or_else(Utc::now),
            destination: element.attr("Destination").map(str::to_string),
            issuer: issuer_of(element).unwrap_or_default(),
            force_authn: element.attr("ForceAuthn") == Some("true"),
            is_passive: element.attr("IsPassive") == Some("true"),
            protocol_binding: element
                .attr("ProtocolBinding")
                .and_then(SamlBinding::from_uri)
                .unwrap_or(SamlBinding::HttpPost),
            assertion_consumer_service_url: element
                .attr("AssertionConsumerServiceURL")
                .map(str::to_string),
            attribute_consuming_service_index: element
                .attr("AttributeConsumingServiceIndex")
                .and_then(|i| i.parse().ok()),
            name_id_policy: NameIdPolicy {
                format: policy.and_then(|p| p.attr("Format")).map(str::to_string),
                allow_create: policy.and_then(|p| p.attr("AllowCreate")) == Some("true"),
            },
            not_before: conditions
                .map(|c| instant_attr(c, "NotBefore"))
                .transpose()?
                .flatten(),
            not_on_or_after: conditions
                .map(|c| instant_attr(c, "NotOnOrAfter"))
                .transpose()?
                .flatten(),
        })
    }
}
