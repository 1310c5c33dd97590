//! SAML assertions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{instant_attr, issuer_of, required_id, EncryptedElement, NameId, SAML_NS};
use crate::error::SamlResult;
use crate::xml::XmlElement;

/// A `saml:Assertion`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    /// Assertion ID.
    pub id: String,
    /// Issue instant.
    pub issue_instant: Option<DateTime<Utc>>,
    /// Issuer entity ID.
    pub issuer: Option<String>,
    /// Subject of the assertion.
    pub subject: Option<Subject>,
    /// Validity conditions.
    pub conditions: Option<Conditions>,
    /// Authentication statements.
    pub authn_statements: Vec<AuthnStatement>,
    /// Attribute statements.
    pub attribute_statements: Vec<AttributeStatement>,
    /// Source element.
    pub element: XmlElement,
}

impl Assertion {
    /// Reads a `saml:Assertion` element.
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            id: required_id(element)?,
            issue_instant: instant_attr(element, "IssueInstant")?,
            issuer: issuer_of(element),
            subject: element
                .child(SAML_NS, "Subject")
                .map(Subject::from_element)
                .transpose()?,
            conditions: element
                .child(SAML_NS, "Conditions")
                .map(Conditions::from_element)
                .transpose()?,
            authn_statements: element
                .children_named(SAML_NS, "AuthnStatement")
                .map(AuthnStatement::from_element)
                .collect::<SamlResult<_>>()?,
            attribute_statements: element
                .children_named(SAML_NS, "AttributeStatement")
                .map(AttributeStatement::from_element)
                .collect(),
            element: element.clone(),
        })
    }
}

/// The identifier of a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectIdentifier {
    /// A clear `saml:NameID`.
    NameId(NameId),
    /// A `saml:EncryptedID`.
    Encrypted(EncryptedElement),
    /// Any other identifier kind (e.g. `saml:BaseID`), by local name.
    Other(String),
}

impl SubjectIdentifier {
    /// Reads the identifier child of a `Subject` or `LogoutRequest`, if any.
    #[must_use]
    pub fn from_parent(parent: &XmlElement) -> Option<Self> {
        parent.children.iter().find_map(|child| {
            if child.is(SAML_NS, "NameID") {
                Some(Self::NameId(NameId::from_element(child)))
            } else if child.is(SAML_NS, "EncryptedID") {
                Some(Self::Encrypted(EncryptedElement::new(child.clone())))
            } else if child.is(SAML_NS, "BaseID") {
                Some(Self::Other(child.name.clone()))
            } else {
                None
            }
        })
    }
}

/// A `saml:Subject`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    /// Subject identifier.
    pub identifier: Option<SubjectIdentifier>,
    /// Subject confirmations.
    pub confirmations: Vec<SubjectConfirmation>,
}

impl Subject {
    fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            identifier: SubjectIdentifier::from_parent(element),
            confirmations: element
                .children_named(SAML_NS, "SubjectConfirmation")
                .map(SubjectConfirmation::from_element)
                .collect::<SamlResult<_>>()?,
        })
    }
}

/// A `saml:SubjectConfirmation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectConfirmation {
    /// Confirmation method URI.
    pub method: String,
    /// Confirmation data.
    pub data: Option<SubjectConfirmationData>,
}

impl SubjectConfirmation {
    fn from_element(element: &XmlElement) -> SamlResult<Self> {
        let data = match element.child(SAML_NS, "SubjectConfirmationData") {
            Some(data) => Some(SubjectConfirmationData {
                not_before: instant_attr(data, "NotBefore")?,
                not_on_or_after: instant_attr(data, "NotOnOrAfter")?,
                recipient: data.attr("Recipient").map(str::to_string),
                in_response_to: data.attr("InResponseTo").map(str::to_string),
                address: data.attr("Address").map(str::to_string),
            }),
            None => None,
        };
        Ok(Self {
            method: element.attr("Method").unwrap_or_default().to_string(),
            data,
        })
    }
}

/// A `saml:SubjectConfirmationData`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmationData {
    /// Not before.
    pub not_before: Option<DateTime<Utc>>,
    /// Not on or after.
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// Recipient URL.
    pub recipient: Option<String>,
    /// Request ID this confirmation answers.
    pub in_response_to: Option<String>,
    /// Client address.
    pub address: Option<String>,
}

/// A `saml:Conditions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    /// Not before.
    pub not_before: Option<DateTime<Utc>>,
    /// Not on or after.
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// Audiences of all audience restrictions.
    pub audiences: Vec<String>,
}

impl Conditions {
    fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            not_before: instant_attr(element, "NotBefore")?,
            not_on_or_after: instant_attr(element, "NotOnOrAfter")?,
            audiences: element
                .children_named(SAML_NS, "AudienceRestriction")
                .flat_map(|r| r.children_named(SAML_NS, "Audience"))
                .map(|a| a.text.trim().to_string())
                .collect(),
        })
    }
}

/// A `saml:AuthnStatement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnStatement {
    /// Authentication instant.
    pub authn_instant: Option<DateTime<Utc>>,
    /// IdP session index.
    pub session_index: Option<String>,
    /// End of the IdP session.
    pub session_not_on_or_after: Option<DateTime<Utc>>,
    /// Authentication context class.
    pub authn_context_class_ref: Option<String>,
}

impl AuthnStatement {
    fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            authn_instant: instant_attr(element, "AuthnInstant")?,
            session_index: element.attr("SessionIndex").map(str::to_string),
            session_not_on_or_after: instant_attr(element, "SessionNotOnOrAfter")?,
            authn_context_class_ref: element
                .child(SAML_NS, "AuthnContext")
                .and_then(|c| c.child_text(SAML_NS, "AuthnContextClassRef"))
                .map(str::to_string),
        })
    }
}

/// A `saml:AttributeStatement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeStatement {
    /// Clear attributes.
    pub attributes: Vec<Attribute>,
    /// Encrypted attributes.
    pub encrypted_attributes: Vec<EncryptedElement>,
}

impl AttributeStatement {
    fn from_element(element: &XmlElement) -> Self {
        Self {
            attributes: element
                .children_named(SAML_NS, "Attribute")
                .map(Attribute::from_element)
                .collect(),
            encrypted_attributes: element
                .children_named(SAML_NS, "EncryptedAttribute")
                .cloned()
                .map(EncryptedElement::new)
                .collect(),
        }
    }
}

/// A `saml:Attribute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Name format URI.
    pub name_format: Option<String>,
    /// Friendly name.
    pub friendly_name: Option<String>,
    /// Text of each `AttributeValue`, in order.
    pub values: Vec<String>,
}

impl Attribute {
    /// Reads a `saml:Attribute` element.
    #[must_use]
    pub fn from_element(element: &XmlElement) -> Self {
        Self {
            name: element.attr("Name").unwrap_or_default().to_string(),
            name_format: element.attr("NameFormat").map(str::to_string),
            friendly_name: element.attr("FriendlyName").map(str::to_string),
            values: element
                .children_named(SAML_NS, "AttributeValue")
                .map(|v| v.text.trim().to_string())
                .collect(),
        }
    }
}
