//! SAML name identifiers.

use serde::{Deserialize, Serialize};

use super::SAML_NS;
use crate::xml::XmlElement;

/// A `saml:NameID`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    /// Identifier value.
    pub value: String,
    /// Format URI.
    pub format: Option<String>,
    /// Qualifier naming the IdP.
    pub name_qualifier: Option<String>,
    /// Qualifier naming the SP.
    pub sp_name_qualifier: Option<String>,
}

impl NameId {
    /// Creates a name identifier without format or qualifiers.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            format: None,
            name_qualifier: None,
            sp_name_qualifier: None,
        }
    }

    /// Sets the format URI.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Reads a `saml:NameID` element.
    #[must_use]
    pub fn from_element(element: &XmlElement) -> Self {
        Self {
            value: element.text.trim().to_string(),
            format: element.attr("Format").map(str::to_string),
            name_qualifier: element.attr("NameQualifier").map(str::to_string),
            sp_name_qualifier: element.attr("SPNameQualifier").map(str::to_string),
        }
    }

    /// Renders a `saml:NameID` element.
    #[must_use]
    pub fn to_element(&self) -> XmlElement {
        let mut element = XmlElement::new("saml", "NameID", SAML_NS);
        if let Some(format) = &self.format {
            element.set_attr("Format", format.as_str());
        }
        if let Some(q) = &self.name_qualifier {
            element.set_attr("NameQualifier", q.as_str());
        }
        if let Some(q) = &self.sp_name_qualifier {
            element.set_attr("SPNameQualifier", q.as_str());
        }
        element.with_text(self.value.as_str())
    }
}
