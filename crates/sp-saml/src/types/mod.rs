//! SAML 2.0 types and data structures.
//!
//! Inbound types are parsed from an [`XmlElement`] and keep that element so
//! that signature checks run against exactly the content the typed fields
//! were read from. Outbound types render themselves with `to_element`.

mod assertion;
mod authn_request;
mod constants;
mod encrypted;
mod logout;
mod name_id;
mod response;
mod status;

pub use assertion::*;
pub use authn_request::*;
pub use constants::*;
pub use encrypted::*;
pub use logout::*;
pub use name_id::*;
pub use response::*;
pub use status::*;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{SamlError, SamlResult};
use crate::xml::XmlElement;

/// Formats an instant as an `xs:dateTime` in UTC.
#[must_use]
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an `xs:dateTime`, normalizing any offset to UTC.
pub fn parse_instant(value: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SamlError::XmlParse(format!("invalid dateTime '{value}': {e}")))
}

pub(crate) fn instant_attr(element: &XmlElement, name: &str) -> SamlResult<Option<DateTime<Utc>>> {
    element.attr(name).map(parse_instant).transpose()
}

pub(crate) fn required_id(element: &XmlElement) -> SamlResult<String> {
    element
        .attr("ID")
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SamlError::XmlParse(format!("{} without ID", element.name)))
}

pub(crate) fn issuer_of(element: &XmlElement) -> Option<String> {
    element
        .child_text(SAML_NS, "Issuer")
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn issuer_element(entity_id: &str) -> XmlElement {
    XmlElement::new("saml", "Issuer", SAML_NS).with_text(entity_id)
}
