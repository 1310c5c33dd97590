//! Encrypted SAML elements (`EncryptedAssertion`, `EncryptedID`, `EncryptedAttribute`).

use serde::{Deserialize, Serialize};

use super::XMLENC_NS;
use crate::xml::XmlElement;

/// An encrypted element wrapper.
///
/// The wrapper holds an `xenc:EncryptedData` child and optionally the
/// `xenc:EncryptedKey` elements carrying the wrapped content key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedElement {
    /// The wrapper element.
    pub element: XmlElement,
}

impl EncryptedElement {
    /// Wraps an encrypted element.
    #[must_use]
    pub fn new(element: XmlElement) -> Self {
        Self { element }
    }

    /// Returns the `xenc:EncryptedData` child.
    #[must_use]
    pub fn encrypted_data(&self) -> Option<&XmlElement> {
        self.element.child(XMLENC_NS, "EncryptedData")
    }

    /// Returns the `xenc:EncryptedKey` elements that are siblings of the
    /// encrypted data.
    pub fn encrypted_keys(&self) -> impl Iterator<Item = &XmlElement> {
        self.element.children_named(XMLENC_NS, "EncryptedKey")
    }
}
