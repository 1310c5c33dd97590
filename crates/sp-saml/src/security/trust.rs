//! Signature trust evaluation.

use crate::signature::{SignatureTrust, SignatureTrustEngine};
use crate::xml::XmlElement;

/// Evaluates the signature of `element` as issued by `issuer`.
///
/// Returns [`SignatureTrust::Absent`] when no signature is present so that
/// callers can decide whether another signed object covers the content.
#[must_use]
pub fn validate_signature_trust(
    element: &XmlElement,
    issuer: Option<&str>,
    engine: &dyn SignatureTrustEngine,
) -> SignatureTrust {
    let trust = engine.evaluate(element, issuer);
    tracing::debug!(
        element = %element.name,
        id = element.attr("ID").unwrap_or_default(),
        trust = ?trust,
        "Evaluated signature trust"
    );
    trust
}
