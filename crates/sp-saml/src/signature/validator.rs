//! XML Signature validation against configured IdP certificates.

use base64::Engine;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::{SamlError, SamlResult};
use crate::types::XMLDSIG_NS;
use crate::xml::XmlElement;

use super::{
    signed_content, DigestAlgorithm, SignatureAlgorithm, SignatureTrust, SignatureTrustEngine,
    ENVELOPED_SIGNATURE, EXC_C14N,
};


/// Signature trust engine for a single identity provider.
///
/// Trust anchors are the RSA keys of the certificates published for the
/// IdP. Embedded `KeyInfo` certificates are never trusted on their own.
#[derive(Debug, Clone)]
pub struct X509TrustEngine {
    entity_id: String,
    /// DER `RSAPublicKey` of each trusted certificate.
    public_keys: Vec<Vec<u8>>,
    allow_sha1: bool,
}

impl X509TrustEngine {
    /// Creates an engine from DER certificates.
    pub fn from_der_certificates(
        entity_id: impl Into<String>,
        certificates: &[Vec<u8>],
    ) -> SamlResult<Self> {
        let public_keys = certificates
            .iter()
            .map(|der| extract_public_key(der))
            .collect::<SamlResult<Vec<_>>>()?;
        Ok(Self {
            entity_id: entity_id.into(),
            public_keys,
            allow_sha1: false,
        })
    }

    /// Creates an engine from PEM certificates.
    pub fn from_pem_certificates(entity_id: impl Into<String>, pems: &[String]) -> SamlResult<Self> {
        let ders = pems
            .iter()
            .map(|pem| sp_crypto::pem::pem_to_der(pem, "CERTIFICATE").map_err(SamlError::from))
            .collect::<SamlResult<Vec<_>>>()?;
        Self::from_der_certificates(entity_id, &ders)
    }

    /// Accepts legacy `rsa-sha1` signatures and `sha1` digests.
    #[must_use]
    pub fn allow_sha1(mut self, allow: bool) -> Self {
        self.allow_sha1 = allow;
        self
    }

    /// Returns the entity ID this engine is scoped to.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn verify(&self, element: &XmlElement, signature: &XmlElement) -> Result<(), String> {
        let id = element
            .attr("ID")
            .filter(|id| !id.is_empty())
            .ok_or("signed element has no ID")?;

        let signed_info = signature
            .child(XMLDSIG_NS, "SignedInfo")
            .ok_or("missing SignedInfo")?;

        let c14n_method = signed_info
            .child(XMLDSIG_NS, "CanonicalizationMethod")
            .ok_or("missing CanonicalizationMethod")?;
        if c14n_method.attr("Algorithm") != Some(EXC_C14N) {
            return Err(format!(
                "unsupported canonicalization {:?}",
                c14n_method.attr("Algorithm").unwrap_or_default()
            ));
        }

        let method = signed_info
            .child(XMLDSIG_NS, "SignatureMethod")
            .and_then(|m| m.attr("Algorithm"))
            .ok_or("missing SignatureMethod")?;
        let algorithm = SignatureAlgorithm::from_uri(method)
            .ok_or_else(|| format!("unsupported signature algorithm {method}"))?;
        if algorithm == SignatureAlgorithm::Sha1 && !self.allow_sha1 {
            return Err("rsa-sha1 signatures are not accepted".to_string());
        }

        let mut references = signed_info.children_named(XMLDSIG_NS, "Reference");
        let reference = references.next().ok_or("missing Reference")?;
        if references.next().is_some() {
            return Err("exactly one Reference is allowed".to_string());
        }

        let expected_uri = format!("#{id}");
        if reference.attr("URI") != Some(expected_uri.as_str()) {
            return Err(format!(
                "Reference URI {:?} does not point at the signed element {expected_uri}",
                reference.attr("URI").unwrap_or_default()
            ));
        }

        let mut inclusive_prefixes = Vec::new();
        if let Some(transforms) = reference.child(XMLDSIG_NS, "Transforms") {
            for transform in transforms.children_named(XMLDSIG_NS, "Transform") {
                match transform.attr("Algorithm") {
                    Some(ENVELOPED_SIGNATURE) => {}
                    Some(EXC_C14N) => inclusive_prefixes = prefix_list(transform),
                    other => return Err(format!("unsupported transform {other:?}")),
                }
            }
        }

        let digest_uri = reference
            .child(XMLDSIG_NS, "DigestMethod")
            .and_then(|m| m.attr("Algorithm"))
            .ok_or("missing DigestMethod")?;
        let digest = DigestAlgorithm::from_uri(digest_uri)
            .ok_or_else(|| format!("unsupported digest algorithm {digest_uri}"))?;
        if digest == DigestAlgorithm::Sha1 && !self.allow_sha1 {
            return Err("sha1 digests are not accepted".to_string());
        }

        let expected = decode_b64(
            reference
                .child_text(XMLDSIG_NS, "DigestValue")
                .ok_or("missing DigestValue")?,
        )?;
        let content = signed_content(element, &inclusive_prefixes).map_err(|e| e.to_string())?;
        let actual = digest.digest(content.as_bytes());
        if actual != expected {
            return Err("digest mismatch, the signed content was modified".to_string());
        }

        let signature_value = decode_b64(
            signature
                .child_text(XMLDSIG_NS, "SignatureValue")
                .ok_or("missing SignatureValue")?,
        )?;
        let signed_bytes = signed_info
            .canonicalize_with_prefixes(&prefix_list(c14n_method))
            .map_err(|e| e.to_string())?;

        for key in &self.public_keys {
            if sp_crypto::rsa_verify(key, signed_bytes.as_bytes(), &signature_value, algorithm)
                .unwrap_or(false)
            {
                return Ok(());
            }
        }
        Err("signature does not match any trusted credential".to_string())
    }
}

impl SignatureTrustEngine for X509TrustEngine {
    fn evaluate(&self, element: &XmlElement, issuer: Option<&str>) -> SignatureTrust {
        let mut signatures = element.children_named(XMLDSIG_NS, "Signature");
        let Some(signature) = signatures.next() else {
            return SignatureTrust::Absent;
        };
        if signatures.next().is_some() {
            return SignatureTrust::Invalid("more than one Signature element".to_string());
        }

        if let Some(issuer) = issuer {
            if issuer != self.entity_id {
                return SignatureTrust::Invalid(format!(
                    "issuer {issuer} is not {}",
                    self.entity_id
                ));
            }
        }

        match self.verify(element, signature) {
            Ok(()) => SignatureTrust::Trusted,
            Err(reason) => {
                tracing::debug!("Signature on {} rejected: {}", element.name, reason);
                SignatureTrust::Invalid(reason)
            }
        }
    }
}

/// Returns the `PrefixList` of an `InclusiveNamespaces` parameter.
fn prefix_list(method: &XmlElement) -> Vec<String> {
    method
        .child(EXC_C14N, "InclusiveNamespaces")
        .and_then(|inclusive| inclusive.attr("PrefixList"))
        .map(|list| list.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn decode_b64(value: &str) -> Result<Vec<u8>, String> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| format!("invalid base64: {e}"))
}

/// Extracts the RSA public key from a DER certificate.
fn extract_public_key(cert_der: &[u8]) -> SamlResult<Vec<u8>> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| SamlError::Config(format!("Invalid certificate: {e}")))?;
    Ok(cert.public_key().subject_public_key.data.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::XmlSigner;
    use crate::types::SAML_NS;

    const IDP: &str = "https://idp.example.org";

    fn engine() -> X509TrustEngine {
        X509TrustEngine::from_pem_certificates(
            IDP,
            &[include_str!("../../../../tests/fixtures/idp-cert.pem").to_string()],
        )
        .unwrap()
    }

    fn idp_signer() -> XmlSigner {
        XmlSigner::from_pem(include_str!("../../../../tests/fixtures/idp-key.pem"), None).unwrap()
    }

    fn rogue_signer() -> XmlSigner {
        XmlSigner::from_pem(include_str!("../../../../tests/fixtures/rogue-key.pem"), None).unwrap()
    }

    fn signed_assertion() -> XmlElement {
        let mut element = XmlElement::parse(
            r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_a1"><saml:Issuer>https://idp.example.org</saml:Issuer><saml:Subject><saml:NameID>alice</saml:NameID></saml:Subject></saml:Assertion>"#,
        )
        .unwrap();
        idp_signer().sign(&mut element).unwrap();
        element
    }

    #[test]
    fn trusted_signature() {
        assert_eq!(engine().evaluate(&signed_assertion(), Some(IDP)), SignatureTrust::Trusted);
    }

    #[test]
    fn survives_serialization_roundtrip() {
        let xml = signed_assertion().to_xml();
        let parsed = XmlElement::parse(&xml).unwrap();
        assert!(engine().evaluate(&parsed, Some(IDP)).is_trusted());
    }

    #[test]
    fn unsigned_is_absent() {
        let element = XmlElement::parse("<saml:Assertion ID=\"_a\"/>").unwrap();
        assert_eq!(engine().evaluate(&element, Some(IDP)), SignatureTrust::Absent);
    }

    #[test]
    fn tampered_content_is_invalid() {
        let mut element = signed_assertion();
        let subject = element
            .children
            .iter_mut()
            .find(|c| c.is(SAML_NS, "Subject"))
            .unwrap();
        subject.children[0].text = "mallory".to_string();

        assert!(matches!(
            engine().evaluate(&element, Some(IDP)),
            SignatureTrust::Invalid(reason) if reason.contains("digest")
        ));
    }

    #[test]
    fn untrusted_key_is_invalid() {
        let mut element = signed_assertion();
        rogue_signer().sign(&mut element).unwrap();
        assert!(matches!(
            engine().evaluate(&element, Some(IDP)),
            SignatureTrust::Invalid(_)
        ));
    }

    #[test]
    fn other_issuer_is_invalid() {
        assert!(matches!(
            engine().evaluate(&signed_assertion(), Some("https://evil.example.org")),
            SignatureTrust::Invalid(_)
        ));
    }

    #[test]
    fn moved_signature_does_not_verify() {
        // The signature of _a1 copied onto another element whose ID differs.
        let signed = signed_assertion();
        let signature = signed.child(XMLDSIG_NS, "Signature").unwrap().clone();
        let mut forged = signed.clone();
        forged.set_attr("ID", "_forged");
        forged.children.retain(|c| !c.is(XMLDSIG_NS, "Signature"));
        forged.children.insert(1, signature);

        assert!(matches!(
            engine().evaluate(&forged, Some(IDP)),
            SignatureTrust::Invalid(reason) if reason.contains("Reference URI")
        ));
    }

    #[test]
    fn sha1_is_refused_by_default() {
        let mut element = signed_assertion();
        // Rewrite the signature method to rsa-sha1; verification must stop before
        // any cryptographic check.
        let signature = element
            .children
            .iter_mut()
            .find(|c| c.is(XMLDSIG_NS, "Signature"))
            .unwrap();
        let signed_info = &mut signature.children[0];
        signed_info.children[1].set_attr("Algorithm", SignatureAlgorithm::Sha1.xml_dsig_uri());

        assert!(matches!(
            engine().evaluate(&element, Some(IDP)),
            SignatureTrust::Invalid(reason) if reason.contains("rsa-sha1")
        ));
    }

    const INDENTED: &str = "<samlp:Response xmlns:samlp=\"urn:oasis:names:tc:SAML:2.0:protocol\" \
        xmlns:saml=\"urn:oasis:names:tc:SAML:2.0:assertion\" ID=\"_r\">\n  \
        <saml:Assertion ID=\"_a2\" Version=\"2.0\">\n    \
        <saml:Issuer>https://idp.example.org</saml:Issuer>\n    \
        <saml:Conditions></saml:Conditions>\n  \
        </saml:Assertion>\n\
        </samlp:Response>";

    fn signed_nested() -> XmlElement {
        let mut response = XmlElement::parse(INDENTED).unwrap();
        let assertion = response
            .children
            .iter_mut()
            .find(|c| c.is(SAML_NS, "Assertion"))
            .unwrap();
        idp_signer().sign(assertion).unwrap();
        response
    }

    fn reference(element: &XmlElement) -> &XmlElement {
        element
            .child(XMLDSIG_NS, "Signature")
            .and_then(|s| s.child(XMLDSIG_NS, "SignedInfo"))
            .and_then(|si| si.child(XMLDSIG_NS, "Reference"))
            .unwrap()
    }

    #[test]
    fn digest_is_over_the_exclusive_canonical_form() {
        let response = signed_nested();
        let assertion = response.child(SAML_NS, "Assertion").unwrap();

        let canonical = "<saml:Assertion xmlns:saml=\"urn:oasis:names:tc:SAML:2.0:assertion\" \
            ID=\"_a2\" Version=\"2.0\">\n    \
            <saml:Issuer>https://idp.example.org</saml:Issuer>\n    \
            <saml:Conditions></saml:Conditions>\n  \
            </saml:Assertion>";
        let expected = base64::engine::general_purpose::STANDARD
            .encode(DigestAlgorithm::Sha256.digest(canonical.as_bytes()));

        assert_eq!(
            reference(assertion).child_text(XMLDSIG_NS, "DigestValue"),
            Some(expected.as_str())
        );
        assert!(engine().evaluate(assertion, Some(IDP)).is_trusted());
    }

    #[test]
    fn signature_survives_moving_the_assertion_out_of_its_document() {
        let response = signed_nested();
        let mut standalone = response.child(SAML_NS, "Assertion").unwrap().clone();
        standalone.inherited_namespaces.clear();
        standalone.set_attr("xmlns:saml", SAML_NS);

        let xml = standalone.to_xml();
        assert!(xml.contains("<saml:Conditions/>"));

        let parsed = XmlElement::parse(&xml).unwrap();
        assert!(engine().evaluate(&parsed, Some(IDP)).is_trusted());
    }

    #[test]
    fn whitespace_is_covered_by_the_digest() {
        let mut response = signed_nested();
        let assertion = response
            .children
            .iter_mut()
            .find(|c| c.is(SAML_NS, "Assertion"))
            .unwrap();
        assertion.children[0].tail = "\n".to_string();

        assert!(matches!(
            engine().evaluate(assertion, Some(IDP)),
            SignatureTrust::Invalid(reason) if reason.contains("digest")
        ));
    }

    #[test]
    fn inclusive_canonicalization_is_refused() {
        let mut element = signed_assertion();
        let signature = element
            .children
            .iter_mut()
            .find(|c| c.is(XMLDSIG_NS, "Signature"))
            .unwrap();
        signature.children[0].children[0]
            .set_attr("Algorithm", "http://www.w3.org/TR/2001/REC-xml-c14n-20010315");

        assert!(matches!(
            engine().evaluate(&element, Some(IDP)),
            SignatureTrust::Invalid(reason) if reason.contains("canonicalization")
        ));
    }

    #[test]
    fn inclusive_namespace_prefix_list_is_honoured() {
        let mut element = XmlElement::parse(
            r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" xmlns:xs="http://www.w3.org/2001/XMLSchema" ID="_a3"><saml:Issuer>https://idp.example.org</saml:Issuer></saml:Assertion>"#,
        )
        .unwrap();
        let content = element
            .canonicalize_with_prefixes(&["xs".to_string()])
            .unwrap();
        let digest = base64::engine::general_purpose::STANDARD
            .encode(DigestAlgorithm::Sha256.digest(content.as_bytes()));

        let exclusive = XmlElement::new("ds", "Transform", XMLDSIG_NS)
            .with_attr("Algorithm", EXC_C14N)
            .with_child(
                XmlElement::new("ec", "InclusiveNamespaces", EXC_C14N)
                    .with_namespace("ec", EXC_C14N)
                    .with_attr("PrefixList", "xs"),
            );
        let signed_info = XmlElement::new("ds", "SignedInfo", XMLDSIG_NS)
            .with_namespace("ds", XMLDSIG_NS)
            .with_child(
                XmlElement::new("ds", "CanonicalizationMethod", XMLDSIG_NS)
                    .with_attr("Algorithm", EXC_C14N),
            )
            .with_child(
                XmlElement::new("ds", "SignatureMethod", XMLDSIG_NS)
                    .with_attr("Algorithm", SignatureAlgorithm::Sha256.xml_dsig_uri()),
            )
            .with_child(
                XmlElement::new("ds", "Reference", XMLDSIG_NS)
                    .with_attr("URI", "#_a3")
                    .with_child(
                        XmlElement::new("ds", "Transforms", XMLDSIG_NS)
                            .with_child(
                                XmlElement::new("ds", "Transform", XMLDSIG_NS)
                                    .with_attr("Algorithm", ENVELOPED_SIGNATURE),
                            )
                            .with_child(exclusive),
                    )
                    .with_child(
                        XmlElement::new("ds", "DigestMethod", XMLDSIG_NS)
                            .with_attr("Algorithm", DigestAlgorithm::Sha256.uri()),
                    )
                    .with_child(XmlElement::new("ds", "DigestValue", XMLDSIG_NS).with_text(digest)),
            );
        let value = idp_signer()
            .sign_data(signed_info.canonicalize().unwrap().as_bytes())
            .unwrap();
        let signature = XmlElement::new("ds", "Signature", XMLDSIG_NS)
            .with_namespace("ds", XMLDSIG_NS)
            .with_child(signed_info)
            .with_child(XmlElement::new("ds", "SignatureValue", XMLDSIG_NS).with_text(value));
        element.children.insert(1, signature);

        assert!(engine().evaluate(&element, Some(IDP)).is_trusted());
    }

    #[test]
    fn invalid_certificate_is_a_config_error() {
        let err = X509TrustEngine::from_der_certificates(IDP, &[vec![1, 2, 3]]).unwrap_err();
        assert!(matches!(err, SamlError::Config(_)));
    }
}
