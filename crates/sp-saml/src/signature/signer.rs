//! XML Signature creation.

use base64::Engine;

use crate::error::{SamlError, SamlResult};
use crate::types::{SAML_NS, XMLDSIG_NS};
use crate::xml::XmlElement;

use super::{signed_content, DigestAlgorithm, SignatureAlgorithm, ENVELOPED_SIGNATURE, EXC_C14N};

/// XML signature signer holding the SP credential.
#[derive(Clone)]
pub struct XmlSigner {
    /// Private key in DER format (PKCS#1 or PKCS#8).
    private_key_der: Vec<u8>,
    /// Certificate published in `KeyInfo`.
    certificate_der: Option<Vec<u8>>,
    algorithm: SignatureAlgorithm,
    digest: DigestAlgorithm,
}

impl std::fmt::Debug for XmlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlSigner")
            .field("algorithm", &self.algorithm)
            .field("digest", &self.digest)
            .field("has_certificate", &self.certificate_der.is_some())
            .finish_non_exhaustive()
    }
}

impl XmlSigner {
    /// Creates a signer from DER key material.
    #[must_use]
    pub fn new(private_key_der: Vec<u8>, certificate_der: Option<Vec<u8>>) -> Self {
        Self {
            private_key_der,
            certificate_der,
            algorithm: SignatureAlgorithm::Sha256,
            digest: DigestAlgorithm::Sha256,
        }
    }

    /// Creates a signer from PEM key material.
    pub fn from_pem(private_key_pem: &str, certificate_pem: Option<&str>) -> SamlResult<Self> {
        let key = sp_crypto::pem::private_key_pem_to_der(private_key_pem)?;
        let cert = certificate_pem
            .map(|pem| sp_crypto::pem::pem_to_der(pem, "CERTIFICATE"))
            .transpose()?;
        Ok(Self::new(key, cert))
    }

    /// Sets the signature and digest algorithms.
    #[must_use]
    pub fn with_algorithms(mut self, algorithm: SignatureAlgorithm, digest: DigestAlgorithm) -> Self {
        self.algorithm = algorithm;
        self.digest = digest;
        self
    }

    /// Signs `element` in place with an enveloped signature.
    ///
    /// The element must carry an `ID` attribute. Any previous signature is
    /// replaced. The `ds:Signature` is inserted right after `saml:Issuer`,
    /// or first when there is no issuer.
    pub fn sign(&self, element: &mut XmlElement) -> SamlResult<()> {
        let id = element
            .attr("ID")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                SamlError::Building(format!("cannot sign {} without an ID", element.name))
            })?
            .to_string();

        element.children.retain(|c| !c.is(XMLDSIG_NS, "Signature"));

        let content = signed_content(element, &[]).map_err(|e| {
            SamlError::Building(format!("cannot canonicalize {}: {e}", element.name))
        })?;
        let digest = self.digest.digest(content.as_bytes());
        let digest_value = base64::engine::general_purpose::STANDARD.encode(digest);

        let signed_info = self.build_signed_info(&id, &digest_value);
        let canonical_signed_info = signed_info
            .canonicalize()
            .map_err(|e| SamlError::Building(format!("cannot canonicalize SignedInfo: {e}")))?;
        let signature_value = self.sign_data(canonical_signed_info.as_bytes())?;

        let signature = self.build_signature_element(signed_info, &signature_value);

        let position = element
            .position(SAML_NS, "Issuer")
            .map_or(0, |index| index + 1);
        element.children.insert(position, signature);
        Ok(())
    }

    /// Signs raw data and returns the base64 signature value.
    pub fn sign_data(&self, data: &[u8]) -> SamlResult<String> {
        let signature = sp_crypto::rsa_sign(&self.private_key_der, data, self.algorithm)
            .map_err(|e| SamlError::Building(format!("RSA signing failed: {e}")))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(signature))
    }

    fn build_signed_info(&self, reference_id: &str, digest_value: &str) -> XmlElement {
        let transforms = XmlElement::new("ds", "Transforms", XMLDSIG_NS)
            .with_child(
                XmlElement::new("ds", "Transform", XMLDSIG_NS)
                    .with_attr("Algorithm", ENVELOPED_SIGNATURE),
            )
            .with_child(
                XmlElement::new("ds", "Transform", XMLDSIG_NS).with_attr("Algorithm", EXC_C14N),
            );

        let reference = XmlElement::new("ds", "Reference", XMLDSIG_NS)
            .with_attr("URI", format!("#{reference_id}"))
            .with_child(transforms)
            .with_child(
                XmlElement::new("ds", "DigestMethod", XMLDSIG_NS)
                    .with_attr("Algorithm", self.digest.uri()),
            )
            .with_child(XmlElement::new("ds", "DigestValue", XMLDSIG_NS).with_text(digest_value));

        XmlElement::new("ds", "SignedInfo", XMLDSIG_NS)
            .with_namespace("ds", XMLDSIG_NS)
            .with_child(
                XmlElement::new("ds", "CanonicalizationMethod", XMLDSIG_NS)
                    .with_attr("Algorithm", EXC_C14N),
            )
            .with_child(
                XmlElement::new("ds", "SignatureMethod", XMLDSIG_NS)
                    .with_attr("Algorithm", self.algorithm.xml_dsig_uri()),
            )
            .with_child(reference)
    }

    fn build_signature_element(&self, signed_info: XmlElement, signature_value: &str) -> XmlElement {
        let mut signature = XmlElement::new("ds", "Signature", XMLDSIG_NS)
            .with_namespace("ds", XMLDSIG_NS)
            .with_child(signed_info)
            .with_child(
                XmlElement::new("ds", "SignatureValue", XMLDSIG_NS).with_text(signature_value),
            );

        if let Some(cert) = &self.certificate_der {
            let cert_b64 = base64::engine::general_purpose::STANDARD.encode(cert);
            signature = signature.with_child(
                XmlElement::new("ds", "KeyInfo", XMLDSIG_NS).with_child(
                    XmlElement::new("ds", "X509Data", XMLDSIG_NS).with_child(
                        XmlElement::new("ds", "X509Certificate", XMLDSIG_NS).with_text(cert_b64),
                    ),
                ),
            );
        }
        signature
    }
}
