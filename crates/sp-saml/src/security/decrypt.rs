//! XML-Encryption of SAML elements.
//!
//! Supported content: `EncryptedAssertion`, `EncryptedID` and
//! `EncryptedAttribute`, with the content key transported by RSA-OAEP
//! (`xmlenc#rsa-oaep-mgf1p` or `xmlenc11#rsa-oaep`) either inside the
//! `ds:KeyInfo` of the encrypted data or as a sibling `xenc:EncryptedKey`.
//! RSA PKCS#1 v1.5 key transport is refused.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use sp_crypto::encryption::{rsa_oaep_decrypt, rsa_oaep_encrypt};
use sp_crypto::{BlockCipher, OaepDigest};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::{SamlError, SamlResult};
use crate::types::{
    Assertion, Attribute, EncryptedElement, NameId, SubjectIdentifier, SAML_NS, XMLDSIG_NS,
    XMLENC_NS,
};
use crate::xml::XmlElement;

/// `xmlenc#rsa-oaep-mgf1p` key transport.
pub const RSA_OAEP_MGF1P: &str = "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p";
/// `xmlenc11#rsa-oaep` key transport.
pub const RSA_OAEP_11: &str = "http://www.w3.org/2009/xmlenc11#rsa-oaep";
/// `xmlenc#rsa-1_5` key transport (refused).
pub const RSA_1_5: &str = "http://www.w3.org/2001/04/xmlenc#rsa-1_5";

const ELEMENT_TYPE: &str = "http://www.w3.org/2001/04/xmlenc#Element";
const DIGEST_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
const DIGEST_SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
const MGF1_SHA1: &str = "http://www.w3.org/2009/xmlenc11#mgf1sha1";
const MGF1_SHA256: &str = "http://www.w3.org/2009/xmlenc11#mgf1sha256";
const XMLENC11_NS: &str = "http://www.w3.org/2009/xmlenc11#";

/// Decrypts SAML encrypted elements with the SP's key.
///
/// Implementors provide [`Decrypter::decrypt`]; the typed helpers merge the
/// result back into the SAML object model.
pub trait Decrypter: Send + Sync + fmt::Debug {
    /// Decrypts the content of an encrypted wrapper into its clear element.
    fn decrypt(&self, encrypted: &EncryptedElement) -> SamlResult<XmlElement>;

    /// Decrypts an `EncryptedAssertion`.
    fn decrypt_assertion(&self, encrypted: &EncryptedElement) -> SamlResult<Assertion> {
        let element = self.decrypt(encrypted)?;
        if !element.is(SAML_NS, "Assertion") {
            return Err(SamlError::Processing(format!(
                "EncryptedAssertion decrypted to unexpected element {}",
                element.qualified_name()
            )));
        }
        Assertion::from_element(&element)
    }

    /// Decrypts an `EncryptedID` into the identifier it replaces.
    fn decrypt_identifier(&self, encrypted: &EncryptedElement) -> SamlResult<SubjectIdentifier> {
        let element = self.decrypt(encrypted)?;
        if element.is(SAML_NS, "NameID") {
            Ok(SubjectIdentifier::NameId(NameId::from_element(&element)))
        } else {
            Ok(SubjectIdentifier::Other(element.name))
        }
    }

    /// Decrypts `EncryptedAttribute` elements, in document order.
    fn decrypt_attributes(&self, encrypted: &[EncryptedElement]) -> SamlResult<Vec<Attribute>> {
        encrypted
            .iter()
            .map(|e| {
                let element = self.decrypt(e)?;
                if !element.is(SAML_NS, "Attribute") {
                    return Err(SamlError::Processing(format!(
                        "EncryptedAttribute decrypted to unexpected element {}",
                        element.qualified_name()
                    )));
                }
                Ok(Attribute::from_element(&element))
            })
            .collect()
    }
}

/// XML-Encryption decrypter holding the SP's RSA private key.
#[derive(Clone)]
pub struct XmlEncDecrypter {
    private_key_der: Vec<u8>,
}

impl fmt::Debug for XmlEncDecrypter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlEncDecrypter").finish_non_exhaustive()
    }
}

impl XmlEncDecrypter {
    /// Creates a decrypter from a PKCS#8 DER private key.
    #[must_use]
    pub fn new(private_key_der: Vec<u8>) -> Self {
        Self { private_key_der }
    }

    /// Creates a decrypter from a PEM private key.
    pub fn from_pem(private_key_pem: &str) -> SamlResult<Self> {
        Ok(Self::new(sp_crypto::pem::private_key_pem_to_der(
            private_key_pem,
        )?))
    }

    fn unwrap_key(&self, encrypted_key: &XmlElement) -> SamlResult<Vec<u8>> {
        let method = encrypted_key
            .child(XMLENC_NS, "EncryptionMethod")
            .ok_or_else(|| {
                SamlError::Processing("EncryptedKey has no EncryptionMethod".to_string())
            })?;
        let algorithm = method.attr("Algorithm").unwrap_or_default();
        let digest = match algorithm {
            RSA_OAEP_MGF1P | RSA_OAEP_11 => oaep_digest(method)?,
            RSA_1_5 => {
                return Err(SamlError::UnsupportedOperation(
                    "RSA PKCS#1 v1.5 key transport is not supported".to_string(),
                ))
            }
            other => {
                return Err(SamlError::UnsupportedOperation(format!(
                    "Unsupported key transport algorithm: {other}"
                )))
            }
        };

        let wrapped = cipher_value(encrypted_key)?;
        Ok(rsa_oaep_decrypt(&self.private_key_der, &wrapped, digest)?)
    }
}

impl Decrypter for XmlEncDecrypter {
    fn decrypt(&self, encrypted: &EncryptedElement) -> SamlResult<XmlElement> {
        let data = encrypted.encrypted_data().ok_or_else(|| {
            SamlError::Processing(format!(
                "{} has no EncryptedData",
                encrypted.element.qualified_name()
            ))
        })?;

        let cipher_uri = data
            .child(XMLENC_NS, "EncryptionMethod")
            .and_then(|m| m.attr("Algorithm"))
            .ok_or_else(|| {
                SamlError::Processing("EncryptedData has no EncryptionMethod".to_string())
            })?;
        let cipher = BlockCipher::from_uri(cipher_uri).ok_or_else(|| {
            SamlError::UnsupportedOperation(format!("Unsupported block cipher: {cipher_uri}"))
        })?;

        let encrypted_key = data
            .child(XMLDSIG_NS, "KeyInfo")
            .and_then(|k| k.child(XMLENC_NS, "EncryptedKey"))
            .or_else(|| encrypted.encrypted_keys().next())
            .ok_or_else(|| {
                SamlError::Processing("No EncryptedKey found for EncryptedData".to_string())
            })?;

        let key = self.unwrap_key(encrypted_key)?;
        if key.len() != cipher.key_len() {
            return Err(SamlError::Crypto(format!(
                "content key has {} bytes, {} expects {}",
                key.len(),
                cipher.uri(),
                cipher.key_len()
            )));
        }

        let plaintext = cipher.decrypt(&key, &cipher_value(data)?)?;
        let xml = String::from_utf8(plaintext)
            .map_err(|e| SamlError::XmlParse(format!("decrypted content is not UTF-8: {e}")))?;
        tracing::debug!(
            element = %encrypted.element.name,
            cipher = cipher.uri(),
            "Decrypted SAML element"
        );
        XmlElement::parse(&xml)
    }
}

fn oaep_digest(method: &XmlElement) -> SamlResult<OaepDigest> {
    let digest = match method
        .child(XMLDSIG_NS, "DigestMethod")
        .and_then(|d| d.attr("Algorithm"))
    {
        None | Some(DIGEST_SHA1) => OaepDigest::Sha1,
        Some(DIGEST_SHA256) => OaepDigest::Sha256,
        Some(other) => {
            return Err(SamlError::UnsupportedOperation(format!(
                "Unsupported OAEP digest: {other}"
            )))
        }
    };

    // The MGF1 digest must match the OAEP digest.
    match method.child(XMLENC11_NS, "MGF").and_then(|m| m.attr("Algorithm")) {
        None => Ok(digest),
        Some(MGF1_SHA1) if digest == OaepDigest::Sha1 => Ok(digest),
        Some(MGF1_SHA256) if digest == OaepDigest::Sha256 => Ok(digest),
        Some(other) => Err(SamlError::UnsupportedOperation(format!(
            "Unsupported OAEP mask generation function: {other}"
        ))),
    }
}

fn cipher_value(element: &XmlElement) -> SamlResult<Vec<u8>> {
    let value = element
        .child(XMLENC_NS, "CipherData")
        .and_then(|d| d.child(XMLENC_NS, "CipherValue"))
        .ok_or_else(|| {
            SamlError::Processing(format!("{} has no CipherValue", element.name))
        })?;
    let compact: String = value.text.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(STANDARD.decode(compact)?)
}

/// XML-Encryption encrypter for a recipient's RSA public key.
///
/// The SP never encrypts outbound messages; this is the counterpart used to
/// produce encrypted fixtures and by tooling that plays the IdP role.
#[derive(Debug, Clone)]
pub struct XmlEncrypter {
    public_key_der: Vec<u8>,
    cipher: BlockCipher,
    oaep: OaepDigest,
}

impl XmlEncrypter {
    /// Creates an encrypter from a `SubjectPublicKeyInfo` DER public key.
    #[must_use]
    pub fn new(public_key_der: Vec<u8>) -> Self {
        Self {
            public_key_der,
            cipher: BlockCipher::Aes256Gcm,
            oaep: OaepDigest::Sha1,
        }
    }

    /// Creates an encrypter for the key of a PEM certificate.
    pub fn from_certificate_pem(certificate_pem: &str) -> SamlResult<Self> {
        let der = sp_crypto::pem::pem_to_der(certificate_pem, "CERTIFICATE")?;
        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| SamlError::Config(format!("Invalid certificate: {e}")))?;
        Ok(Self::new(cert.public_key().raw.to_vec()))
    }

    /// Sets the content cipher and the OAEP digest.
    #[must_use]
    pub fn with_algorithms(mut self, cipher: BlockCipher, oaep: OaepDigest) -> Self {
        self.cipher = cipher;
        self.oaep = oaep;
        self
    }

    /// Encrypts `element` into a `saml:<wrapper>` element.
    pub fn encrypt(&self, element: &XmlElement, wrapper: &str) -> SamlResult<EncryptedElement> {
        let key = sp_crypto::random_bytes(self.cipher.key_len());
        let content = self.cipher.encrypt(&key, element.to_xml().as_bytes())?;
        let wrapped = rsa_oaep_encrypt(&self.public_key_der, &key, self.oaep)?;

        let mut key_method = XmlElement::new("xenc", "EncryptionMethod", XMLENC_NS)
            .with_attr("Algorithm", RSA_OAEP_MGF1P);
        if self.oaep == OaepDigest::Sha256 {
            key_method = key_method.with_child(
                XmlElement::new("ds", "DigestMethod", XMLDSIG_NS)
                    .with_attr("Algorithm", DIGEST_SHA256),
            );
        }

        let encrypted_key = XmlElement::new("xenc", "EncryptedKey", XMLENC_NS)
            .with_child(key_method)
            .with_child(cipher_data(&wrapped));

        let data = XmlElement::new("xenc", "EncryptedData", XMLENC_NS)
            .with_namespace("xenc", XMLENC_NS)
            .with_attr("Type", ELEMENT_TYPE)
            .with_child(
                XmlElement::new("xenc", "EncryptionMethod", XMLENC_NS)
                    .with_attr("Algorithm", self.cipher.uri()),
            )
            .with_child(
                XmlElement::new("ds", "KeyInfo", XMLDSIG_NS)
                    .with_namespace("ds", XMLDSIG_NS)
                    .with_child(encrypted_key),
            )
            .with_child(cipher_data(&content));

        Ok(EncryptedElement::new(
            XmlElement::new("saml", wrapper, SAML_NS).with_child(data),
        ))
    }
}

fn cipher_data(bytes: &[u8]) -> XmlElement {
    XmlElement::new("xenc", "CipherData", XMLENC_NS).with_child(
        XmlElement::new("xenc", "CipherValue", XMLENC_NS).with_text(STANDARD.encode(bytes)),
    )
}
