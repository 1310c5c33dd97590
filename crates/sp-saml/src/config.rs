//! Service provider configuration.
//!
//! Loaded from TOML:
//!
//! ```toml
//! [sp]
//! id = "sp"
//! entity_id = "https://sp.example.org"
//! sso = { post = "https://sp.example.org/cas/Shibboleth.sso/SAML2/POST" }
//! slo = { post = "https://sp.example.org/cas/Shibboleth.sso/SLO/POST" }
//! signing_key = { path = "/etc/sp/sp-key.pem" }
//!
//! [[idps]]
//! id = "idp"
//! entity_id = "https://idp.example.org"
//! sso = { redirect = "https://idp.example.org/sso" }
//! signing_certificates = ["-----BEGIN CERTIFICATE-----..."]
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::processor::ProcessorKind;
use crate::types::SamlBinding;

/// Complete SAML configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamlConfig {
    /// This service provider.
    pub sp: SpConfig,
    /// Trusted identity providers.
    #[serde(default)]
    pub idps: Vec<IdpConfig>,
    /// Inbound processing settings.
    #[serde(default)]
    pub processor: ProcessorConfig,
}

impl SamlConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> SamlResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SamlError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SamlResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SamlError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Checks identifiers and IdP uniqueness.
    pub fn validate(&self) -> SamlResult<()> {
        self.sp.validate()?;
        let mut seen = HashSet::new();
        for idp in &self.idps {
            idp.validate()?;
            if !seen.insert(idp.id.as_str()) {
                return Err(SamlError::Config(format!("duplicate IdP id: {}", idp.id)));
            }
        }
        Ok(())
    }
}

/// Endpoint URLs per binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingEndpoints {
    /// HTTP-POST endpoint.
    pub post: Option<String>,
    /// HTTP-Redirect endpoint.
    pub redirect: Option<String>,
}

impl BindingEndpoints {
    /// Returns the endpoint for `binding`.
    #[must_use]
    pub fn get(&self, binding: SamlBinding) -> Option<&str> {
        match binding {
            SamlBinding::HttpPost => self.post.as_deref(),
            SamlBinding::HttpRedirect => self.redirect.as_deref(),
        }
    }

    /// Sets the endpoint for `binding`.
    #[must_use]
    pub fn with(mut self, binding: SamlBinding, url: impl Into<String>) -> Self {
        let url = Some(url.into());
        match binding {
            SamlBinding::HttpPost => self.post = url,
            SamlBinding::HttpRedirect => self.redirect = url,
        }
        self
    }
}

/// PEM material, inline or read from a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PemSource {
    /// Inline PEM text.
    Inline {
        /// PEM text.
        pem: String,
    },
    /// PEM file.
    File {
        /// File path.
        path: PathBuf,
    },
}

impl PemSource {
    /// Returns the PEM text.
    pub fn load(&self) -> SamlResult<String> {
        match self {
            Self::Inline { pem } => Ok(pem.clone()),
            Self::File { path } => std::fs::read_to_string(path).map_err(|e| {
                SamlError::Config(format!("failed to read {}: {e}", path.display()))
            }),
        }
    }
}

/// This service provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpConfig {
    /// Local identifier.
    pub id: String,
    /// SAML entity ID.
    pub entity_id: String,
    /// Human readable description.
    pub description: Option<String>,
    /// Assertion consumer service endpoints.
    #[serde(default)]
    pub sso: BindingEndpoints,
    /// Single logout endpoints.
    #[serde(default)]
    pub slo: BindingEndpoints,
    /// Signing private key.
    pub signing_key: Option<PemSource>,
    /// Signing certificate, published in `ds:KeyInfo`.
    pub signing_certificate: Option<PemSource>,
    /// Decryption private key; defaults to the signing key.
    pub decryption_key: Option<PemSource>,
}

impl SpConfig {
    /// Creates an SP configuration without endpoints or keys.
    #[must_use]
    pub fn new(id: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_id: entity_id.into(),
            description: None,
            sso: BindingEndpoints::default(),
            slo: BindingEndpoints::default(),
            signing_key: None,
            signing_certificate: None,
            decryption_key: None,
        }
    }

    fn validate(&self) -> SamlResult<()> {
        if self.id.trim().is_empty() {
            return Err(SamlError::Config("SP id must not be empty".to_string()));
        }
        if self.entity_id.trim().is_empty() {
            return Err(SamlError::Config("SP entity_id must not be empty".to_string()));
        }
        Ok(())
    }
}

/// A trusted identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdpConfig {
    /// Local identifier.
    pub id: String,
    /// SAML entity ID.
    pub entity_id: String,
    /// Human readable description.
    pub description: Option<String>,
    /// Sets `ForceAuthn` on AuthnRequests.
    #[serde(default = "default_force_authentication")]
    pub force_authentication: bool,
    /// Half width of the validity window of outbound requests.
    #[serde(default = "default_time_validity_window_ms")]
    pub time_validity_window_ms: u64,
    /// Binding used to send AuthnRequests.
    #[serde(default = "default_request_binding")]
    pub request_binding: SamlBinding,
    /// Binding asked for the AuthnResponse.
    #[serde(default = "default_response_binding")]
    pub response_binding: SamlBinding,
    /// `AttributeConsumingServiceIndex` of AuthnRequests.
    #[serde(default = "default_attribute_consuming_service_index")]
    pub attribute_consuming_service_index: Option<u16>,
    /// Clock skew tolerance; falls back on the processor default.
    pub clock_skew_seconds: Option<i64>,
    /// Single sign-on endpoints.
    #[serde(default)]
    pub sso: BindingEndpoints,
    /// Single logout endpoints.
    #[serde(default)]
    pub slo: BindingEndpoints,
    /// Trusted signing certificates (PEM).
    #[serde(default)]
    pub signing_certificates: Vec<String>,
    /// Accepts legacy SHA-1 signatures.
    #[serde(default)]
    pub allow_sha1: bool,
}

fn default_force_authentication() -> bool {
    true
}

fn default_time_validity_window_ms() -> u64 {
    300_000
}

fn default_request_binding() -> SamlBinding {
    SamlBinding::HttpRedirect
}

fn default_response_binding() -> SamlBinding {
    SamlBinding::HttpPost
}

#[allow(clippy::unnecessary_wraps)]
fn default_attribute_consuming_service_index() -> Option<u16> {
    Some(1)
}

impl IdpConfig {
    /// Creates an IdP configuration with default settings.
    #[must_use]
    pub fn new(id: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_id: entity_id.into(),
            description: None,
            force_authentication: default_force_authentication(),
            time_validity_window_ms: default_time_validity_window_ms(),
            request_binding: default_request_binding(),
            response_binding: default_response_binding(),
            attribute_consuming_service_index: default_attribute_consuming_service_index(),
            clock_skew_seconds: None,
            sso: BindingEndpoints::default(),
            slo: BindingEndpoints::default(),
            signing_certificates: Vec::new(),
            allow_sha1: false,
        }
    }

    fn validate(&self) -> SamlResult<()> {
        if self.id.trim().is_empty() {
            return Err(SamlError::Config("IdP id must not be empty".to_string()));
        }
        if self.entity_id.trim().is_empty() {
            return Err(SamlError::Config(format!(
                "IdP {} entity_id must not be empty",
                self.id
            )));
        }
        Ok(())
    }
}

/// Inbound processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Default clock skew tolerance.
    #[serde(default = "default_clock_skew_seconds")]
    pub clock_skew_seconds: i64,
    /// Lifetime of the inbound message replay cache.
    #[serde(default = "default_replay_minutes")]
    pub replay_minutes: u64,
    /// Last path segment to binding.
    #[serde(default = "default_binding_table")]
    pub binding_table: HashMap<String, SamlBinding>,
    /// Root element local name to processor.
    #[serde(default = "default_processor_table")]
    pub processor_table: HashMap<String, ProcessorKind>,
    /// Endpoint path prefixes each processor accepts.
    #[serde(default)]
    pub endpoints: ProcessorEndpoints,
    /// Lifetime of requests waiting for a response.
    #[serde(default = "default_request_ttl_seconds")]
    pub request_ttl_seconds: u64,
    /// Lifetime of stored authentications.
    #[serde(default = "default_authentication_ttl_seconds")]
    pub authentication_ttl_seconds: u64,
    /// Timeout of outbound SLO response delivery.
    #[serde(default = "default_slo_response_timeout_seconds")]
    pub slo_response_timeout_seconds: u64,
}

fn default_clock_skew_seconds() -> i64 {
    60
}

fn default_replay_minutes() -> u64 {
    5
}

fn default_binding_table() -> HashMap<String, SamlBinding> {
    HashMap::from([
        ("POST".to_string(), SamlBinding::HttpPost),
        ("Redirect".to_string(), SamlBinding::HttpRedirect),
    ])
}

fn default_processor_table() -> HashMap<String, ProcessorKind> {
    HashMap::from([
        ("Response".to_string(), ProcessorKind::AuthnResponse),
        ("LogoutRequest".to_string(), ProcessorKind::SloRequest),
        ("LogoutResponse".to_string(), ProcessorKind::SloResponse),
    ])
}

fn default_request_ttl_seconds() -> u64 {
    600
}

fn default_authentication_ttl_seconds() -> u64 {
    28_800
}

fn default_slo_response_timeout_seconds() -> u64 {
    10
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            clock_skew_seconds: default_clock_skew_seconds(),
            replay_minutes: default_replay_minutes(),
            binding_table: default_binding_table(),
            processor_table: default_processor_table(),
            endpoints: ProcessorEndpoints::default(),
            request_ttl_seconds: default_request_ttl_seconds(),
            authentication_ttl_seconds: default_authentication_ttl_seconds(),
            slo_response_timeout_seconds: default_slo_response_timeout_seconds(),
        }
    }
}

impl ProcessorConfig {
    /// Looks up the binding for the last segment of a request path.
    #[must_use]
    pub fn binding_for_segment(&self, segment: &str) -> Option<SamlBinding> {
        self.binding_table.get(segment).copied()
    }

    /// Looks up the processor for a root element local name.
    #[must_use]
    pub fn processor_for(&self, local_name: &str) -> Option<ProcessorKind> {
        self.processor_table.get(local_name).copied()
    }

    /// Returns the endpoint path prefix configured for `kind`.
    #[must_use]
    pub fn endpoint_location(&self, kind: ProcessorKind) -> &str {
        match kind {
            ProcessorKind::AuthnResponse => &self.endpoints.authn_response,
            ProcessorKind::SloRequest => &self.endpoints.slo_request,
            ProcessorKind::SloResponse => &self.endpoints.slo_response,
        }
    }
}

/// Endpoint path prefixes per processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorEndpoints {
    /// AuthnResponse endpoint.
    #[serde(default = "default_sso_location")]
    pub authn_response: String,
    /// Inbound LogoutRequest endpoint.
    #[serde(default = "default_slo_location")]
    pub slo_request: String,
    /// Inbound LogoutResponse endpoint.
    #[serde(default = "default_slo_location")]
    pub slo_response: String,
}

fn default_sso_location() -> String {
    "/Shibboleth.sso/SAML2".to_string()
}

fn default_slo_location() -> String {
    "/Shibboleth.sso/SLO".to_string()
}

impl Default for ProcessorEndpoints {
    fn default() -> Self {
        Self {
            authn_response: default_sso_location(),
            slo_request: default_slo_location(),
            slo_response: default_slo_location(),
        }
    }
}
