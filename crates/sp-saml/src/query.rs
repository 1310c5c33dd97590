//! Query objects exchanged with identity providers.
//!
//! A query is the typed, validated meaning of one SAML message. Outbound
//! requests that expect an answer are kept in the correlation store as a
//! [`RequestWaitingForResponse`]; they reference their IdP connector by id
//! only and are resolved again through the connector registry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::types::{SamlBinding, Status};

/// Length in random bytes of generated identifiers.
const IDENTIFIER_BYTES: usize = 42;

/// Generates an unguessable SAML identifier: `_` followed by 84 hex digits.
///
/// The leading underscore keeps the value a valid `xs:ID`.
#[must_use]
pub fn generate_identifier() -> String {
    format!("_{}", sp_crypto::random_hex(IDENTIFIER_BYTES))
}

/// Caller parameters replayed after the SSO round trip.
pub type RequestParameters = BTreeMap<String, Vec<String>>;

/// An AuthnRequest sent by this SP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAuthnRequest {
    /// Message ID.
    pub id: String,
    /// Connector that built the request.
    pub idp_connector_id: String,
    /// Binding the IdP was asked to answer with.
    pub response_binding: SamlBinding,
    /// Original caller parameters.
    pub parameters: RequestParameters,
}

/// A LogoutRequest, sent by this SP or received from an IdP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySloRequest {
    /// Message ID.
    pub id: String,
    /// Connector of the IdP on the other side.
    pub idp_connector_id: String,
    /// Subject name identifier.
    pub name_id: Option<String>,
    /// Sessions to terminate.
    pub session_indexes: Vec<String>,
}

/// A request that expects a correlated response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestWaitingForResponse {
    /// An AuthnRequest awaiting its Response.
    AuthnRequest(QueryAuthnRequest),
    /// A LogoutRequest awaiting its LogoutResponse.
    SloRequest(QuerySloRequest),
}

impl RequestWaitingForResponse {
    /// Returns the request ID.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::AuthnRequest(q) => &q.id,
            Self::SloRequest(q) => &q.id,
        }
    }

    /// Returns the id of the connector that built the request.
    #[must_use]
    pub fn idp_connector_id(&self) -> &str {
        match self {
            Self::AuthnRequest(q) => &q.idp_connector_id,
            Self::SloRequest(q) => &q.idp_connector_id,
        }
    }

    /// Returns the SAML element name of the request.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AuthnRequest(_) => "AuthnRequest",
            Self::SloRequest(_) => "LogoutRequest",
        }
    }
}

impl From<QueryAuthnRequest> for RequestWaitingForResponse {
    fn from(query: QueryAuthnRequest) -> Self {
        Self::AuthnRequest(query)
    }
}

impl From<QuerySloRequest> for RequestWaitingForResponse {
    fn from(query: QuerySloRequest) -> Self {
        Self::SloRequest(query)
    }
}

/// A validated Response to one of our AuthnRequests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAuthnResponse {
    /// Message ID.
    pub id: String,
    /// ID of the answered request.
    pub in_response_to: String,
    /// Connector of the issuing IdP.
    pub idp_connector_id: String,
    /// The answered request.
    pub original_request: QueryAuthnRequest,
    /// One authentication per `AuthnStatement`.
    pub authentications: Vec<Authentication>,
}

/// A validated LogoutResponse to one of our LogoutRequests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySloResponse {
    /// Message ID.
    pub id: String,
    /// ID of the answered request.
    pub in_response_to: String,
    /// Connector of the issuing IdP.
    pub idp_connector_id: String,
    /// The answered request.
    pub original_request: QuerySloRequest,
    /// Reported status.
    pub status: Status,
}

/// A query of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Query {
    /// Outbound AuthnRequest.
    AuthnRequest(QueryAuthnRequest),
    /// Inbound Response.
    AuthnResponse(QueryAuthnResponse),
    /// LogoutRequest in either direction.
    SloRequest(QuerySloRequest),
    /// LogoutResponse in either direction.
    SloResponse(QuerySloResponse),
}

impl Query {
    /// Returns the message ID.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::AuthnRequest(q) => &q.id,
            Self::AuthnResponse(q) => &q.id,
            Self::SloRequest(q) => &q.id,
            Self::SloResponse(q) => &q.id,
        }
    }

    /// Returns the connector id of the IdP on the other side.
    #[must_use]
    pub fn idp_connector_id(&self) -> &str {
        match self {
            Self::AuthnRequest(q) => &q.idp_connector_id,
            Self::AuthnResponse(q) => &q.idp_connector_id,
            Self::SloRequest(q) => &q.idp_connector_id,
            Self::SloResponse(q) => &q.idp_connector_id,
        }
    }
}

/// One completed IdP authentication.
///
/// Built through [`AuthenticationBuilder`]; immutable once locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    authentication_instant: Option<DateTime<Utc>>,
    idp_entity_id: String,
    subject_id: String,
    session_index: String,
    attributes: BTreeMap<String, Vec<String>>,
}

impl Authentication {
    /// Starts building an authentication.
    #[must_use]
    pub fn builder(
        idp_entity_id: impl Into<String>,
        subject_id: impl Into<String>,
        session_index: impl Into<String>,
    ) -> AuthenticationBuilder {
        AuthenticationBuilder {
            inner: Self {
                authentication_instant: None,
                idp_entity_id: idp_entity_id.into(),
                subject_id: subject_id.into(),
                session_index: session_index.into(),
                attributes: BTreeMap::new(),
            },
        }
    }

    /// Instant the user authenticated at the IdP.
    #[must_use]
    pub const fn authentication_instant(&self) -> Option<DateTime<Utc>> {
        self.authentication_instant
    }

    /// Entity ID of the authenticating IdP.
    #[must_use]
    pub fn idp_entity_id(&self) -> &str {
        &self.idp_entity_id
    }

    /// Subject name identifier.
    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// IdP session index.
    #[must_use]
    pub fn session_index(&self) -> &str {
        &self.session_index
    }

    /// Values of the attribute `name`, in document order.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&[String]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    /// All attributes.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, Vec<String>> {
        &self.attributes
    }
}

/// Mutable stage of an [`Authentication`].
#[derive(Debug, Clone)]
pub struct AuthenticationBuilder {
    inner: Authentication,
}

impl AuthenticationBuilder {
    /// Sets the authentication instant.
    #[must_use]
    pub fn authentication_instant(mut self, instant: Option<DateTime<Utc>>) -> Self {
        self.inner.authentication_instant = instant;
        self
    }

    /// Adds an attribute.
    ///
    /// Empty values are skipped and an attribute left without values is not
    /// added. A second attribute with the same name is a security error.
    pub fn add_attribute<I, S>(&mut self, name: &str, values: I) -> SamlResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.inner.attributes.contains_key(name) {
            return Err(SamlError::Security(format!(
                "Assertion contained multiple attributes with same name: {name}"
            )));
        }
        let values: Vec<String> = values
            .into_iter()
            .map(Into::into)
            .filter(|v| !v.is_empty())
            .collect();
        if !values.is_empty() {
            self.inner.attributes.insert(name.to_string(), values);
        }
        Ok(())
    }

    /// Freezes the authentication.
    #[must_use]
    pub fn lock(self) -> Authentication {
        self.inner
    }
}
