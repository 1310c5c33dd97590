//! IdP connectors.
//!
//! An [`IdpConnector`] builds every outbound message for one identity
//! provider: it signs the message, records requests that expect an answer
//! in the correlation store and encodes the result for the chosen binding.
//! Connectors are looked up through an explicit [`ConnectorRegistry`].

use std::fmt;
use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;

use crate::bindings::SamlMessageType;
use crate::config::{IdpConfig, SpConfig};
use crate::error::{SamlError, SamlResult};
use crate::message::OutgoingMessage;
use crate::query::{
    generate_identifier, Query, QueryAuthnRequest, QuerySloRequest, QuerySloResponse,
    RequestParameters, RequestWaitingForResponse,
};
use crate::relay_state::RelayState;
use crate::signature::{SignatureTrustEngine, XmlSigner};
use crate::store::CorrelationStore;
use crate::types::{
    AuthnRequest, LogoutRequest, LogoutResponse, NameId, SamlBinding, Status,
    NAMEID_FORMAT_TRANSIENT,
};
use crate::xml::XmlElement;

// One year.
const MAX_WINDOW_MS: u64 = 365 * 24 * 3600 * 1000;

/// Builds and signs the messages exchanged with one IdP.
pub struct IdpConnector {
    idp: IdpConfig,
    sp: Arc<SpConfig>,
    signer: Arc<XmlSigner>,
    trust_engine: Arc<dyn SignatureTrustEngine>,
    store: Arc<dyn CorrelationStore>,
}

impl fmt::Debug for IdpConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdpConnector")
            .field("id", &self.idp.id)
            .field("entity_id", &self.idp.entity_id)
            .field("sp", &self.sp.entity_id)
            .finish_non_exhaustive()
    }
}

impl IdpConnector {
    /// Creates a connector.
    #[must_use]
    pub fn new(
        idp: IdpConfig,
        sp: Arc<SpConfig>,
        signer: Arc<XmlSigner>,
        trust_engine: Arc<dyn SignatureTrustEngine>,
        store: Arc<dyn CorrelationStore>,
    ) -> Self {
        Self {
            idp,
            sp,
            signer,
            trust_engine,
            store,
        }
    }

    /// Connector (IdP configuration) id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.idp.id
    }

    /// IdP entity ID.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.idp.entity_id
    }

    /// IdP configuration.
    #[must_use]
    pub const fn idp_config(&self) -> &IdpConfig {
        &self.idp
    }

    /// SP configuration.
    #[must_use]
    pub fn sp_config(&self) -> &SpConfig {
        &self.sp
    }

    /// Trust engine scoped to this IdP.
    #[must_use]
    pub fn trust_engine(&self) -> &dyn SignatureTrustEngine {
        self.trust_engine.as_ref()
    }

    fn window(&self) -> Duration {
        let ms = self.idp.time_validity_window_ms.min(MAX_WINDOW_MS);
        Duration::milliseconds(i64::try_from(ms).unwrap_or_default())
    }

    fn sign(&self, mut element: XmlElement) -> SamlResult<String> {
        self.signer.sign(&mut element)?;
        Ok(element.to_xml())
    }

    fn idp_slo_endpoint(&self, binding: SamlBinding) -> SamlResult<&str> {
        self.idp.slo.get(binding).ok_or_else(|| {
            SamlError::Building(format!(
                "IdP {} has no single logout endpoint for the {binding:?} binding",
                self.idp.id
            ))
        })
    }

    /// Builds an AuthnRequest sent with `binding`.
    ///
    /// The request is stored as waiting for a response together with the
    /// caller `parameters`.
    pub async fn build_authn_request(
        &self,
        parameters: RequestParameters,
        binding: SamlBinding,
    ) -> SamlResult<OutgoingMessage> {
        let response_binding = self.idp.response_binding;
        let destination = self.idp.sso.get(binding).ok_or_else(|| {
            SamlError::Building(format!(
                "IdP {} has no single sign-on endpoint for the {binding:?} binding",
                self.idp.id
            ))
        })?;
        let acs_url = self.sp.sso.get(response_binding).ok_or_else(|| {
            SamlError::Building(format!(
                "SP has no assertion consumer endpoint for the {response_binding:?} binding"
            ))
        })?;

        let id = generate_identifier();
        let now = Utc::now();
        let window = self.window();

        let mut request = AuthnRequest::new(id.as_str(), self.sp.entity_id.as_str());
        request.issue_instant = now;
        request.destination = Some(destination.to_string());
        request.force_authn = self.idp.force_authentication;
        request.is_passive = false;
        request.protocol_binding = response_binding;
        request.assertion_consumer_service_url = Some(acs_url.to_string());
        request.attribute_consuming_service_index = self.idp.attribute_consuming_service_index;
        request.not_before = Some(now - window);
        request.not_on_or_after = Some(now + window);

        let xml = self.sign(request.to_element())?;

        let query = QueryAuthnRequest {
            id: id.clone(),
            idp_connector_id: self.idp.id.clone(),
            response_binding,
            parameters,
        };
        self.store
            .store_request(&RequestWaitingForResponse::AuthnRequest(query.clone()))
            .await?;

        let relay_state = RelayState::generate(binding);
        tracing::debug!(id = %id, idp = %self.idp.id, ?binding, "Built AuthnRequest");

        OutgoingMessage::new(
            binding,
            SamlMessageType::Request,
            destination,
            xml,
            Some(relay_state.as_str().to_string()),
            Query::AuthnRequest(query),
        )
    }

    /// Builds a LogoutRequest for the session `session_index`.
    ///
    /// Requires the authentication previously stored for that session.
    pub async fn build_logout_request(
        &self,
        session_index: &str,
        binding: SamlBinding,
    ) -> SamlResult<OutgoingMessage> {
        let authentication = self
            .store
            .find_authentication(session_index)
            .await?
            .ok_or_else(|| {
                SamlError::Building(format!(
                    "No authentication found for session index {session_index}"
                ))
            })?;
        if authentication.subject_id().is_empty() {
            return Err(SamlError::Building(
                "No SAML 2.0 Subject can be found to build the Single Logout Request".to_string(),
            ));
        }
        let destination = self.idp_slo_endpoint(binding)?;

        let id = generate_identifier();
        let now = Utc::now();
        let name_id = NameId::new(authentication.subject_id()).with_format(NAMEID_FORMAT_TRANSIENT);
        let request = LogoutRequest::new(id.as_str(), self.sp.entity_id.as_str(), name_id)
            .with_issue_instant(now)
            .with_destination(destination)
            .with_not_on_or_after(now + self.window())
            .with_session_index(session_index);

        let xml = self.sign(request.to_element())?;

        let query = QuerySloRequest {
            id: id.clone(),
            idp_connector_id: self.idp.id.clone(),
            name_id: Some(authentication.subject_id().to_string()),
            session_indexes: vec![session_index.to_string()],
        };
        self.store
            .store_request(&RequestWaitingForResponse::SloRequest(query.clone()))
            .await?;

        let relay_state = RelayState::generate(binding);
        tracing::debug!(id = %id, idp = %self.idp.id, session_index, "Built LogoutRequest");

        OutgoingMessage::new(
            binding,
            SamlMessageType::Request,
            destination,
            xml,
            Some(relay_state.as_str().to_string()),
            Query::SloRequest(query),
        )
    }

    /// Builds a successful LogoutResponse answering `origin_request_id`.
    ///
    /// Nothing is stored; the response does not expect an answer.
    pub fn build_logout_response(
        &self,
        binding: SamlBinding,
        origin_request_id: &str,
        relay_state: Option<&str>,
    ) -> SamlResult<OutgoingMessage> {
        let destination = self.idp_slo_endpoint(binding)?;
        let id = generate_identifier();
        let response = LogoutResponse::success(id.as_str(), self.sp.entity_id.as_str())
            .with_in_response_to(origin_request_id)
            .with_destination(destination);

        let xml = self.sign(response.to_element())?;
        tracing::debug!(id = %id, in_response_to = origin_request_id, "Built LogoutResponse");

        let query = Query::SloResponse(QuerySloResponse {
            id,
            in_response_to: origin_request_id.to_string(),
            idp_connector_id: self.idp.id.clone(),
            original_request: QuerySloRequest {
                id: origin_request_id.to_string(),
                idp_connector_id: self.idp.id.clone(),
                name_id: None,
                session_indexes: Vec::new(),
            },
            status: Status::success(),
        });

        OutgoingMessage::new(
            binding,
            SamlMessageType::Response,
            destination,
            xml,
            relay_state.map(str::to_string),
            query,
        )
    }
}

/// Registry of IdP connectors, by connector id and by entity ID.
#[derive(Debug, Default)]
pub struct ConnectorRegistry {
    by_id: DashMap<String, Arc<IdpConnector>>,
    by_entity_id: DashMap<String, String>,
}

impl ConnectorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connector, replacing any connector with the same id.
    pub fn register(&self, connector: Arc<IdpConnector>) {
        tracing::debug!(
            id = connector.id(),
            entity_id = connector.entity_id(),
            "Registered IdP connector"
        );
        self.by_entity_id
            .insert(connector.entity_id().to_string(), connector.id().to_string());
        self.by_id.insert(connector.id().to_string(), connector);
    }

    /// Looks up a connector by id.
    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<Arc<IdpConnector>> {
        self.by_id.get(id).map(|c| Arc::clone(c.value()))
    }

    /// Looks up a connector by IdP entity ID.
    #[must_use]
    pub fn by_entity_id(&self, entity_id: &str) -> Option<Arc<IdpConnector>> {
        let id = self.by_entity_id.get(entity_id)?.value().clone();
        self.by_id(&id)
    }

    /// All connectors, ordered by id.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<IdpConnector>> {
        let mut connectors: Vec<_> = self.by_id.iter().map(|c| Arc::clone(c.value())).collect();
        connectors.sort_by(|a, b| a.id().cmp(b.id()));
        connectors
    }

    /// Number of registered connectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns `true` when no connector is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use sp_cache::MemoryCacheProvider;

    use super::*;
    use crate::bindings::HttpRedirectBinding;
    use crate::config::BindingEndpoints;
    use crate::query::Authentication;
    use crate::signature::X509TrustEngine;
    use crate::store::CacheCorrelationStore;
    use crate::types::{SAMLP_NS, SAML_NS};

    const SP_KEY: &str = include_str!("../../../tests/fixtures/sp-key.pem");
    const SP_CERT: &str = include_str!("../../../tests/fixtures/sp-cert.pem");
    const IDP_CERT: &str = include_str!("../../../tests/fixtures/idp-cert.pem");

    fn connector(store: Arc<dyn CorrelationStore>) -> IdpConnector {
        let mut sp = SpConfig::new("sp", "https://sp.example.org");
        sp.sso = BindingEndpoints::default()
            .with(SamlBinding::HttpPost, "https://sp.example.org/cas/Shibboleth.sso/SAML2/POST");

        let mut idp = IdpConfig::new("idp", "https://idp.example.org");
        idp.sso = BindingEndpoints::default()
            .with(SamlBinding::HttpRedirect, "https://idp.example.org/sso")
            .with(SamlBinding::HttpPost, "https://idp.example.org/sso/post");
        idp.slo = BindingEndpoints::default()
            .with(SamlBinding::HttpRedirect, "https://idp.example.org/slo")
            .with(SamlBinding::HttpPost, "https://idp.example.org/slo/post");

        let trust = X509TrustEngine::from_pem_certificates(
            "https://idp.example.org",
            &[IDP_CERT.to_string()],
        )
        .unwrap();
        IdpConnector::new(
            idp,
            Arc::new(sp),
            Arc::new(XmlSigner::from_pem(SP_KEY, Some(SP_CERT)).unwrap()),
            Arc::new(trust),
            store,
        )
    }

    fn store() -> Arc<CacheCorrelationStore<MemoryCacheProvider>> {
        Arc::new(CacheCorrelationStore::new(
            Arc::new(MemoryCacheProvider::new()),
            StdDuration::from_secs(600),
            StdDuration::from_secs(3600),
        ))
    }

    #[tokio::test]
    async fn authn_request_is_stored_and_redirected() {
        let store = store();
        let connector = connector(store.clone());
        let params = RequestParameters::from([("service".to_string(), vec!["app".to_string()])]);

        let message = connector
            .build_authn_request(params.clone(), SamlBinding::HttpRedirect)
            .await
            .unwrap();
        let url = message.redirect_url().unwrap();
        assert!(url.starts_with("https://idp.example.org/sso?RelayState="));

        let decoded = HttpRedirectBinding::decode_url(url).unwrap();
        let element = XmlElement::parse(&decoded.xml).unwrap();
        assert!(element.is(SAMLP_NS, "AuthnRequest"));
        let request = AuthnRequest::from_element(&element).unwrap();

        let stored = store.find_request(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.id(), message.query().id());
        match stored {
            RequestWaitingForResponse::AuthnRequest(query) => {
                assert_eq!(query.parameters, params);
                assert_eq!(query.idp_connector_id, "idp");
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(request.force_authn);
        assert!(!request.is_passive);
        assert_eq!(request.protocol_binding, SamlBinding::HttpPost);
        assert_eq!(request.destination.as_deref(), Some("https://idp.example.org/sso"));
        assert_eq!(
            request.assertion_consumer_service_url.as_deref(),
            Some("https://sp.example.org/cas/Shibboleth.sso/SAML2/POST")
        );
        assert_eq!(request.attribute_consuming_service_index, Some(1));
        assert_eq!(request.issuer, "https://sp.example.org");
        assert!(!request.name_id_policy.allow_create);
        let window = request.not_on_or_after.unwrap() - request.not_before.unwrap();
        assert_eq!(window, Duration::milliseconds(600_000));
        assert!(element.child(crate::types::XMLDSIG_NS, "Signature").is_some());

        let relay = RelayState::decode(message.relay_state().unwrap()).unwrap();
        assert_eq!(relay.binding(), SamlBinding::HttpRedirect);
    }

    #[tokio::test]
    async fn missing_endpoint_is_building_error() {
        let connector = connector(store());
        let mut idp = connector.idp.clone();
        idp.sso = BindingEndpoints::default();
        let connector = IdpConnector { idp, ..connector };
        let err = connector
            .build_authn_request(RequestParameters::new(), SamlBinding::HttpRedirect)
            .await
            .unwrap_err();
        assert!(matches!(err, SamlError::Building(_)));
    }

    #[tokio::test]
    async fn logout_request_requires_authentication() {
        let store = store();
        let connector = connector(store.clone());
        let err = connector
            .build_logout_request("_unknown", SamlBinding::HttpRedirect)
            .await
            .unwrap_err();
        assert!(matches!(err, SamlError::Building(_)));

        store
            .store_authentication(&Authentication::builder("https://idp.example.org", "", "_anon").lock())
            .await
            .unwrap();
        let err = connector
            .build_logout_request("_anon", SamlBinding::HttpRedirect)
            .await
            .unwrap_err();
        assert!(
            matches!(err, SamlError::Building(msg) if msg.contains("No SAML 2.0 Subject"))
        );
    }

    #[tokio::test]
    async fn logout_request_names_subject_and_session() {
        let store = store();
        let connector = connector(store.clone());
        store
            .store_authentication(
                &Authentication::builder("https://idp.example.org", "alice", "_s1").lock(),
            )
            .await
            .unwrap();

        let message = connector
            .build_logout_request("_s1", SamlBinding::HttpPost)
            .await
            .unwrap();
        assert_eq!(message.endpoint_url(), "https://idp.example.org/slo/post");

        let request = LogoutRequest::from_element(&XmlElement::parse(message.message()).unwrap())
            .unwrap();
        assert_eq!(request.name_id().map(|n| n.value.as_str()), Some("alice"));
        assert_eq!(request.session_indexes, vec!["_s1".to_string()]);
        assert!(request.not_on_or_after.is_some());
        assert!(store.find_request(&request.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn logout_response_is_not_stored() {
        let store = store();
        let connector = connector(store.clone());
        let message = connector
            .build_logout_response(SamlBinding::HttpPost, "_origin", Some("rs"))
            .unwrap();

        let element = XmlElement::parse(message.message()).unwrap();
        let response = LogoutResponse::from_element(&element).unwrap();
        assert_eq!(response.in_response_to.as_deref(), Some("_origin"));
        assert!(response.status.is_success());
        assert_eq!(element.child_text(SAML_NS, "Issuer"), Some("https://sp.example.org"));
        assert!(store.find_request(&response.id).await.unwrap().is_none());
        assert_eq!(message.post_params().unwrap()[0].1, "rs");
    }

    #[test]
    fn registry_resolves_by_id_and_entity() {
        let registry = ConnectorRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(connector(store())));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.by_id("idp").unwrap().entity_id(), "https://idp.example.org");
        assert_eq!(registry.by_entity_id("https://idp.example.org").unwrap().id(), "idp");
        assert!(registry.by_id("other").is_none());
        assert!(registry.by_entity_id("https://other").is_none());
        assert_eq!(registry.all().len(), 1);
    }
}
