//! Common test utilities and fixtures.
//!
//! [`TestSp`] is a fully wired service provider backed by the memory cache.
//! [`TestIdp`] plays the identity provider: it reads the messages the SP
//! sends and builds signed answers with the IdP fixture key.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sp_cache::MemoryCacheProvider;
use sp_saml::bindings::{HttpPostBinding, HttpRedirectBinding, SamlMessageType};
use sp_saml::config::{BindingEndpoints, IdpConfig, PemSource, ProcessorConfig, SpConfig};
use sp_saml::security::XmlEncrypter;
use sp_saml::signature::XmlSigner;
use sp_saml::types::{format_instant, AuthnRequest, LogoutRequest, SamlBinding};
use sp_saml::xml::XmlElement;
use sp_saml::{
    Authentication, CacheCorrelationStore, CorrelationStore, InboundRequest, OutgoingMessage,
    Query, SamlConfig, SamlResult, SessionIndexProvider, SingleLogoutHandler, SloResponseSender,
    SpFacade, SpProcessor,
};

pub const SP_ENTITY: &str = "https://sp.example.org";
pub const IDP_ENTITY: &str = "https://idp.example.org";
pub const SECOND_IDP_ENTITY: &str = "https://idp2.example.org";

pub const ACS_POST: &str = "https://sp.example.org/cas/Shibboleth.sso/SAML2/POST";
pub const SP_SLO_POST: &str = "https://sp.example.org/cas/Shibboleth.sso/SLO/POST";
pub const SP_SLO_REDIRECT: &str = "https://sp.example.org/cas/Shibboleth.sso/SLO/Redirect";

pub const IDP_SSO: &str = "https://idp.example.org/profile/SAML2/Redirect/SSO";
pub const IDP_SLO_POST: &str = "https://idp.example.org/profile/SAML2/POST/SLO";
pub const IDP_SLO_REDIRECT: &str = "https://idp.example.org/profile/SAML2/Redirect/SLO";

const SP_KEY: &str = include_str!("../../fixtures/sp-key.pem");
const SP_CERT: &str = include_str!("../../fixtures/sp-cert.pem");
const IDP_KEY: &str = include_str!("../../fixtures/idp-key.pem");
const IDP_CERT: &str = include_str!("../../fixtures/idp-cert.pem");
const ROGUE_KEY: &str = include_str!("../../fixtures/rogue-key.pem");

const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";
const TRANSIENT: &str = "urn:oasis:names:tc:SAML:2.0:nameid-format:transient";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sp_saml=debug,saml_security=warn")
        .with_test_writer()
        .try_init();
}

/// Records every session the SP asks the host to terminate.
#[derive(Debug, Default)]
pub struct RecordingLogoutHandler {
    pub sessions: Mutex<Vec<String>>,
}

#[async_trait]
impl SingleLogoutHandler for RecordingLogoutHandler {
    async fn logout(&self, session_index: &str) -> bool {
        self.sessions.lock().unwrap().push(session_index.to_string());
        true
    }
}

/// A LogoutResponse captured by [`RecordingSender`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub endpoint: String,
    pub message: String,
    pub relay_state: Option<String>,
    pub params: Vec<(String, String)>,
}

/// Captures LogoutResponses instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<SentMessage>>,
    pub unreachable: bool,
}

#[async_trait]
impl SloResponseSender for RecordingSender {
    async fn send(&self, message: &OutgoingMessage) -> SamlResult<u16> {
        self.sent.lock().unwrap().push(SentMessage {
            endpoint: message.endpoint_url().to_string(),
            message: message.message().to_string(),
            relay_state: message.relay_state().map(str::to_string),
            params: message.post_params()?.to_vec(),
        });
        if self.unreachable {
            return Err(sp_saml::SamlError::Transport("connection refused".to_string()));
        }
        Ok(200)
    }
}

/// Hands out a fixed session index.
pub struct FixedSession(pub Option<String>);

#[async_trait]
impl SessionIndexProvider for FixedSession {
    async fn current_session_index(&self) -> Option<String> {
        self.0.clone()
    }
}

pub fn saml_config() -> SamlConfig {
    let mut sp = SpConfig::new("sp", SP_ENTITY);
    sp.sso = BindingEndpoints::default().with(SamlBinding::HttpPost, ACS_POST);
    sp.slo = BindingEndpoints::default()
        .with(SamlBinding::HttpPost, SP_SLO_POST)
        .with(SamlBinding::HttpRedirect, SP_SLO_REDIRECT);
    sp.signing_key = Some(PemSource::Inline {
        pem: SP_KEY.to_string(),
    });
    sp.signing_certificate = Some(PemSource::Inline {
        pem: SP_CERT.to_string(),
    });

    let mut idp = IdpConfig::new("idp", IDP_ENTITY);
    idp.sso = BindingEndpoints::default().with(SamlBinding::HttpRedirect, IDP_SSO);
    idp.slo = BindingEndpoints::default()
        .with(SamlBinding::HttpPost, IDP_SLO_POST)
        .with(SamlBinding::HttpRedirect, IDP_SLO_REDIRECT);
    idp.signing_certificates = vec![IDP_CERT.to_string()];

    SamlConfig {
        sp,
        idps: vec![idp],
        processor: ProcessorConfig::default(),
    }
}

/// [`saml_config`] plus a second IdP, `idp2`, that signs with the SP
/// fixture pair.
pub fn two_idp_config() -> SamlConfig {
    let mut config = saml_config();
    let mut idp = IdpConfig::new("idp2", SECOND_IDP_ENTITY);
    idp.sso = BindingEndpoints::default()
        .with(SamlBinding::HttpRedirect, "https://idp2.example.org/SSO");
    idp.signing_certificates = vec![SP_CERT.to_string()];
    config.idps.push(idp);
    config
}

/// A service provider wired like a production deployment.
pub struct TestSp {
    pub facade: SpFacade,
    pub store: Arc<dyn CorrelationStore>,
    pub handler: Arc<RecordingLogoutHandler>,
    pub sender: Arc<RecordingSender>,
}

impl TestSp {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_sender(RecordingSender::default())
    }

    pub fn with_sender(sender: RecordingSender) -> anyhow::Result<Self> {
        Self::with_config(&saml_config(), sender)
    }

    pub fn with_config(config: &SamlConfig, sender: RecordingSender) -> anyhow::Result<Self> {
        init_tracing();
        let store: Arc<dyn CorrelationStore> = Arc::new(CacheCorrelationStore::new(
            Arc::new(MemoryCacheProvider::new()),
            Duration::from_secs(600),
            Duration::from_secs(3600),
        ));
        let handler = Arc::new(RecordingLogoutHandler::default());
        let sender = Arc::new(sender);

        let processor = SpProcessor::from_config(config, Arc::clone(&store))?
            .logout_handler(handler.clone())
            .response_sender(sender.clone())
            .build()?;

        Ok(Self {
            facade: SpFacade::new(Arc::new(processor)),
            store,
            handler,
            sender,
        })
    }

    /// Sends an AuthnRequest and returns it as the IdP reads it.
    pub async fn start_login(&self) -> anyhow::Result<(AuthnRequest, String)> {
        self.start_login_at("idp").await
    }

    pub async fn start_login_at(&self, idp_id: &str) -> anyhow::Result<(AuthnRequest, String)> {
        let message = self
            .facade
            .authn_request(idp_id, Some(SamlBinding::HttpRedirect), Default::default())
            .await?;
        let decoded = HttpRedirectBinding::decode_url(message.redirect_url()?)?;
        let request = AuthnRequest::from_element(&XmlElement::parse(&decoded.xml)?)?;
        Ok((request, message.relay_state().unwrap_or_default().to_string()))
    }

    /// Runs a complete login and returns the established authentication.
    pub async fn login(&self, idp: &TestIdp, session_index: &str) -> anyhow::Result<Authentication> {
        let (request, relay_state) = self.start_login().await?;
        let mut assertion = idp.assertion(&request.id, session_index);
        idp.sign(&mut assertion);
        let mut response = idp.response(&request.id, vec![assertion]);
        idp.sign(&mut response);

        let incoming = self
            .facade
            .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
            .await?;
        match incoming.query {
            Query::AuthnResponse(mut response) => Ok(response.authentications.remove(0)),
            other => anyhow::bail!("unexpected query {other:?}"),
        }
    }
}

/// The identity provider side of the exchanges.
pub struct TestIdp {
    entity_id: &'static str,
    signer: XmlSigner,
    rogue: XmlSigner,
    encrypter: XmlEncrypter,
}

impl TestIdp {
    pub fn new() -> Self {
        Self::with_signer(IDP_ENTITY, XmlSigner::from_pem(IDP_KEY, Some(IDP_CERT)).unwrap())
    }

    /// The `idp2` of [`two_idp_config`].
    pub fn second() -> Self {
        Self::with_signer(
            SECOND_IDP_ENTITY,
            XmlSigner::from_pem(SP_KEY, Some(SP_CERT)).unwrap(),
        )
    }

    fn with_signer(entity_id: &'static str, signer: XmlSigner) -> Self {
        Self {
            entity_id,
            signer,
            rogue: XmlSigner::from_pem(ROGUE_KEY, None).unwrap(),
            encrypter: XmlEncrypter::from_certificate_pem(SP_CERT).unwrap(),
        }
    }

    pub fn sign(&self, element: &mut XmlElement) {
        self.signer.sign(element).unwrap();
    }

    pub fn sign_with_rogue_key(&self, element: &mut XmlElement) {
        self.rogue.sign(element).unwrap();
    }

    pub fn encrypt(&self, assertion: &XmlElement) -> XmlElement {
        self.encrypt_as(assertion, "EncryptedAssertion")
    }

    /// Encrypts `element` for the SP into a `saml:<wrapper>`.
    pub fn encrypt_as(&self, element: &XmlElement, wrapper: &str) -> XmlElement {
        self.encrypter.encrypt(element, wrapper).unwrap().element
    }

    /// A valid assertion for `subject_id@example.org` with a `ctemail` attribute.
    pub fn assertion(&self, in_response_to: &str, session_index: &str) -> XmlElement {
        self.assertion_with(in_response_to, session_index, ChronoDuration::minutes(5))
    }

    pub fn assertion_with(
        &self,
        in_response_to: &str,
        session_index: &str,
        validity: ChronoDuration,
    ) -> XmlElement {
        let now = Utc::now();
        let not_before = format_instant(&(now - ChronoDuration::minutes(5)));
        let not_on_or_after = format_instant(&(now + validity));
        let xml = format!(
            r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_a{session_index}{}" IssueInstant="{now}" Version="2.0"><saml:Issuer>{entity}</saml:Issuer><saml:Subject><saml:NameID Format="{TRANSIENT}">user@example.org</saml:NameID><saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer"><saml:SubjectConfirmationData InResponseTo="{in_response_to}" NotOnOrAfter="{not_on_or_after}" Recipient="{ACS_POST}"/></saml:SubjectConfirmation></saml:Subject><saml:Conditions NotBefore="{not_before}" NotOnOrAfter="{not_on_or_after}"><saml:AudienceRestriction><saml:Audience>{SP_ENTITY}</saml:Audience></saml:AudienceRestriction></saml:Conditions><saml:AuthnStatement AuthnInstant="{now}" SessionIndex="{session_index}"><saml:AuthnContext><saml:AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport</saml:AuthnContextClassRef></saml:AuthnContext></saml:AuthnStatement><saml:AttributeStatement><saml:Attribute Name="ctemail"><saml:AttributeValue>testValue</saml:AttributeValue></saml:Attribute><saml:Attribute Name="groups"><saml:AttributeValue>staff</saml:AttributeValue><saml:AttributeValue></saml:AttributeValue><saml:AttributeValue>admins</saml:AttributeValue></saml:Attribute></saml:AttributeStatement></saml:Assertion>"#,
            unique(),
            now = format_instant(&now),
            entity = self.entity_id,
        );
        XmlElement::parse(&xml).unwrap()
    }

    /// A successful response carrying `assertions`.
    pub fn response(&self, in_response_to: &str, assertions: Vec<XmlElement>) -> XmlElement {
        let xml = format!(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r{}" InResponseTo="{in_response_to}" IssueInstant="{}" Destination="{ACS_POST}" Version="2.0"><saml:Issuer>{}</saml:Issuer><samlp:Status><samlp:StatusCode Value="{STATUS_SUCCESS}"/></samlp:Status></samlp:Response>"#,
            unique(),
            format_instant(&Utc::now()),
            self.entity_id,
        );
        let mut response = XmlElement::parse(&xml).unwrap();
        response.children.extend(assertions);
        response
    }

    /// A LogoutRequest for `session_index`, valid for five minutes.
    pub fn logout_request(&self, session_index: &str, signed: bool) -> XmlElement {
        self.logout_request_with(session_index, signed, ChronoDuration::minutes(5))
    }

    pub fn logout_request_with(
        &self,
        session_index: &str,
        signed: bool,
        validity: ChronoDuration,
    ) -> XmlElement {
        let now = Utc::now();
        let mut element = LogoutRequest::new(
            format!("_l{}", unique()),
            self.entity_id,
            sp_saml::types::NameId::new("user@example.org").with_format(TRANSIENT),
        )
        .with_issue_instant(now)
        .with_destination(SP_SLO_REDIRECT)
        .with_not_on_or_after(now + validity)
        .with_session_index(session_index)
        .to_element();
        if signed {
            self.sign(&mut element);
        }
        element
    }

    /// A signed successful LogoutResponse answering `in_response_to`.
    pub fn logout_response(&self, in_response_to: &str) -> XmlElement {
        let mut element = self.unsigned_logout_response(in_response_to);
        self.sign(&mut element);
        element
    }

    pub fn unsigned_logout_response(&self, in_response_to: &str) -> XmlElement {
        sp_saml::types::LogoutResponse::success(format!("_lr{}", unique()), self.entity_id)
            .with_in_response_to(in_response_to)
            .with_destination(SP_SLO_POST)
            .to_element()
    }
}

/// An HTTP-POST request carrying `message` as `SAMLResponse`.
pub fn post(url: &str, message: &XmlElement, relay_state: Option<&str>) -> InboundRequest {
    post_param(url, "SAMLResponse", message, relay_state)
}

pub fn post_param(
    url: &str,
    param: &str,
    message: &XmlElement,
    relay_state: Option<&str>,
) -> InboundRequest {
    let mut form = vec![(
        param.to_string(),
        HttpPostBinding::encode_message(&message.to_xml()).unwrap(),
    )];
    if let Some(relay_state) = relay_state {
        form.push(("RelayState".to_string(), relay_state.to_string()));
    }
    InboundRequest::post(url, form).unwrap()
}

/// An HTTP-Redirect request carrying `message` as `SAMLRequest`.
pub fn redirect_request(url: &str, message: &XmlElement, relay_state: &str) -> InboundRequest {
    let encoded = HttpRedirectBinding::encode_message(&message.to_xml()).unwrap();
    let url =
        HttpRedirectBinding::build_url(url, SamlMessageType::Request, &encoded, relay_state)
            .unwrap();
    InboundRequest::get(&url).unwrap()
}

fn unique() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!(
        "{}{}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}
