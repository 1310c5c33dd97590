//! The service provider processor.
//!
//! [`SpProcessor`] owns everything inbound processing needs: the SP
//! configuration, the IdP connectors, the correlation store, the decryption
//! key and the host hooks for single logout.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{ProcessorConfig, SamlConfig, SpConfig};
use crate::connector::{ConnectorRegistry, IdpConnector};
use crate::error::{SamlError, SamlResult};
use crate::http::InboundRequest;
use crate::message::{IncomingMessage, OutgoingMessage};
use crate::processor::build_processor;
use crate::query::{Authentication, Query};
use crate::security::{log_security_failure, Decrypter, XmlEncDecrypter};
use crate::signature::{X509TrustEngine, XmlSigner};
use crate::store::CorrelationStore;
use crate::types::SamlBinding;

/// Host hook terminating the local session of an IdP session.
#[async_trait]
pub trait SingleLogoutHandler: Send + Sync {
    /// Logs out the local session bound to `session_index`.
    ///
    /// Returns `true` when a session was terminated.
    async fn logout(&self, session_index: &str) -> bool;
}

/// Delivers LogoutResponses to IdPs.
#[async_trait]
pub trait SloResponseSender: Send + Sync {
    /// Sends `message` and returns the HTTP status of the IdP answer.
    async fn send(&self, message: &OutgoingMessage) -> SamlResult<u16>;
}

/// [`SloResponseSender`] on top of a `reqwest` client.
///
/// POST messages are sent as form parameters, Redirect messages as a GET of
/// the redirect URL.
#[derive(Debug, Clone)]
pub struct HttpSloResponseSender {
    client: reqwest::Client,
}

impl HttpSloResponseSender {
    /// Creates a sender with a read timeout.
    pub fn new(timeout: Duration) -> SamlResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SamlError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SloResponseSender for HttpSloResponseSender {
    async fn send(&self, message: &OutgoingMessage) -> SamlResult<u16> {
        let request = match message.binding() {
            SamlBinding::HttpPost => self
                .client
                .post(message.endpoint_url())
                .form(message.post_params()?),
            SamlBinding::HttpRedirect => self.client.get(message.redirect_url()?),
        };
        let response = request
            .send()
            .await
            .map_err(|e| SamlError::Transport(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// Inbound SAML processing for one service provider.
pub struct SpProcessor {
    sp: Arc<SpConfig>,
    processor: ProcessorConfig,
    registry: Arc<ConnectorRegistry>,
    store: Arc<dyn CorrelationStore>,
    decrypter: Option<Arc<dyn Decrypter>>,
    logout_handler: Option<Arc<dyn SingleLogoutHandler>>,
    response_sender: Arc<dyn SloResponseSender>,
}

impl fmt::Debug for SpProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpProcessor")
            .field("entity_id", &self.sp.entity_id)
            .field("idps", &self.registry.len())
            .field("decryption", &self.decrypter.is_some())
            .field("logout_handler", &self.logout_handler.is_some())
            .finish_non_exhaustive()
    }
}

impl SpProcessor {
    /// Starts building a processor.
    #[must_use]
    pub fn builder(sp: SpConfig, store: Arc<dyn CorrelationStore>) -> SpProcessorBuilder {
        SpProcessorBuilder {
            sp: Arc::new(sp),
            processor: ProcessorConfig::default(),
            registry: Arc::new(ConnectorRegistry::new()),
            store,
            decrypter: None,
            logout_handler: None,
            response_sender: None,
        }
    }

    /// Wires a processor from configuration.
    ///
    /// The signing key is required; the decryption key defaults to it. One
    /// connector is registered per configured IdP, trusting that IdP's
    /// signing certificates.
    pub fn from_config(
        config: &SamlConfig,
        store: Arc<dyn CorrelationStore>,
    ) -> SamlResult<SpProcessorBuilder> {
        config.validate()?;
        let sp = &config.sp;

        let key_pem = sp
            .signing_key
            .as_ref()
            .ok_or_else(|| SamlError::Config("SP signing_key is required".to_string()))?
            .load()?;
        let certificate_pem = sp.signing_certificate.as_ref().map(|c| c.load()).transpose()?;
        let signer = Arc::new(XmlSigner::from_pem(&key_pem, certificate_pem.as_deref())?);

        let decryption_pem = match &sp.decryption_key {
            Some(source) => source.load()?,
            None => key_pem,
        };
        let decrypter: Arc<dyn Decrypter> = Arc::new(XmlEncDecrypter::from_pem(&decryption_pem)?);

        let mut builder = Self::builder(sp.clone(), store)
            .processor_config(config.processor.clone())
            .decrypter(decrypter);

        for idp in &config.idps {
            let trust_engine = X509TrustEngine::from_pem_certificates(
                idp.entity_id.as_str(),
                &idp.signing_certificates,
            )?
            .allow_sha1(idp.allow_sha1);
            let connector = IdpConnector::new(
                idp.clone(),
                Arc::clone(&builder.sp),
                Arc::clone(&signer),
                Arc::new(trust_engine),
                Arc::clone(&builder.store),
            );
            builder = builder.connector(connector);
        }
        tracing::info!(
            entity_id = %sp.entity_id,
            idps = config.idps.len(),
            "Configured SAML service provider"
        );
        Ok(builder)
    }

    /// SP configuration.
    #[must_use]
    pub fn sp_config(&self) -> &SpConfig {
        &self.sp
    }

    /// Inbound processing settings.
    #[must_use]
    pub const fn processor_config(&self) -> &ProcessorConfig {
        &self.processor
    }

    /// IdP connectors.
    #[must_use]
    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// Correlation store.
    #[must_use]
    pub fn store(&self) -> &dyn CorrelationStore {
        self.store.as_ref()
    }

    /// Decrypter for encrypted content, if a key is configured.
    #[must_use]
    pub fn decrypter(&self) -> Option<&dyn Decrypter> {
        self.decrypter.as_deref()
    }

    /// Validates an inbound SAML request.
    ///
    /// Authentications carried by an AuthnResponse are stored all or none;
    /// a session index seen before is reported as a replay.
    pub async fn process_incoming(&self, request: InboundRequest) -> SamlResult<IncomingMessage> {
        let processor = build_processor(self, request).await?;
        let incoming = processor.process().await?;

        if let Query::AuthnResponse(response) = &incoming.query {
            match self.store_authentications(&response.authentications).await {
                Ok(()) => {}
                Err(SamlError::DuplicateAuthentication(session_index)) => {
                    let err = SamlError::Security(format!(
                        "Attempt to replay a previous authentication (session index {session_index})"
                    ));
                    log_security_failure(&err, Some(&incoming.message));
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
            tracing::info!(
                response = %response.id,
                idp = %response.idp_connector_id,
                authentications = response.authentications.len(),
                "Accepted AuthnResponse"
            );
        }
        Ok(incoming)
    }

    /// Stores every authentication of one response, or none of them.
    ///
    /// A session index repeated within the batch is rejected before anything
    /// is written. When the store refuses one entry, the entries already
    /// written for the batch are removed again.
    async fn store_authentications(&self, authentications: &[Authentication]) -> SamlResult<()> {
        let mut indexes = HashSet::new();
        if let Some(repeated) = authentications
            .iter()
            .map(Authentication::session_index)
            .find(|index| !indexes.insert(*index))
        {
            return Err(SamlError::DuplicateAuthentication(repeated.to_string()));
        }

        for (stored, authentication) in authentications.iter().enumerate() {
            if let Err(err) = self.store.store_authentication(authentication).await {
                for written in &authentications[..stored] {
                    if let Err(cleanup) =
                        self.store.remove_authentication(written.session_index()).await
                    {
                        tracing::warn!(
                            session_index = written.session_index(),
                            error = %cleanup,
                            "Unable to roll back a stored authentication"
                        );
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Terminates the session bound to `session_index`.
    ///
    /// The stored authentication is removed, then the host handler is
    /// called. Without a handler nothing is terminated locally and `false`
    /// is returned.
    pub async fn logout(&self, session_index: &str) -> SamlResult<bool> {
        self.store.remove_authentication(session_index).await?;
        match &self.logout_handler {
            Some(handler) => Ok(handler.logout(session_index).await),
            None => {
                tracing::warn!(
                    session_index,
                    "No single logout handler configured, local session left untouched"
                );
                Ok(false)
            }
        }
    }

    /// Delivers a LogoutResponse to its IdP.
    pub async fn send_slo_response(&self, message: &OutgoingMessage) -> SamlResult<u16> {
        self.response_sender.send(message).await
    }
}

/// Builder for [`SpProcessor`].
pub struct SpProcessorBuilder {
    sp: Arc<SpConfig>,
    processor: ProcessorConfig,
    registry: Arc<ConnectorRegistry>,
    store: Arc<dyn CorrelationStore>,
    decrypter: Option<Arc<dyn Decrypter>>,
    logout_handler: Option<Arc<dyn SingleLogoutHandler>>,
    response_sender: Option<Arc<dyn SloResponseSender>>,
}

impl fmt::Debug for SpProcessorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpProcessorBuilder")
            .field("entity_id", &self.sp.entity_id)
            .field("idps", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl SpProcessorBuilder {
    /// SP configuration shared with connectors.
    #[must_use]
    pub fn sp_config(&self) -> Arc<SpConfig> {
        Arc::clone(&self.sp)
    }

    /// Correlation store shared with connectors.
    #[must_use]
    pub fn store(&self) -> Arc<dyn CorrelationStore> {
        Arc::clone(&self.store)
    }

    /// Sets the processing settings.
    #[must_use]
    pub fn processor_config(mut self, processor: ProcessorConfig) -> Self {
        self.processor = processor;
        self
    }

    /// Registers an IdP connector.
    #[must_use]
    pub fn connector(self, connector: IdpConnector) -> Self {
        self.registry.register(Arc::new(connector));
        self
    }

    /// Sets the decrypter for encrypted assertions, identifiers and attributes.
    #[must_use]
    pub fn decrypter(mut self, decrypter: Arc<dyn Decrypter>) -> Self {
        self.decrypter = Some(decrypter);
        self
    }

    /// Sets the host single logout hook.
    #[must_use]
    pub fn logout_handler(mut self, handler: Arc<dyn SingleLogoutHandler>) -> Self {
        self.logout_handler = Some(handler);
        self
    }

    /// Replaces the LogoutResponse transport.
    #[must_use]
    pub fn response_sender(mut self, sender: Arc<dyn SloResponseSender>) -> Self {
        self.response_sender = Some(sender);
        self
    }

    /// Builds the processor.
    ///
    /// Without an explicit sender, LogoutResponses are delivered over HTTP
    /// with the configured timeout.
    pub fn build(self) -> SamlResult<SpProcessor> {
        let response_sender = match self.response_sender {
            Some(sender) => sender,
            None => Arc::new(HttpSloResponseSender::new(Duration::from_secs(
                self.processor.slo_response_timeout_seconds,
            ))?),
        };
        Ok(SpProcessor {
            sp: self.sp,
            processor: self.processor,
            registry: self.registry,
            store: self.store,
            decrypter: self.decrypter,
            logout_handler: self.logout_handler,
            response_sender,
        })
    }
}
