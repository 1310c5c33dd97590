//! Host facing entry point.

use std::sync::Arc;

use async_trait::async_trait;

use crate::connector::IdpConnector;
use crate::error::{SamlError, SamlResult};
use crate::http::InboundRequest;
use crate::message::{IncomingMessage, OutgoingMessage};
use crate::query::RequestParameters;
use crate::sp::SpProcessor;
use crate::types::SamlBinding;

/// Supplies the IdP session index of the current user.
#[async_trait]
pub trait SessionIndexProvider: Send + Sync {
    /// Returns the session index of the user asking to log out, if any.
    async fn current_session_index(&self) -> Option<String>;
}

/// High level SAML operations for a host application.
#[derive(Debug, Clone)]
pub struct SpFacade {
    processor: Arc<SpProcessor>,
}

impl SpFacade {
    /// Wraps a processor.
    #[must_use]
    pub fn new(processor: Arc<SpProcessor>) -> Self {
        Self { processor }
    }

    /// The wrapped processor.
    #[must_use]
    pub fn processor(&self) -> &SpProcessor {
        &self.processor
    }

    /// Configured IdPs, ordered by connector id.
    #[must_use]
    pub fn idps(&self) -> Vec<Arc<IdpConnector>> {
        self.processor.registry().all()
    }

    fn connector(&self, idp_id: &str) -> SamlResult<Arc<IdpConnector>> {
        self.processor
            .registry()
            .by_id(idp_id)
            .ok_or_else(|| SamlError::Building(format!("Unknown IdP {idp_id}")))
    }

    /// Builds an AuthnRequest for the IdP `idp_id`.
    ///
    /// `binding` defaults to the request binding configured for that IdP.
    pub async fn authn_request(
        &self,
        idp_id: &str,
        binding: Option<SamlBinding>,
        parameters: RequestParameters,
    ) -> SamlResult<OutgoingMessage> {
        let connector = self.connector(idp_id)?;
        let binding = binding.unwrap_or(connector.idp_config().request_binding);
        connector.build_authn_request(parameters, binding).await
    }

    /// Builds a LogoutRequest for the session supplied by `sessions`.
    ///
    /// The IdP is the one that authenticated that session.
    pub async fn slo_request(
        &self,
        sessions: &dyn SessionIndexProvider,
        binding: SamlBinding,
    ) -> SamlResult<OutgoingMessage> {
        let session_index = sessions.current_session_index().await.ok_or_else(|| {
            SamlError::Building("No session index available for single logout".to_string())
        })?;
        let authentication = self
            .processor
            .store()
            .find_authentication(&session_index)
            .await?
            .ok_or_else(|| {
                SamlError::Building(format!(
                    "No authentication found for session index {session_index}"
                ))
            })?;
        let connector = self
            .processor
            .registry()
            .by_entity_id(authentication.idp_entity_id())
            .ok_or_else(|| {
                SamlError::Building(format!(
                    "No IdP connector for {}",
                    authentication.idp_entity_id()
                ))
            })?;
        connector.build_logout_request(&session_index, binding).await
    }

    /// Validates an inbound SAML request.
    pub async fn process_incoming(&self, request: InboundRequest) -> SamlResult<IncomingMessage> {
        self.processor.process_incoming(request).await
    }
}
