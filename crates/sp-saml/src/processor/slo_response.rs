//! Processing of `samlp:LogoutResponse` messages answering our LogoutRequests.

use std::sync::Arc;

use super::{check_same_idp, find_connector, request_type_mismatch, take_original_request, Context};
use crate::connector::IdpConnector;
use crate::error::{SamlError, SamlResult};
use crate::query::{Query, QuerySloResponse, RequestWaitingForResponse};
use crate::security::validate_signature_trust;
use crate::types::LogoutResponse;
use crate::xml::XmlElement;

pub(super) struct SloResponseProcessor {
    response: LogoutResponse,
    connector: Option<Arc<IdpConnector>>,
}

impl SloResponseProcessor {
    pub(super) fn new(root: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            response: LogoutResponse::from_element(root)?,
            connector: None,
        })
    }

    pub(super) fn check_security(&mut self, ctx: Context<'_>) -> SamlResult<()> {
        let issuer = self.response.issuer.as_deref();
        let connector = find_connector(ctx.sp, issuer)?;
        validate_signature_trust(&self.response.element, issuer, connector.trust_engine())
            .require("The SLO Response")?;
        self.connector = Some(connector);
        Ok(())
    }

    pub(super) fn process(&self) {
        if !self.response.status.is_success() {
            tracing::warn!(
                id = %self.response.id,
                status = %self.response.status.code,
                "IdP reported an unsuccessful logout"
            );
        }
    }

    pub(super) async fn build(&mut self, ctx: Context<'_>) -> SamlResult<Query> {
        let original =
            take_original_request(ctx.sp, self.response.in_response_to.as_deref()).await?;
        let original = match original {
            RequestWaitingForResponse::SloRequest(original) => original,
            other => return Err(request_type_mismatch(&other)),
        };
        let connector = self
            .connector
            .as_deref()
            .ok_or_else(|| SamlError::Processing("IdP connector not resolved".to_string()))?;
        check_same_idp(&original.idp_connector_id, connector)?;

        Ok(Query::SloResponse(QuerySloResponse {
            id: self.response.id.clone(),
            in_response_to: original.id.clone(),
            idp_connector_id: connector.id().to_string(),
            original_request: original,
            status: self.response.status.clone(),
        }))
    }
}
