//! Processing of IdP initiated `samlp:LogoutRequest` messages.

use std::sync::Arc;

use super::{clock_skew, find_connector, Context};
use crate::connector::IdpConnector;
use crate::error::{SamlError, SamlResult};
use crate::query::{Query, QuerySloRequest};
use crate::security::{validate_signature_trust, validate_times};
use crate::signature::SignatureTrust;
use crate::types::{LogoutRequest, SamlBinding, SubjectIdentifier};
use crate::xml::XmlElement;

pub(super) struct SloRequestProcessor {
    request: LogoutRequest,
    name_id: Option<String>,
    connector: Option<Arc<IdpConnector>>,
}

impl SloRequestProcessor {
    pub(super) fn new(root: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            request: LogoutRequest::from_element(root)?,
            name_id: None,
            connector: None,
        })
    }

    fn connector(&self) -> SamlResult<&IdpConnector> {
        self.connector
            .as_deref()
            .ok_or_else(|| SamlError::Processing("IdP connector not resolved".to_string()))
    }

    /// Resolves the principal, decrypting an `EncryptedID`.
    pub(super) fn pre_process(&mut self, ctx: Context<'_>) -> SamlResult<()> {
        let identifier = match &self.request.identifier {
            Some(SubjectIdentifier::Encrypted(encrypted)) => {
                let decrypter = ctx.sp.decrypter().ok_or_else(|| {
                    SamlError::Processing(
                        "Decryption problem encountered: no decryption key is configured"
                            .to_string(),
                    )
                })?;
                Some(decrypter.decrypt_identifier(encrypted)?)
            }
            other => other.clone(),
        };

        self.name_id = match identifier {
            Some(SubjectIdentifier::NameId(name_id)) => Some(name_id.value),
            Some(SubjectIdentifier::Other(name)) => {
                return Err(SamlError::UnsupportedOperation(format!(
                    "Only NameID is currently supported, found {name}"
                )))
            }
            Some(SubjectIdentifier::Encrypted(_)) | None => None,
        };
        Ok(())
    }

    /// The request itself must carry a trusted signature.
    pub(super) fn check_security(&mut self, ctx: Context<'_>) -> SamlResult<()> {
        let issuer = self.request.issuer.as_deref();
        let connector = find_connector(ctx.sp, issuer)?;
        match validate_signature_trust(&self.request.element, issuer, connector.trust_engine()) {
            SignatureTrust::Trusted => {}
            SignatureTrust::Absent => {
                return Err(SamlError::Security(
                    "The SLO Request cannot be trusted, signature is missing".to_string(),
                ))
            }
            SignatureTrust::Invalid(reason) => {
                return Err(SamlError::Security(format!(
                    "The SLO Request signature cannot be trusted: {reason}"
                )))
            }
        }
        self.connector = Some(connector);
        Ok(())
    }

    pub(super) fn validate_conditions(&self, ctx: Context<'_>) -> SamlResult<()> {
        let skew = clock_skew(ctx.sp, self.connector()?);
        validate_times(skew, None, self.request.not_on_or_after)
    }

    /// Logs out every listed session and answers the IdP.
    ///
    /// Delivery of the LogoutResponse is best effort: its outcome is logged
    /// and never fails the inbound request.
    pub(super) async fn process(&mut self, ctx: Context<'_>) -> SamlResult<()> {
        for session_index in &self.request.session_indexes {
            let done = ctx.sp.logout(session_index).await?;
            tracing::info!(session_index = %session_index, done, "IdP initiated logout");
        }

        let response = self
            .connector()?
            .build_logout_response(SamlBinding::HttpPost, &self.request.id, ctx.relay_state)
            .map_err(|e| SamlError::Processing(format!("Unable to build SLO Response: {e}")))?;

        match ctx.sp.send_slo_response(&response).await {
            Ok(status) if (200..300).contains(&status) => tracing::info!(
                status,
                endpoint = response.endpoint_url(),
                in_response_to = %self.request.id,
                "SLO Response delivered"
            ),
            Ok(status) => tracing::error!(
                status,
                endpoint = response.endpoint_url(),
                in_response_to = %self.request.id,
                "IdP rejected the SLO Response"
            ),
            Err(err) => tracing::error!(
                error = %err,
                endpoint = response.endpoint_url(),
                in_response_to = %self.request.id,
                "Unable to deliver the SLO Response"
            ),
        }
        Ok(())
    }

    pub(super) fn build(&mut self) -> SamlResult<Query> {
        Ok(Query::SloRequest(QuerySloRequest {
            id: self.request.id.clone(),
            idp_connector_id: self.connector()?.id().to_string(),
            name_id: self.name_id.take(),
            session_indexes: std::mem::take(&mut self.request.session_indexes),
        }))
    }
}
