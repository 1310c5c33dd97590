//! Processing of `samlp:Response` messages.

use std::sync::Arc;

use super::{
    check_same_idp, clock_skew, find_connector, request_type_mismatch, take_original_request,
    Context,
};
use crate::connector::IdpConnector;
use crate::error::{SamlError, SamlResult};
use crate::query::{Authentication, Query, QueryAuthnResponse, RequestWaitingForResponse};
use crate::security::{validate_signature_trust, validate_times, Decrypter};
use crate::signature::SignatureTrust;
use crate::types::{Assertion, Attribute, NameId, Response, SubjectIdentifier};
use crate::xml::XmlElement;

pub(super) struct AuthnResponseProcessor {
    response: Response,
    assertions: Vec<Assertion>,
    connector: Option<Arc<IdpConnector>>,
    authentications: Vec<Authentication>,
}

impl AuthnResponseProcessor {
    pub(super) fn new(root: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            response: Response::from_element(root)?,
            assertions: Vec::new(),
            connector: None,
            authentications: Vec::new(),
        })
    }

    fn connector(&self) -> SamlResult<&IdpConnector> {
        self.connector
            .as_deref()
            .ok_or_else(|| SamlError::Processing("IdP connector not resolved".to_string()))
    }

    /// Collects the clear and the decrypted assertions.
    pub(super) fn pre_process(&mut self, ctx: Context<'_>) -> SamlResult<()> {
        let mut assertions = self.response.assertions.clone();

        if !self.response.encrypted_assertions.is_empty() {
            let decrypter = require_decrypter(ctx)?;
            for encrypted in &self.response.encrypted_assertions {
                let assertion = decrypter
                    .decrypt_assertion(encrypted)
                    .map_err(decryption_problem)?;
                tracing::debug!(id = %assertion.id, "Decrypted assertion");
                assertions.push(assertion);
            }
        }

        if assertions.is_empty() {
            return Err(SamlError::Processing(
                "No Assertions found in AuthnResponse".to_string(),
            ));
        }
        self.assertions = assertions;
        Ok(())
    }

    /// Trusts the response signature, or else the signature of every assertion.
    ///
    /// An assertion carrying an untrusted signature is rejected even when
    /// the response itself is signed.
    pub(super) fn check_security(&mut self, ctx: Context<'_>) -> SamlResult<()> {
        let issuer = self.response.issuer.as_deref();
        let connector = find_connector(ctx.sp, issuer)?;
        let engine = connector.trust_engine();

        let response_signed =
            match validate_signature_trust(&self.response.element, issuer, engine) {
                SignatureTrust::Trusted => true,
                SignatureTrust::Absent => false,
                SignatureTrust::Invalid(reason) => {
                    return Err(SamlError::Security(format!(
                        "The Authn Response signature cannot be trusted: {reason}"
                    )))
                }
            };

        for assertion in &self.assertions {
            let assertion_issuer = assertion.issuer.as_deref().or(issuer);
            if assertion_issuer != Some(connector.entity_id()) {
                return Err(SamlError::Security(format!(
                    "Assertion {} is issued by {:?} instead of {}",
                    assertion.id,
                    assertion_issuer.unwrap_or_default(),
                    connector.entity_id()
                )));
            }
            match validate_signature_trust(&assertion.element, assertion_issuer, engine) {
                SignatureTrust::Trusted => {}
                SignatureTrust::Absent if response_signed => {}
                SignatureTrust::Absent => {
                    return Err(SamlError::Security(
                        "The Authn Response cannot be trusted, some signatures are missing"
                            .to_string(),
                    ))
                }
                SignatureTrust::Invalid(reason) => {
                    return Err(SamlError::Security(format!(
                        "Assertion {} signature cannot be trusted: {reason}",
                        assertion.id
                    )))
                }
            }
        }

        self.connector = Some(connector);
        Ok(())
    }

    pub(super) fn validate_conditions(&self, ctx: Context<'_>) -> SamlResult<()> {
        let skew = clock_skew(ctx.sp, self.connector()?);
        for assertion in &self.assertions {
            if let Some(conditions) = &assertion.conditions {
                validate_times(skew, conditions.not_before, conditions.not_on_or_after)?;
            }
            let confirmations = assertion
                .subject
                .iter()
                .flat_map(|s| &s.confirmations)
                .filter_map(|c| c.data.as_ref());
            for data in confirmations {
                validate_times(skew, data.not_before, data.not_on_or_after)?;
            }
        }
        Ok(())
    }

    /// Extracts one authentication per `AuthnStatement`.
    pub(super) fn process(&mut self, ctx: Context<'_>) -> SamlResult<()> {
        let connector = self.connector()?;
        let mut authentications = Vec::new();

        for assertion in &self.assertions {
            if assertion.authn_statements.is_empty() {
                continue;
            }
            let subject_id = subject_id(ctx, assertion)?;
            let attributes = attributes(ctx, assertion)?;
            let idp_entity_id = assertion
                .issuer
                .as_deref()
                .unwrap_or_else(|| connector.entity_id());

            for statement in &assertion.authn_statements {
                let session_index = statement
                    .session_index
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        SamlError::Processing(format!(
                            "AuthnStatement of assertion {} has no SessionIndex",
                            assertion.id
                        ))
                    })?;

                let mut builder =
                    Authentication::builder(idp_entity_id, subject_id.as_str(), session_index)
                        .authentication_instant(statement.authn_instant);
                for attribute in &attributes {
                    builder.add_attribute(&attribute.name, attribute.values.iter().cloned())?;
                }
                authentications.push(builder.lock());
            }
        }

        if authentications.is_empty() {
            return Err(SamlError::Processing(
                "No Authentication statement found in AuthnResponse".to_string(),
            ));
        }
        tracing::debug!(
            response = %self.response.id,
            count = authentications.len(),
            "Extracted authentications"
        );
        self.authentications = authentications;
        Ok(())
    }

    /// Checks the response answers one of our AuthnRequests sent to the same IdP.
    pub(super) async fn build(&mut self, ctx: Context<'_>) -> SamlResult<Query> {
        let original =
            take_original_request(ctx.sp, self.response.in_response_to.as_deref()).await?;
        let original = match original {
            RequestWaitingForResponse::AuthnRequest(original) => original,
            other => return Err(request_type_mismatch(&other)),
        };
        let connector = self.connector()?;
        check_same_idp(&original.idp_connector_id, connector)?;
        let idp_connector_id = connector.id().to_string();

        Ok(Query::AuthnResponse(QueryAuthnResponse {
            id: self.response.id.clone(),
            in_response_to: original.id.clone(),
            idp_connector_id,
            original_request: original,
            authentications: std::mem::take(&mut self.authentications),
        }))
    }
}

fn require_decrypter<'a>(ctx: Context<'a>) -> SamlResult<&'a dyn Decrypter> {
    ctx.sp.decrypter().ok_or_else(|| {
        SamlError::Processing(
            "Decryption problem encountered: no decryption key is configured".to_string(),
        )
    })
}

fn decryption_problem(err: SamlError) -> SamlError {
    match err {
        SamlError::UnsupportedOperation(_) => err,
        other => SamlError::Processing(format!("Decryption problem encountered: {other}")),
    }
}

fn subject_id(ctx: Context<'_>, assertion: &Assertion) -> SamlResult<String> {
    let subject = assertion.subject.as_ref().ok_or_else(|| {
        SamlError::Validation(format!("Assertion {} has no Subject", assertion.id))
    })?;

    let identifier = match &subject.identifier {
        Some(SubjectIdentifier::Encrypted(encrypted)) => Some(
            require_decrypter(ctx)?
                .decrypt_identifier(encrypted)
                .map_err(decryption_problem)?,
        ),
        other => other.clone(),
    };

    match identifier {
        Some(SubjectIdentifier::NameId(NameId { value, .. })) => Ok(value),
        _ => Err(SamlError::UnsupportedOperation(
            "Only NameID is currently supported as subject identifier".to_string(),
        )),
    }
}

fn attributes(ctx: Context<'_>, assertion: &Assertion) -> SamlResult<Vec<Attribute>> {
    let mut attributes = Vec::new();
    for statement in &assertion.attribute_statements {
        attributes.extend(statement.attributes.iter().cloned());
        if !statement.encrypted_attributes.is_empty() {
            let decrypted = require_decrypter(ctx)?
                .decrypt_attributes(&statement.encrypted_attributes)
                .map_err(decryption_problem)?;
            attributes.extend(decrypted);
        }
    }
    Ok(attributes)
}
