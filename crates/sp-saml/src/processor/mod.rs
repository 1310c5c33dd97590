//! Inbound query processing.
//!
//! Every inbound message runs through a fixed sequence of stages:
//!
//! 1. marshall the decoded message into its text form
//! 2. check that the request arrived on the endpoint of the processor
//! 3. pre-process (decryption of encrypted assertions)
//! 4. check signatures against the issuing IdP, then record the message ID
//!    so that the same authenticated message is accepted only once
//! 5. validate time conditions
//! 6. process the message content
//! 7. build the validated [`Query`]
//!
//! A failure in any stage aborts processing; no partial result is returned.
//! Security failures are reported on the audit channel together with the
//! raw message.
//!
//! Processors are created by [`build_processor`], which maps the endpoint
//! to a binding and the root element to a [`ProcessorKind`].

mod authn_response;
mod factory;
mod slo_request;
mod slo_response;

pub use factory::build_processor;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bindings::SamlMessageType;
use crate::connector::IdpConnector;
use crate::error::{SamlError, SamlResult};
use crate::http::InboundRequest;
use crate::message::IncomingMessage;
use crate::query::{Query, RequestWaitingForResponse};
use crate::security::log_security_failure;
use crate::sp::SpProcessor;
use crate::types::{SamlBinding, SAML_NS};
use crate::xml::XmlElement;

use authn_response::AuthnResponseProcessor;
use slo_request::SloRequestProcessor;
use slo_response::SloResponseProcessor;

/// Kind of inbound message a processor handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessorKind {
    /// `samlp:Response` answering an AuthnRequest.
    AuthnResponse,
    /// `samlp:LogoutRequest` sent by an IdP.
    SloRequest,
    /// `samlp:LogoutResponse` answering one of our LogoutRequests.
    SloResponse,
}

impl ProcessorKind {
    /// Binding parameter expected to carry this kind of message.
    #[must_use]
    pub const fn message_type(self) -> SamlMessageType {
        match self {
            Self::SloRequest => SamlMessageType::Request,
            Self::AuthnResponse | Self::SloResponse => SamlMessageType::Response,
        }
    }
}

/// Last stage a processor completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProcessingStage {
    /// Created, nothing run yet.
    Initialized,
    /// Message text produced.
    Marshalled,
    /// Endpoint and message type checked.
    TypeValidated,
    /// Encrypted content decrypted.
    PreProcessed,
    /// Signatures trusted.
    SecurityChecked,
    /// Validity windows checked.
    ConditionsValidated,
    /// Content processed.
    Processed,
    /// Query built.
    Built,
}

/// Shared view of the message being processed.
#[derive(Clone, Copy)]
pub(crate) struct Context<'a> {
    pub sp: &'a SpProcessor,
    pub relay_state: Option<&'a str>,
}

enum Stages {
    AuthnResponse(AuthnResponseProcessor),
    SloRequest(SloRequestProcessor),
    SloResponse(SloResponseProcessor),
}

impl Stages {
    fn new(kind: ProcessorKind, root: &XmlElement) -> SamlResult<Self> {
        Ok(match kind {
            ProcessorKind::AuthnResponse => Self::AuthnResponse(AuthnResponseProcessor::new(root)?),
            ProcessorKind::SloRequest => Self::SloRequest(SloRequestProcessor::new(root)?),
            ProcessorKind::SloResponse => Self::SloResponse(SloResponseProcessor::new(root)?),
        })
    }

    const fn kind(&self) -> ProcessorKind {
        match self {
            Self::AuthnResponse(_) => ProcessorKind::AuthnResponse,
            Self::SloRequest(_) => ProcessorKind::SloRequest,
            Self::SloResponse(_) => ProcessorKind::SloResponse,
        }
    }

    fn pre_process(&mut self, ctx: Context<'_>) -> SamlResult<()> {
        match self {
            Self::AuthnResponse(p) => p.pre_process(ctx),
            Self::SloRequest(p) => p.pre_process(ctx),
            Self::SloResponse(_) => Ok(()),
        }
    }

    fn check_security(&mut self, ctx: Context<'_>) -> SamlResult<()> {
        match self {
            Self::AuthnResponse(p) => p.check_security(ctx),
            Self::SloRequest(p) => p.check_security(ctx),
            Self::SloResponse(p) => p.check_security(ctx),
        }
    }

    fn validate_conditions(&self, ctx: Context<'_>) -> SamlResult<()> {
        match self {
            Self::AuthnResponse(p) => p.validate_conditions(ctx),
            Self::SloRequest(p) => p.validate_conditions(ctx),
            Self::SloResponse(_) => Ok(()),
        }
    }

    async fn process(&mut self, ctx: Context<'_>) -> SamlResult<()> {
        match self {
            Self::AuthnResponse(p) => p.process(ctx),
            Self::SloRequest(p) => p.process(ctx).await,
            Self::SloResponse(p) => {
                p.process();
                Ok(())
            }
        }
    }

    async fn build(&mut self, ctx: Context<'_>) -> SamlResult<Query> {
        match self {
            Self::AuthnResponse(p) => p.build(ctx).await,
            Self::SloRequest(p) => p.build(),
            Self::SloResponse(p) => p.build(ctx).await,
        }
    }
}

/// One inbound message on its way through the processing stages.
pub struct QueryProcessor<'a> {
    sp: &'a SpProcessor,
    request: InboundRequest,
    binding: SamlBinding,
    message_type: SamlMessageType,
    relay_state: Option<String>,
    root: XmlElement,
    stages: Stages,
    stage: ProcessingStage,
    saml_message: String,
}

impl std::fmt::Debug for QueryProcessor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryProcessor")
            .field("kind", &self.kind())
            .field("binding", &self.binding)
            .field("stage", &self.stage)
            .field("url", &self.request.url())
            .finish_non_exhaustive()
    }
}

impl<'a> QueryProcessor<'a> {
    pub(crate) fn new(
        sp: &'a SpProcessor,
        request: InboundRequest,
        binding: SamlBinding,
        message_type: SamlMessageType,
        relay_state: Option<String>,
        root: XmlElement,
        kind: ProcessorKind,
    ) -> SamlResult<Self> {
        let stages = Stages::new(kind, &root).map_err(SamlError::into_processing)?;
        Ok(Self {
            sp,
            request,
            binding,
            message_type,
            relay_state,
            root,
            stages,
            stage: ProcessingStage::Initialized,
            saml_message: String::new(),
        })
    }

    /// Kind of message this processor handles.
    #[must_use]
    pub const fn kind(&self) -> ProcessorKind {
        self.stages.kind()
    }

    /// Binding the message was received with.
    #[must_use]
    pub const fn binding(&self) -> SamlBinding {
        self.binding
    }

    /// Last completed stage.
    #[must_use]
    pub const fn stage(&self) -> ProcessingStage {
        self.stage
    }

    /// Runs every stage and returns the validated message.
    pub async fn process(mut self) -> SamlResult<IncomingMessage> {
        match self.run().await {
            Ok(message) => Ok(message),
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn run(&mut self) -> SamlResult<IncomingMessage> {
        self.saml_message = self.root.to_xml();
        tracing::debug!(kind = ?self.kind(), message = %self.saml_message, "Marshalled inbound SAML message");
        self.stage = ProcessingStage::Marshalled;

        self.validate_request_type()?;
        self.stage = ProcessingStage::TypeValidated;

        let ctx = Context {
            sp: self.sp,
            relay_state: self.relay_state.as_deref(),
        };

        self.stages.pre_process(ctx)?;
        self.stage = ProcessingStage::PreProcessed;

        self.stages.check_security(ctx)?;
        self.stage = ProcessingStage::SecurityChecked;

        self.check_not_replayed().await?;

        self.stages.validate_conditions(ctx)?;
        self.stage = ProcessingStage::ConditionsValidated;

        self.stages.process(ctx).await?;
        self.stage = ProcessingStage::Processed;

        let query = self.stages.build(ctx).await?;
        self.stage = ProcessingStage::Built;

        Ok(IncomingMessage {
            binding: self.binding,
            endpoint_url: self.request.endpoint_url(),
            message: self.saml_message.clone(),
            relay_state: self.relay_state.clone(),
            query,
        })
    }

    fn validate_request_type(&self) -> SamlResult<()> {
        let kind = self.kind();
        let location = self.sp.processor_config().endpoint_location(kind);
        if !under_location(self.request.path(), location) {
            return Err(SamlError::Processing(format!(
                "Bad SAML Query Processor in use for incoming request: {} is not under {location:?}",
                self.request.path()
            )));
        }
        if kind.message_type() != self.message_type {
            return Err(SamlError::Processing(format!(
                "{kind:?} message received in the {} parameter",
                self.message_type.form_param()
            )));
        }
        Ok(())
    }

    /// Records the ID of an authenticated message. An ID already seen from
    /// the same issuer within the replay window is a security failure.
    async fn check_not_replayed(&self) -> SamlResult<()> {
        let id = self.root.attr("ID").unwrap_or_default();
        let issuer = self.root.child_text(SAML_NS, "Issuer").unwrap_or_default();
        let minutes = self.sp.processor_config().replay_minutes;
        let window = Duration::from_secs(minutes.saturating_mul(60));
        if !self.sp.store().mark_message_seen(issuer, id, window).await? {
            return Err(SamlError::Security(format!(
                "Message {id} from {issuer:?} was already received"
            )));
        }
        Ok(())
    }

    fn fail(&self, err: SamlError) -> SamlError {
        let err = match err {
            SamlError::NotSigned(msg) => SamlError::Security(msg),
            SamlError::Validation(msg) => {
                tracing::warn!(
                    stage = ?self.stage,
                    error = %msg,
                    "Validation problem while processing incoming SAML message"
                );
                SamlError::Processing(msg)
            }
            other => other.into_processing(),
        };
        if err.is_security() {
            log_security_failure(&err, Some(&self.saml_message));
        } else {
            tracing::debug!(stage = ?self.stage, error = %err, "Inbound SAML message rejected");
        }
        err
    }
}

/// Returns `true` when `path` contains the segments of `location`, after an
/// optional context path.
fn under_location(path: &str, location: &str) -> bool {
    let location = location.trim_end_matches('/');
    if location.is_empty() {
        return false;
    }
    path.match_indices(location).any(|(at, _)| {
        let before_ok = at == 0 || location.starts_with('/') || path[..at].ends_with('/');
        let rest = &path[at + location.len()..];
        before_ok && (rest.is_empty() || rest.starts_with('/'))
    })
}

/// Resolves the connector of the IdP that issued a message.
pub(crate) fn find_connector(
    sp: &SpProcessor,
    issuer: Option<&str>,
) -> SamlResult<Arc<IdpConnector>> {
    let issuer = issuer.ok_or_else(|| SamlError::Security("No Issuer provided".to_string()))?;
    sp.registry()
        .by_entity_id(issuer)
        .ok_or_else(|| SamlError::Security(format!("IdP Connector not found for issuer {issuer}")))
}

/// Clock skew applying to messages of `connector`.
pub(crate) fn clock_skew(sp: &SpProcessor, connector: &IdpConnector) -> i64 {
    connector
        .idp_config()
        .clock_skew_seconds
        .unwrap_or(sp.processor_config().clock_skew_seconds)
}

/// Takes the request a response answers out of the correlation store.
///
/// A request matches at most one response.
pub(crate) async fn take_original_request(
    sp: &SpProcessor,
    in_response_to: Option<&str>,
) -> SamlResult<RequestWaitingForResponse> {
    let id = in_response_to
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SamlError::Processing("Response without InResponseTo".to_string()))?;
    sp.store().take_request(id).await?.ok_or_else(|| {
        SamlError::Processing(
            "No original AuthnRequest found matching the AuthnResponse (Request may have expired)"
                .to_string(),
        )
    })
}

/// Error for a stored request of the wrong kind.
pub(crate) fn request_type_mismatch(found: &RequestWaitingForResponse) -> SamlError {
    SamlError::Security(format!(
        "The orginal request type doesn't match the response type ({} found)",
        found.kind()
    ))
}

/// Checks that the issuer of a response is the IdP the request was sent to.
pub(crate) fn check_same_idp(original_idp: &str, connector: &IdpConnector) -> SamlResult<()> {
    if original_idp != connector.id() {
        return Err(SamlError::Security(format!(
            "Response issued by {} answers a request sent to IdP {original_idp}",
            connector.entity_id()
        )));
    }
    Ok(())
}
