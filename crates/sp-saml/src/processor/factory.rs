//! Dispatch of inbound requests to query processors.

use super::QueryProcessor;
use crate::bindings::decode_message;
use crate::error::{SamlError, SamlResult};
use crate::http::InboundRequest;
use crate::sp::SpProcessor;
use crate::types::{SAMLP_NS, SAML_NS};
use crate::xml::XmlElement;

/// Builds the processor for an inbound request.
///
/// The binding comes from the last path segment of the request URL and the
/// processor from the local name of the decoded root element.
pub async fn build_processor(
    sp: &SpProcessor,
    request: InboundRequest,
) -> SamlResult<QueryProcessor<'_>> {
    let config = sp.processor_config();

    let segment = request.last_path_segment().unwrap_or_default();
    let binding = config.binding_for_segment(segment).ok_or_else(|| {
        SamlError::UnsupportedOperation(format!(
            "No SAML binding is mapped to the endpoint {segment:?}"
        ))
    })?;

    let decoded = decode_message(
        binding,
        request.param("SAMLRequest"),
        request.param("SAMLResponse"),
        request.param("RelayState"),
    )
    .map_err(|e| SamlError::Processing(format!("Unable to decode SAML message: {e}")))?;

    let root = XmlElement::parse(&decoded.xml)
        .map_err(|e| SamlError::Processing(format!("Unable to parse SAML message: {e}")))?;

    let kind = config
        .processor_for(&root.name)
        .filter(|_| root.namespace.as_deref() == Some(SAMLP_NS))
        .ok_or_else(|| {
            SamlError::UnsupportedOperation(format!(
                "No processor available for SAML message {}",
                root.qualified_name()
            ))
        })?;

    let id = root
        .attr("ID")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SamlError::Processing(format!("{} without ID", root.name)))?;
    let issuer = root.child_text(SAML_NS, "Issuer").unwrap_or_default();

    tracing::debug!(?kind, ?binding, id, issuer, "Dispatching inbound SAML message");
    QueryProcessor::new(
        sp,
        request,
        binding,
        decoded.message_type,
        decoded.relay_state,
        root,
        kind,
    )
}
