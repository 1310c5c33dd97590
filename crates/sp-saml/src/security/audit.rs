//! Security-audit channel.
//!
//! Security failures are logged with the `saml_security` tracing target so
//! that deployments can route them to a dedicated sink, e.g.
//! `RUST_LOG=saml_security=warn`.

use crate::error::SamlError;

/// Tracing target of the security-audit channel.
pub const SECURITY_TARGET: &str = "saml_security";

/// Logs a security failure together with the offending raw SAML message.
///
/// An empty or missing message means the failure happened before the
/// message could be decoded.
pub fn log_security_failure(error: &SamlError, raw_message: Option<&str>) {
    match raw_message.filter(|m| !m.is_empty()) {
        Some(raw) => tracing::warn!(
            target: "saml_security",
            error = %error,
            saml_message = raw,
            "Security failure while processing SAML message"
        ),
        None => tracing::warn!(
            target: "saml_security",
            error = %error,
            "Security failure before decoding SAML message"
        ),
    }
}
