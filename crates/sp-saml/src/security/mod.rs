//! Security validation.
//!
//! - [`validate_signature_trust`] evaluates the enveloped signature of a
//!   SAML object with the issuer's trust engine
//! - [`validate_times`] checks validity windows with clock skew tolerance
//! - [`decrypt`] merges encrypted assertions, identifiers and attributes
//!   back into the clear object graph
//! - [`audit`] reports security failures on the dedicated audit channel

pub mod audit;
pub mod decrypt;
mod times;
mod trust;

pub use audit::log_security_failure;
pub use decrypt::{Decrypter, XmlEncDecrypter, XmlEncrypter};
pub use times::{validate_times, validate_times_at};
pub use trust::validate_signature_trust;
