//! Relay-state tokens.
//!
//! A token is the base64 encoding of `random hex || time || '$' || ordinal`
//! where `ordinal` identifies the binding the request was sent with. The IdP
//! returns it untouched, so this SP can tell which binding it used.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{SamlError, SamlResult};
use crate::types::SamlBinding;

const SEPARATOR: char = '$';
const RANDOM_BYTES: usize = 16;

/// An opaque relay-state token generated by this SP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayState {
    token: String,
    binding: SamlBinding,
}

impl RelayState {
    /// Generates a new token for a message sent with `binding`.
    #[must_use]
    pub fn generate(binding: SamlBinding) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let plain = format!(
            "{}{nanos}{SEPARATOR}{}",
            sp_crypto::random_hex(RANDOM_BYTES),
            binding.ordinal()
        );
        let token = STANDARD.encode(plain);
        tracing::debug!(relay_state = %token, ?binding, "Generated relay state");
        Self { token, binding }
    }

    /// Decodes a token generated by [`RelayState::generate`].
    pub fn decode(token: &str) -> SamlResult<Self> {
        let plain = STANDARD
            .decode(token.trim())
            .map_err(|e| SamlError::Processing(format!("Invalid relay state: {e}")))?;
        let plain = String::from_utf8(plain)
            .map_err(|_| SamlError::Processing("Invalid relay state encoding".to_string()))?;

        let binding = plain
            .rsplit_once(SEPARATOR)
            .and_then(|(_, ordinal)| ordinal.parse::<u8>().ok())
            .and_then(SamlBinding::from_ordinal)
            .ok_or_else(|| {
                SamlError::Processing("Relay state does not name a known binding".to_string())
            })?;

        Ok(Self {
            token: token.trim().to_string(),
            binding,
        })
    }

    /// Returns the encoded token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Returns the binding the token was generated for.
    #[must_use]
    pub const fn binding(&self) -> SamlBinding {
        self.binding
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}
