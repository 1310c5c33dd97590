//! Validity window checks.

use chrono::{DateTime, Duration, Utc};

use crate::error::{SamlError, SamlResult};
use crate::types::format_instant;

/// Checks that now lies in `[not_before - skew, not_on_or_after + skew)`.
///
/// Either bound may be absent; with both absent the check always passes.
pub fn validate_times(
    clock_skew_seconds: i64,
    not_before: Option<DateTime<Utc>>,
    not_on_or_after: Option<DateTime<Utc>>,
) -> SamlResult<()> {
    validate_times_at(Utc::now(), clock_skew_seconds, not_before, not_on_or_after)
}

/// [`validate_times`] against an explicit instant.
pub fn validate_times_at(
    now: DateTime<Utc>,
    clock_skew_seconds: i64,
    not_before: Option<DateTime<Utc>>,
    not_on_or_after: Option<DateTime<Utc>>,
) -> SamlResult<()> {
    let skew = Duration::seconds(clock_skew_seconds);

    if let Some(not_before) = not_before {
        if now < not_before - skew {
            return Err(SamlError::Validation(format!(
                "NotBefore condition not met: {} is later than now ({}) with {clock_skew_seconds}s skew",
                format_instant(&not_before),
                format_instant(&now)
            )));
        }
    }

    if let Some(not_on_or_after) = not_on_or_after {
        if now >= not_on_or_after + skew {
            return Err(SamlError::Validation(format!(
                "NotOnOrAfter condition not met: {} has passed (now {}) with {clock_skew_seconds}s skew",
                format_instant(&not_on_or_after),
                format_instant(&now)
            )));
        }
    }

    Ok(())
}
