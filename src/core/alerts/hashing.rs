// Content hashing and identity resolution for alerts.
//
// The content hash covers only the fields a provider mutates when it re-issues
// an alert, so an "Update" message with new text hashes differently while a
// plain re-fetch does not.

use sha2::{Digest, Sha256};

use crate::core::error::{AlertError, AlertResult};
use crate::core::model::WeatherAlert;

/// Hex characters kept from the SHA-256 digest.
const HASH_LEN: usize = 32;

const FIELD_SEPARATOR: &str = "\u{1f}";

fn truncated_sha256(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(HASH_LEN);
    digest
}

/// Deterministic digest over `event, headline, description, severity, expires`.
pub fn compute_content_hash(alert: &WeatherAlert) -> String {
    let expires = alert.expires.map(|t| t.to_rfc3339()).unwrap_or_default();
    let canonical = [
        alert.event.as_deref().unwrap_or_default(),
        alert.headline.as_deref().unwrap_or_default(),
        alert.description.as_deref().unwrap_or_default(),
        alert.severity.as_deref().unwrap_or_default(),
        expires.as_str(),
    ]
    .join(FIELD_SEPARATOR);
    truncated_sha256(&canonical)
}

/// Resolve the identity used to correlate an alert across fetch cycles.
///
/// Falls back to a digest of `event, headline, sent, areas` when the provider
/// sent no id.
pub fn resolve_alert_id(alert: &WeatherAlert) -> AlertResult<String> {
    if let Some(id) = alert.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        return Ok(id.to_string());
    }

    let event = alert.event.as_deref().unwrap_or_default().trim();
    let headline = alert.headline.as_deref().unwrap_or_default().trim();
    let sent = alert.sent.map(|t| t.to_rfc3339()).unwrap_or_default();
    let areas = alert.areas.join(";");

    if event.is_empty() && headline.is_empty() && sent.is_empty() && areas.is_empty() {
        return Err(AlertError::MissingIdentity);
    }

    let canonical = [event, headline, sent.as_str(), areas.as_str()].join(FIELD_SEPARATOR);
    Ok(format!("auto-{}", truncated_sha256(&canonical)))
}
