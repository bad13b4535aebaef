use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Severity levels reported by providers, ranked for threshold and escalation checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Unknown,
    Minor,
    Moderate,
    Severe,
    Extreme,
}

impl Severity {
    /// Parse a provider severity label. Unrecognized labels map to `Unknown`.
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("extreme") => Self::Extreme,
            Some("severe") => Self::Severe,
            Some("moderate") => Self::Moderate,
            Some("minor") => Self::Minor,
            _ => Self::Unknown,
        }
    }

    pub fn priority(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::Minor => 1,
            Self::Moderate => 2,
            Self::Severe => 3,
            Self::Extreme => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Minor => "Minor",
            Self::Moderate => "Moderate",
            Self::Severe => "Severe",
            Self::Extreme => "Extreme",
        }
    }
}

/// A single provider-agnostic weather alert, already normalized upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherAlert {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub urgency: Option<String>,
    pub certainty: Option<String>,
    pub event: Option<String>,
    pub headline: Option<String>,
    #[serde(with = "optional_timestamp")]
    pub sent: Option<DateTime<Utc>>,
    #[serde(with = "optional_timestamp")]
    pub effective: Option<DateTime<Utc>>,
    #[serde(with = "optional_timestamp")]
    pub onset: Option<DateTime<Utc>>,
    #[serde(with = "optional_timestamp")]
    pub expires: Option<DateTime<Utc>>,
    pub areas: Vec<String>,
}

impl WeatherAlert {
    pub fn severity_level(&self) -> Severity {
        Severity::from_label(self.severity.as_deref())
    }

    /// The alert's own issuance time: `sent`, falling back to `effective`.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.sent.or(self.effective)
    }

    /// Normalized category key derived from the event name.
    pub fn category(&self) -> Option<String> {
        self.event
            .as_deref()
            .map(normalize_category)
            .filter(|c| !c.is_empty())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires < now)
    }

    /// Best human-readable line for toasts and tooltips.
    pub fn display_title(&self) -> &str {
        self.headline
            .as_deref()
            .or(self.title.as_deref())
            .or(self.event.as_deref())
            .unwrap_or("Weather alert")
    }
}

/// Ordered batch of alerts handed over by a fetch cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherAlerts {
    #[serde(default)]
    pub alerts: Vec<WeatherAlert>,
}

impl WeatherAlerts {
    pub fn new(alerts: Vec<WeatherAlert>) -> Self {
        Self { alerts }
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WeatherAlert> {
        self.alerts.iter()
    }
}

impl From<Vec<WeatherAlert>> for WeatherAlerts {
    fn from(alerts: Vec<WeatherAlert>) -> Self {
        Self { alerts }
    }
}

/// Lower-case and collapse internal whitespace so "Flood  Watch" matches "flood watch".
pub fn normalize_category(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Parse an RFC 3339 or naive ISO-8601 timestamp. Naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Serde adapter for required timestamps that tolerates naive values.
pub mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

/// Serde adapter for optional timestamps; blank strings read as `None`.
pub mod optional_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => s.serialize_some(&dt.to_rfc3339()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => super::parse_timestamp(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}"))),
        }
    }
}
