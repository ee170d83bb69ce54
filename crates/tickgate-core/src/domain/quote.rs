use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{ProviderId, Symbol, UtcDateTime, ValidationError};

const OFFLINE_SAMPLE_LABEL: &str = "offline-sample";

/// Where a quote came from.
///
/// Synthetic data carries its own variant so callers cannot mistake it for a
/// provider response. On the wire it is the provider name or `offline-sample`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuoteSource {
    Provider(ProviderId),
    OfflineSample,
}

impl QuoteSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Provider(provider) => provider.as_str(),
            Self::OfflineSample => OFFLINE_SAMPLE_LABEL,
        }
    }
}

impl Display for QuoteSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for QuoteSource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for QuoteSource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        if value == OFFLINE_SAMPLE_LABEL {
            return Ok(Self::OfflineSample);
        }
        value
            .parse::<ProviderId>()
            .map(Self::Provider)
            .map_err(D::Error::custom)
    }
}

/// Normalized quote returned to callers regardless of upstream format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: Symbol,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub timestamp: UtcDateTime,
    pub source: QuoteSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Quote {
    /// Builds a quote from a provider response, validating the numeric fields.
    pub fn from_provider(
        symbol: Symbol,
        provider: ProviderId,
        price: f64,
        change: f64,
        change_percent: f64,
        timestamp: UtcDateTime,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("price", price)?;
        validate_finite("change", change)?;
        validate_finite("changePercent", change_percent)?;

        Ok(Self {
            symbol,
            price,
            change,
            change_percent,
            timestamp,
            source: QuoteSource::Provider(provider),
            note: None,
        })
    }

    pub fn offline_sample(
        symbol: Symbol,
        price: f64,
        change: f64,
        change_percent: f64,
        timestamp: UtcDateTime,
        note: impl Into<String>,
    ) -> Self {
        Self {
            symbol,
            price,
            change,
            change_percent,
            timestamp,
            source: QuoteSource::OfflineSample,
            note: Some(note.into()),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn is_synthetic(&self) -> bool {
        self.source == QuoteSource::OfflineSample
    }
}

fn validate_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    Ok(())
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    validate_finite(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}
