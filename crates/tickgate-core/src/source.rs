use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Upstream quote providers known to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Alphavantage,
    Twelvedata,
    Finnhub,
    Iexcloud,
    Polygon,
    Worldtradingdata,
    Marketstack,
}

impl ProviderId {
    /// Configuration order. Ties in priority are broken by this order.
    pub const ALL: [Self; 7] = [
        Self::Alphavantage,
        Self::Twelvedata,
        Self::Finnhub,
        Self::Iexcloud,
        Self::Polygon,
        Self::Worldtradingdata,
        Self::Marketstack,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alphavantage => "alphavantage",
            Self::Twelvedata => "twelvedata",
            Self::Finnhub => "finnhub",
            Self::Iexcloud => "iexcloud",
            Self::Polygon => "polygon",
            Self::Worldtradingdata => "worldtradingdata",
            Self::Marketstack => "marketstack",
        }
    }

    /// Environment variable holding this provider's credential.
    pub fn credential_env_var(self) -> String {
        format!("{}_API_KEY", self.as_str().to_ascii_uppercase())
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str() == normalized)
            .ok_or(ValidationError::InvalidProvider { value: normalized })
    }
}
