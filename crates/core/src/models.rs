use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which tariff column a lookup reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateType {
    Industrial,
    Residential,
    Commercial,
}

#[derive(Debug, Error)]
#[error("unknown rate type {0:?}; expected industrial, residential, or commercial")]
pub struct ParseRateTypeError(pub String);

impl RateType {
    pub const ALL: [RateType; 3] = [Self::Industrial, Self::Residential, Self::Commercial];

    pub fn parse(value: &str) -> Result<Self, ParseRateTypeError> {
        match value.trim().to_lowercase().as_str() {
            "industrial" | "industrial rate" | "industrial_rate" => Ok(Self::Industrial),
            "residential" | "residential rate" | "residential_rate" => Ok(Self::Residential),
            "commercial" | "commercial rate" | "commercial_rate" => Ok(Self::Commercial),
            _ => Err(ParseRateTypeError(value.to_string())),
        }
    }

    /// First rate keyword found in free text by case-insensitive substring,
    /// scanned in a fixed order so repeated inputs always agree.
    pub fn from_keywords(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|rate_type| lower.contains(rate_type.as_code()))
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Self::Industrial => "industrial",
            Self::Residential => "residential",
            Self::Commercial => "commercial",
        }
    }

    /// Column label as published in the rate table.
    pub fn label(self) -> &'static str {
        match self {
            Self::Industrial => "Industrial Rate",
            Self::Residential => "Residential Rate",
            Self::Commercial => "Commercial Rate",
        }
    }
}

/// A published rate cell. Source spreadsheets hold either a plain number or
/// free text such as "As per agreement", so both shapes are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RateValue {
    Amount(f64),
    Text(String),
}

impl RateValue {
    /// Whether the cell carries a usable value. NaN, blank text, and the
    /// literal "not applicable" marker all count as unavailable.
    pub fn is_available(&self) -> bool {
        match self {
            Self::Amount(amount) => amount.is_finite(),
            Self::Text(text) => {
                let trimmed = text.trim();
                !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("not applicable")
            }
        }
    }
}

impl fmt::Display for RateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Amount(amount) if amount.fract() == 0.0 && amount.is_finite() => {
                write!(f, "{}", *amount as i64)
            }
            Self::Amount(amount) => write!(f, "{amount}"),
            Self::Text(text) => f.write_str(text.trim()),
        }
    }
}

/// One cleaned row of the rate table. District and taluka are always
/// non-empty (forward-filled by the loader); location rows without a name
/// are dropped before this type is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateRecord {
    pub district: String,
    pub taluka: String,
    pub location: String,
    #[serde(rename = "industrial_rate")]
    pub industrial: Option<RateValue>,
    #[serde(rename = "residential_rate")]
    pub residential: Option<RateValue>,
    #[serde(rename = "commercial_rate")]
    pub commercial: Option<RateValue>,
}

impl RateRecord {
    pub fn rate(&self, rate_type: RateType) -> Option<&RateValue> {
        match rate_type {
            RateType::Industrial => self.industrial.as_ref(),
            RateType::Residential => self.residential.as_ref(),
            RateType::Commercial => self.commercial.as_ref(),
        }
    }
}

/// Canonical (district, taluka, location) triple identifying one rate row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceKey {
    pub district: String,
    pub taluka: String,
    pub location: String,
}

impl PlaceKey {
    pub fn of(record: &RateRecord) -> Self {
        Self {
            district: record.district.clone(),
            taluka: record.taluka.clone(),
            location: record.location.clone(),
        }
    }
}

impl fmt::Display for PlaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.location, self.taluka, self.district)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueState {
    AwaitingLocation,
    AwaitingRateType,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub at: DateTime<Utc>,
    pub user_text: String,
    pub assistant_text: String,
    pub state_after: DialogueState,
}

/// Per-conversation state, owned by whoever drives the dialogue. Nothing in
/// this workspace keeps session state in globals; hosts pass the session in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub session_id: String,
    pub state: DialogueState,
    pub resolved: Option<PlaceKey>,
    pub expires_at: DateTime<Utc>,
    pub turns: Vec<ConversationTurn>,
}

impl ConversationSession {
    pub fn new(session_id: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            state: DialogueState::AwaitingLocation,
            resolved: None,
            expires_at,
            turns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatInput {
    pub session_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub session_id: String,
    pub reply_text: String,
    pub state: DialogueState,
    pub resolved: Option<PlaceKey>,
}
