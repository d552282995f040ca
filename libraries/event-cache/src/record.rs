//! The event record as the API returns it.
//!
//! The server and older clients disagree on field names, so most fields accept
//! a handful of aliases. Anything not modelled here is kept in `extra` and
//! written back out untouched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Record identity. The API sends numbers, some clients send strings; both are
/// compared by their textual form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EventId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for EventId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => Self(text),
            RawId::Number(number) => Self(number.to_string()),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[serde(rename = "coming soon", alias = "upcoming")]
    Upcoming,
    Active,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Upcoming => "coming soon",
            EventStatus::Active => "active",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for EventStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coming soon" | "upcoming" => Ok(EventStatus::Upcoming),
            "active" => Ok(EventStatus::Active),
            "completed" => Ok(EventStatus::Completed),
            "cancelled" => Ok(EventStatus::Cancelled),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,

    #[serde(default)]
    pub name: String,

    #[serde(
        default,
        deserialize_with = "lenient_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<EventStatus>,

    /// Whether the current user takes part in the event.
    #[serde(
        rename = "is_user_in_event",
        alias = "isParticipating",
        alias = "is_participating",
        alias = "user_participates",
        default,
        deserialize_with = "lenient_bool"
    )]
    pub participating: bool,

    #[serde(
        rename = "is_user_liked_event",
        alias = "is_favorite",
        alias = "isFavorite",
        alias = "isLiked",
        default,
        deserialize_with = "lenient_bool"
    )]
    pub favorite: bool,

    /// Upper bound on participants, if the event has one.
    #[serde(
        rename = "max_members",
        alias = "maxMembers",
        alias = "max_participants",
        default,
        deserialize_with = "lenient_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub capacity: Option<u32>,

    /// Free-form payment description; a non-empty value means the event is paid.
    #[serde(
        rename = "pay_data",
        alias = "payment_info",
        alias = "paymentInfo",
        alias = "price_info",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub payment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<serde_json::Value>>,

    #[serde(
        rename = "participants_count",
        alias = "participantsCount",
        alias = "members_count",
        default,
        deserialize_with = "lenient_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub participant_count: Option<u32>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EventRecord {
    pub fn new(id: impl Into<EventId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: None,
            participating: false,
            favorite: false,
            capacity: None,
            payment: None,
            members: None,
            participant_count: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_paid(&self) -> bool {
        self.payment
            .as_deref()
            .is_some_and(|payment| !payment.trim().is_empty())
    }

    pub fn is_limited(&self) -> bool {
        self.capacity.is_some_and(|capacity| capacity > 0)
    }

    pub fn participants(&self) -> u32 {
        match &self.members {
            Some(members) if !members.is_empty() => members.len() as u32,
            _ => self.participant_count.unwrap_or(0),
        }
    }
}

fn lenient_status<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<EventStatus>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|status| {
        status
            .parse()
            .inspect_err(|e| log::warn!("Ignoring status on record: {e}"))
            .ok()
    }))
}

/// Counts the server sends negative or as text are treated as absent rather
/// than failing the whole record.
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| {
        let count = match &value {
            serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        if count.is_none() {
            log::debug!("Ignoring count {value} on record");
        }
        count
    }))
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}
