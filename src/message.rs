//! Wire types: Message, MessageCollection, lifecycle state and state changes.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use rsa::RsaPrivateKey;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::engine::CmsEngine;
use crate::error::{ProtocolError, Result};

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// Exact decimal amount.
///
/// Kept as validated decimal text and written to JSON as a number token with
/// the same digits, so `100.50` never passes through a binary float.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Amount(String);

/// Rejected amount text.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid decimal amount: {0:?}")]
pub struct InvalidAmount(pub String);

impl Amount {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Amount {
    type Err = InvalidAmount;

    /// `[-]digits[.digits][e[+-]digits]`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || InvalidAmount(s.to_owned());
        let unsigned = s.strip_prefix('-').unwrap_or(s);
        let (mantissa, exponent) = match unsigned.find(|c: char| c == 'e' || c == 'E') {
            Some(i) => (&unsigned[..i], Some(&unsigned[i + 1..])),
            None => (unsigned, None),
        };
        let (int, frac) = match mantissa.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (mantissa, None),
        };
        let digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
        if !digits(int) || frac.is_some_and(|f| !digits(f)) {
            return Err(invalid());
        }
        if let Some(exp) = exponent {
            let exp = exp.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(exp);
            if !digits(exp) {
                return Err(invalid());
            }
        }
        Ok(Self(s.to_owned()))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for Amount {
    fn from(v: i64) -> Self {
        Self(v.to_string())
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let number = serde_json::Number::from_str(&self.0).map_err(serde::ser::Error::custom)?;
        number.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Number(n) => n.to_string().parse().map_err(D::Error::custom),
            serde_json::Value::String(s) => s.parse().map_err(D::Error::custom),
            other => Err(D::Error::custom(format!("amount must be a number, got {}", other))),
        }
    }
}

// ---------------------------------------------------------------------------
// Lifecycle state machine
// ---------------------------------------------------------------------------

/// Message lifecycle state.
///
/// ```text
/// New ──→ Completed   (receiver accepts)
///  │ ───→ Rejected    (receiver rejects, reason required)
///  └────→ Cancelled   (sender cancels, reason optional)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageState {
    New,
    Completed,
    Cancelled,
    Rejected,
}

impl MessageState {
    /// Valid transitions from this state.
    pub fn valid_transitions(&self) -> &[MessageState] {
        match self {
            MessageState::New => &[
                MessageState::Completed,
                MessageState::Rejected,
                MessageState::Cancelled,
            ],
            MessageState::Completed | MessageState::Cancelled | MessageState::Rejected => &[],
        }
    }

    pub fn can_transition_to(&self, target: MessageState) -> bool {
        self.valid_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageState::New => "New",
            MessageState::Completed => "Completed",
            MessageState::Cancelled => "Cancelled",
            MessageState::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change the owning participant can request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateChange {
    /// Receiver accepts.
    Complete,
    /// Receiver refuses.
    Reject { reason: String },
    /// Sender withdraws a message still `New`.
    Cancel { reason: Option<String> },
}

/// PATCH body for a state change.
#[derive(Debug, Serialize)]
pub struct StateChangeBody<'a> {
    pub state: MessageState,
    #[serde(rename = "stateDescrip", skip_serializing_if = "Option::is_none")]
    pub state_descrip: Option<&'a str>,
}

impl StateChange {
    pub fn target(&self) -> MessageState {
        match self {
            StateChange::Complete => MessageState::Completed,
            StateChange::Reject { .. } => MessageState::Rejected,
            StateChange::Cancel { .. } => MessageState::Cancelled,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            StateChange::Complete => None,
            StateChange::Reject { reason } => Some(reason),
            StateChange::Cancel { reason } => reason.as_deref(),
        }
    }

    pub fn body(&self) -> StateChangeBody<'_> {
        StateChangeBody {
            state: self.target(),
            state_descrip: self.reason(),
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A payment message as exchanged with the server. Absent fields are omitted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<i16>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_date")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ccy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<MessageState>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_date")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_date")]
    pub last_modified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<i64>,
    /// Base64 of a CMS envelope. Never cleartext.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Everything needed to send a payment, before encryption.
#[derive(Clone, Debug, PartialEq)]
pub struct OutgoingPayment {
    pub receiver: String,
    pub reference: String,
    pub message_type: i16,
    pub date: DateTime<Utc>,
    pub amount: Amount,
    pub currency: String,
    /// Cleartext content; encrypted for the receiver before it leaves the client.
    pub content: String,
}

impl Message {
    /// The message PUT to the outbox. `envelope` is the CMS-encrypted content.
    pub(crate) fn outgoing(payment: &OutgoingPayment, envelope: &[u8]) -> Self {
        Self {
            reference: Some(payment.reference.clone()),
            receiver: Some(payment.receiver.clone()),
            message_type: Some(payment.message_type),
            date: Some(payment.date),
            amount: Some(payment.amount.clone()),
            ccy: Some(payment.currency.clone()),
            content: Some(STANDARD.encode(envelope)),
            ..Self::default()
        }
    }

    /// Raw CMS envelope bytes of the content.
    pub fn content_bytes(&self) -> std::result::Result<Vec<u8>, ProtocolError> {
        let content = self.content.as_deref().ok_or(ProtocolError::MissingContent)?;
        STANDARD
            .decode(content.trim())
            .map_err(|e| ProtocolError::InvalidContent(e.to_string()))
    }

    /// Decrypt the content with the receiver's private key.
    pub fn decrypt_content(&self, engine: &CmsEngine, key: &RsaPrivateKey) -> Result<String> {
        let envelope = self.content_bytes()?;
        let plain = engine.decrypt(&envelope, key)?;
        Ok(String::from_utf8(plain).map_err(|_| ProtocolError::NonUtf8Content)?)
    }
}

/// A page of messages plus a cursor for incremental polling.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageCollection {
    #[serde(default)]
    pub items: Vec<Message>,
    /// Resume point; absent when nothing further is currently known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl MessageCollection {
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Parse an RFC 3339 date-time or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_date(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(e) => match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            Ok(d) => Ok(Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN))),
            Err(_) => Err(e),
        },
    }
}

/// RFC 3339 with milliseconds and `Z`, the form the server emits.
pub fn format_date(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

mod opt_date {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&format_date(dt)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| parse_date(&s).map_err(D::Error::custom)).transpose()
    }
}
