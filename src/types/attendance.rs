//! Attendance log record types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Check-in or check-out
///
/// Values this crate does not recognize are kept verbatim in `Other` and
/// serialize back to the same text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AttendanceAction {
    CheckIn,
    CheckOut,
    Other(String),
}

impl AttendanceAction {
    /// Actions the synthetic generator picks from
    pub const KNOWN: [AttendanceAction; 2] = [AttendanceAction::CheckIn, AttendanceAction::CheckOut];

    pub fn as_str(&self) -> &str {
        match self {
            AttendanceAction::CheckIn => "CHECK_IN",
            AttendanceAction::CheckOut => "CHECK_OUT",
            AttendanceAction::Other(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, AttendanceAction::Other(_))
    }
}

impl fmt::Display for AttendanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognized values only
impl FromStr for AttendanceAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match AttendanceAction::from(s.to_string()) {
            AttendanceAction::Other(raw) => Err(raw),
            known => Ok(known),
        }
    }
}

impl From<String> for AttendanceAction {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "CHECK_IN" => AttendanceAction::CheckIn,
            "CHECK_OUT" => AttendanceAction::CheckOut,
            _ => AttendanceAction::Other(raw),
        }
    }
}

impl From<AttendanceAction> for String {
    fn from(action: AttendanceAction) -> Self {
        match action {
            AttendanceAction::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// Outcome of an attendance scan
///
/// Unrecognized values are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AttendanceStatus {
    Normal,
    Late,
    Error,
    Forbidden,
    Other(String),
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AttendanceStatus::Normal => "NORMAL",
            AttendanceStatus::Late => "LATE",
            AttendanceStatus::Error => "ERROR",
            AttendanceStatus::Forbidden => "FORBIDDEN",
            AttendanceStatus::Other(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, AttendanceStatus::Other(_))
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognized values only
impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match AttendanceStatus::from(s.to_string()) {
            AttendanceStatus::Other(raw) => Err(raw),
            known => Ok(known),
        }
    }
}

impl From<String> for AttendanceStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "NORMAL" => AttendanceStatus::Normal,
            "LATE" => AttendanceStatus::Late,
            "ERROR" => AttendanceStatus::Error,
            "FORBIDDEN" => AttendanceStatus::Forbidden,
            _ => AttendanceStatus::Other(raw),
        }
    }
}

impl From<AttendanceStatus> for String {
    fn from(status: AttendanceStatus) -> Self {
        match status {
            AttendanceStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// One attendance check-in/check-out record
///
/// Events are never mutated after construction; the feed only moves them
/// between the window and the snapshots handed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEvent {
    pub id: String,
    pub employee_name: String,
    pub action: AttendanceAction,
    /// Local wall clock, `HH:MM:SS`
    pub timestamp: String,
    pub status: AttendanceStatus,
    pub message: String,
}

impl AttendanceEvent {
    /// Create an event with a message derived from its status and action
    ///
    /// A `Late` event gets the bare message "Late"; use
    /// [`AttendanceEvent::with_message`] or [`default_message`] with the
    /// minutes to say how late.
    pub fn new(
        id: impl Into<String>,
        employee_name: impl Into<String>,
        action: AttendanceAction,
        timestamp: impl Into<String>,
        status: AttendanceStatus,
    ) -> Self {
        let message = default_message(&status, &action, None);
        Self {
            id: id.into(),
            employee_name: employee_name.into(),
            action,
            timestamp: timestamp.into(),
            status,
            message,
        }
    }

    /// Replace the message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Human-readable message for a status/action pair
///
/// `late_minutes` is only used for [`AttendanceStatus::Late`]; without it the
/// message is just "Late". Unrecognized statuses get an empty message.
pub fn default_message(
    status: &AttendanceStatus,
    action: &AttendanceAction,
    late_minutes: Option<u32>,
) -> String {
    match status {
        AttendanceStatus::Normal => match action {
            AttendanceAction::CheckOut => "Check out successfully".to_string(),
            _ => "Check in successfully".to_string(),
        },
        AttendanceStatus::Late => match late_minutes {
            Some(minutes) => format!("Late {} mins", minutes),
            None => "Late".to_string(),
        },
        AttendanceStatus::Error => "Device error".to_string(),
        AttendanceStatus::Forbidden => "Forbidden location".to_string(),
        AttendanceStatus::Other(_) => String::new(),
    }
}
