use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::domain::models::ChargingSessionRecord;

pub const MAX_PERCENTAGE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimestampMs(pub i64);

impl TimestampMs {
    pub fn to_iso8601(self) -> String {
        let datetime = DateTime::<Utc>::from_timestamp_millis(self.0)
            .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH));
        datetime.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn parse_iso8601(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|datetime| Self(datetime.timestamp_millis()))
    }
}

pub trait Clock {
    fn now(&self) -> TimestampMs;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimestampMs {
        TimestampMs(Utc::now().timestamp_millis())
    }
}

/// Rejections produced before or instead of a store mutation. The `Display`
/// text is the `detail` message returned to HTTP callers.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionStateError {
    #[error("Percentage must be between 0 and 100")]
    InvalidInput,
    #[error("Type must be 'start' or 'end'")]
    InvalidIntent,
    #[error("No active charging session found")]
    NoOpenSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Start,
    End,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = SessionStateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "start" => Ok(Self::Start),
            "end" => Ok(Self::End),
            _ => Err(SessionStateError::InvalidIntent),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Percentage(u8);

impl Percentage {
    pub fn new(value: i64) -> Result<Self, SessionStateError> {
        if (0..=MAX_PERCENTAGE).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(SessionStateError::InvalidInput)
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

/// A validated `(percentage, intent)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReading {
    pub percentage: Percentage,
    pub intent: Intent,
}

impl SessionReading {
    /// Range is checked before intent, so an out-of-range reading with an
    /// unknown intent reports `InvalidInput`.
    pub fn parse(percentage: i64, intent: &str) -> Result<Self, SessionStateError> {
        let percentage = Percentage::new(percentage)?;
        let intent = intent.parse::<Intent>()?;
        Ok(Self { percentage, intent })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransition {
    Open {
        start_percentage: u8,
        start_time: TimestampMs,
    },
    Close {
        session_id: i64,
        end_percentage: u8,
        end_time: TimestampMs,
    },
}

/// Decides the single store mutation for `reading`.
///
/// `open` must be the most recently started open session as currently seen
/// by the store; it is ignored for `start` readings.
pub fn plan_transition<C: Clock>(
    reading: SessionReading,
    open: Option<&ChargingSessionRecord>,
    clock: &C,
) -> Result<SessionTransition, SessionStateError> {
    match reading.intent {
        Intent::Start => Ok(SessionTransition::Open {
            start_percentage: reading.percentage.value(),
            start_time: clock.now(),
        }),
        Intent::End => {
            let open = open
                .filter(|session| session.is_open())
                .ok_or(SessionStateError::NoOpenSession)?;
            let end_time = clock.now().max(open.start_time);

            Ok(SessionTransition::Close {
                session_id: open.id,
                end_percentage: reading.percentage.value(),
                end_time,
            })
        }
    }
}
