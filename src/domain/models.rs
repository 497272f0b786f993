use crate::domain::session_state::TimestampMs;

/// One row of the `charging_sessions` table. The end fields are either both
/// present or both absent; absent means the session is still open.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargingSessionRecord {
    pub id: i64,
    pub start_percentage: u8,
    pub start_time: TimestampMs,
    pub end_percentage: Option<u8>,
    pub end_time: Option<TimestampMs>,
}

impl ChargingSessionRecord {
    pub fn is_open(&self) -> bool {
        self.end_percentage.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewChargingSession {
    pub start_percentage: u8,
    pub start_time: TimestampMs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionClosure {
    pub session_id: i64,
    pub end_percentage: u8,
    pub end_time: TimestampMs,
}
