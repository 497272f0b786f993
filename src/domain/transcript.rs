use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::domain::session_state::Intent;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+").expect("number pattern is valid"));

static END_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(end|ended|ending|stop|stopped|stopping|finish|finished|done|unplug|unplugged)\b",
    )
    .expect("end keyword pattern is valid")
});

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("No percentage found in transcript")]
    NoNumberFound,
}

/// Raw values extracted from free text. The percentage is not range checked
/// here; that happens when the reading is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptReading {
    pub percentage: i64,
    pub intent: Intent,
}

pub fn parse_transcript(text: &str) -> Result<TranscriptReading, TranscriptError> {
    let digits = NUMBER_RE
        .find(text)
        .ok_or(TranscriptError::NoNumberFound)?
        .as_str();
    // only overflow can fail here; saturate so validation rejects it
    let percentage = digits.parse::<i64>().unwrap_or(if digits.starts_with('-') {
        i64::MIN
    } else {
        i64::MAX
    });

    let intent = if END_KEYWORD_RE.is_match(text) {
        Intent::End
    } else {
        Intent::Start
    };

    Ok(TranscriptReading { percentage, intent })
}
