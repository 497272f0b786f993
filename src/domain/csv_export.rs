use thiserror::Error;

use crate::domain::models::ChargingSessionRecord;

pub const CSV_HEADER: [&str; 4] = [
    "start_percentage",
    "start_datetime",
    "end_percentage",
    "end_datetime",
];

#[derive(Debug, Error)]
pub enum CsvExportError {
    #[error("failed to write csv record: {0}")]
    Write(#[from] csv::Error),
    #[error("failed to finish csv output: {0}")]
    Finish(String),
}

/// Renders sessions in the order given. Callers pass them oldest first.
pub fn render_sessions_csv<'a, I>(sessions: I) -> Result<String, CsvExportError>
where
    I: IntoIterator<Item = &'a ChargingSessionRecord>,
{
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER)?;

    for session in sessions {
        let end_percentage = session
            .end_percentage
            .map(|value| value.to_string())
            .unwrap_or_default();
        let end_time = session
            .end_time
            .map(|value| value.to_iso8601())
            .unwrap_or_default();

        writer.write_record([
            session.start_percentage.to_string(),
            session.start_time.to_iso8601(),
            end_percentage,
            end_time,
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|error| CsvExportError::Finish(error.error().to_string()))?;
    String::from_utf8(bytes).map_err(|error| CsvExportError::Finish(error.to_string()))
}
