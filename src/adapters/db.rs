use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};
use thiserror::Error;

use crate::domain::models::{ChargingSessionRecord, NewChargingSession, SessionClosure};
use crate::domain::session_state::TimestampMs;

pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    r#"
CREATE TABLE IF NOT EXISTS charging_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    start_percentage INTEGER NOT NULL CHECK (start_percentage BETWEEN 0 AND 100),
    start_time TEXT NOT NULL,
    end_percentage INTEGER CHECK (end_percentage BETWEEN 0 AND 100),
    end_time TEXT,
    CHECK ((end_percentage IS NULL) = (end_time IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_charging_sessions_start_time_desc
ON charging_sessions (start_time DESC, id DESC);
"#,
)];

const SESSION_COLUMNS: &str = "id, start_percentage, start_time, end_percentage, end_time";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
    #[error("charging session {id} is no longer open")]
    AlreadyClosed { id: i64 },
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    Connection::open(path).map_err(DbError::from)
}

pub fn configure_busy_timeout(connection: &Connection, timeout: Duration) -> Result<(), DbError> {
    connection.busy_timeout(timeout).map_err(DbError::from)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

pub fn insert_session(
    connection: &Connection,
    new_session: &NewChargingSession,
) -> Result<ChargingSessionRecord, DbError> {
    connection.execute(
        "INSERT INTO charging_sessions (start_percentage, start_time) VALUES (?1, ?2)",
        params![
            i64::from(new_session.start_percentage),
            new_session.start_time.to_iso8601(),
        ],
    )?;

    Ok(ChargingSessionRecord {
        id: connection.last_insert_rowid(),
        start_percentage: new_session.start_percentage,
        start_time: new_session.start_time,
        end_percentage: None,
        end_time: None,
    })
}

/// Most recently started session that has no end reading yet.
pub fn find_open_session(
    connection: &Connection,
) -> Result<Option<ChargingSessionRecord>, DbError> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS}
         FROM charging_sessions
         WHERE end_percentage IS NULL
         ORDER BY start_time DESC, id DESC
         LIMIT 1"
    );

    connection
        .query_row(&sql, [], map_session_row)
        .optional()
        .map_err(DbError::from)
}

pub fn get_session(
    connection: &Connection,
    id: i64,
) -> Result<Option<ChargingSessionRecord>, DbError> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM charging_sessions WHERE id = ?1");

    connection
        .query_row(&sql, params![id], map_session_row)
        .optional()
        .map_err(DbError::from)
}

/// Fills the end fields of `closure.session_id` only if that row is still
/// open when the update runs. Zero affected rows yields `AlreadyClosed`.
pub fn close_open_session(
    connection: &Connection,
    closure: &SessionClosure,
) -> Result<ChargingSessionRecord, DbError> {
    let changed = connection.execute(
        "UPDATE charging_sessions
         SET end_percentage = ?1, end_time = ?2
         WHERE id = ?3 AND end_percentage IS NULL",
        params![
            i64::from(closure.end_percentage),
            closure.end_time.to_iso8601(),
            closure.session_id,
        ],
    )?;

    if changed == 0 {
        return Err(DbError::AlreadyClosed {
            id: closure.session_id,
        });
    }

    get_session(connection, closure.session_id)?.ok_or(DbError::AlreadyClosed {
        id: closure.session_id,
    })
}

/// All sessions, newest first.
pub fn list_sessions(connection: &Connection) -> Result<Vec<ChargingSessionRecord>, DbError> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS}
         FROM charging_sessions
         ORDER BY start_time DESC, id DESC"
    );
    let mut statement = connection.prepare(&sql)?;

    let rows = statement.query_map([], map_session_row)?;

    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?);
    }

    Ok(sessions)
}

pub fn delete_session(connection: &Connection, id: i64) -> Result<bool, DbError> {
    let removed = connection.execute(
        "DELETE FROM charging_sessions WHERE id = ?1",
        params![id],
    )?;
    Ok(removed > 0)
}

pub fn delete_all_sessions(connection: &Connection) -> Result<usize, DbError> {
    let removed = connection.execute("DELETE FROM charging_sessions", [])?;
    Ok(removed)
}

fn map_session_row(row: &Row<'_>) -> rusqlite::Result<ChargingSessionRecord> {
    let end_percentage: Option<i64> = row.get(3)?;
    let end_time: Option<String> = row.get(4)?;

    Ok(ChargingSessionRecord {
        id: row.get(0)?,
        start_percentage: percentage_column(1, row.get(1)?)?,
        start_time: timestamp_column(2, &row.get::<_, String>(2)?)?,
        end_percentage: end_percentage
            .map(|value| percentage_column(3, value))
            .transpose()?,
        end_time: end_time
            .map(|value| timestamp_column(4, &value))
            .transpose()?,
    })
}

fn percentage_column(index: usize, value: i64) -> rusqlite::Result<u8> {
    u8::try_from(value).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Integer, error.into())
    })
}

fn timestamp_column(index: usize, value: &str) -> rusqlite::Result<TimestampMs> {
    TimestampMs::parse_iso8601(value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Text,
            format!("invalid timestamp: {value}").into(),
        )
    })
}
