use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use thiserror::Error;

use crate::adapters::db;
use crate::adapters::db::DbError;
use crate::domain::models::{ChargingSessionRecord, NewChargingSession, SessionClosure};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database lock poisoned")]
    DbLockPoisoned,
    #[error("charging session {id} was already closed")]
    AlreadyClosed { id: i64 },
    #[error("database operation failed: {0}")]
    Database(DbError),
}

impl From<DbError> for ServiceError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::AlreadyClosed { id } => Self::AlreadyClosed { id },
            other => Self::Database(other),
        }
    }
}

pub trait SessionQueryHandler {
    fn find_open_session(&self) -> Result<Option<ChargingSessionRecord>, ServiceError>;
    fn list_sessions(&self) -> Result<Vec<ChargingSessionRecord>, ServiceError>;
}

pub trait SessionCommandHandler {
    fn insert_session(
        &self,
        new_session: &NewChargingSession,
    ) -> Result<ChargingSessionRecord, ServiceError>;
    /// Compare-and-swap close: fails with `AlreadyClosed` unless the target
    /// row is still open at write time.
    fn close_open_session(
        &self,
        closure: &SessionClosure,
    ) -> Result<ChargingSessionRecord, ServiceError>;
    fn delete_session(&self, id: i64) -> Result<bool, ServiceError>;
    fn delete_all_sessions(&self) -> Result<usize, ServiceError>;
}

#[derive(Clone)]
pub struct SqliteSessionService {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteSessionService {
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, ServiceError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| ServiceError::DbLockPoisoned)?;
        op(&connection).map_err(ServiceError::from)
    }
}

impl SessionQueryHandler for SqliteSessionService {
    fn find_open_session(&self) -> Result<Option<ChargingSessionRecord>, ServiceError> {
        self.with_connection(db::find_open_session)
    }

    fn list_sessions(&self) -> Result<Vec<ChargingSessionRecord>, ServiceError> {
        self.with_connection(db::list_sessions)
    }
}

impl SessionCommandHandler for SqliteSessionService {
    fn insert_session(
        &self,
        new_session: &NewChargingSession,
    ) -> Result<ChargingSessionRecord, ServiceError> {
        self.with_connection(|connection| db::insert_session(connection, new_session))
    }

    fn close_open_session(
        &self,
        closure: &SessionClosure,
    ) -> Result<ChargingSessionRecord, ServiceError> {
        self.with_connection(|connection| db::close_open_session(connection, closure))
    }

    fn delete_session(&self, id: i64) -> Result<bool, ServiceError> {
        self.with_connection(|connection| db::delete_session(connection, id))
    }

    fn delete_all_sessions(&self) -> Result<usize, ServiceError> {
        self.with_connection(db::delete_all_sessions)
    }
}
