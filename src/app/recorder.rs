use thiserror::Error;

use crate::app::services::{ServiceError, SessionCommandHandler, SessionQueryHandler};
use crate::domain::models::{ChargingSessionRecord, NewChargingSession, SessionClosure};
use crate::domain::session_state::{
    Clock, Intent, SessionReading, SessionStateError, SessionTransition, plan_transition,
};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Rejected(#[from] SessionStateError),
    #[error("session store unavailable: {0}")]
    StoreUnavailable(#[source] ServiceError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSession {
    pub intent: Intent,
    pub session: ChargingSessionRecord,
}

impl RecordedSession {
    pub fn message(&self) -> String {
        let percentage = match self.intent {
            Intent::Start => self.session.start_percentage,
            Intent::End => self.session.end_percentage.unwrap_or_default(),
        };
        format!("Recorded {percentage}% as {} charge", self.intent)
    }
}

/// Applies percentage readings to the session store.
///
/// Holds no state of its own between calls; the open session is re-read
/// from the store for every `end` reading and closed with a conditional
/// update, so concurrent callers can share one recorder.
#[derive(Clone)]
pub struct SessionRecorder<S, C> {
    store: S,
    clock: C,
}

impl<S, C> SessionRecorder<S, C>
where
    S: SessionQueryHandler + SessionCommandHandler,
    C: Clock,
{
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn record(&self, percentage: i64, intent: &str) -> Result<RecordedSession, RecordError> {
        let reading = SessionReading::parse(percentage, intent)?;

        let open = match reading.intent {
            Intent::Start => None,
            Intent::End => self
                .store
                .find_open_session()
                .map_err(RecordError::StoreUnavailable)?,
        };

        match plan_transition(reading, open.as_ref(), &self.clock)? {
            SessionTransition::Open {
                start_percentage,
                start_time,
            } => {
                let session = self
                    .store
                    .insert_session(&NewChargingSession {
                        start_percentage,
                        start_time,
                    })
                    .map_err(RecordError::StoreUnavailable)?;

                tracing::info!(
                    session_id = session.id,
                    start_percentage,
                    start_time = %start_time.to_iso8601(),
                    "charging session started"
                );

                Ok(RecordedSession {
                    intent: Intent::Start,
                    session,
                })
            }
            SessionTransition::Close {
                session_id,
                end_percentage,
                end_time,
            } => {
                let closure = SessionClosure {
                    session_id,
                    end_percentage,
                    end_time,
                };

                match self.store.close_open_session(&closure) {
                    Ok(session) => {
                        tracing::info!(
                            session_id,
                            start_percentage = session.start_percentage,
                            end_percentage,
                            end_time = %end_time.to_iso8601(),
                            "charging session ended"
                        );

                        Ok(RecordedSession {
                            intent: Intent::End,
                            session,
                        })
                    }
                    Err(ServiceError::AlreadyClosed { id }) => {
                        tracing::warn!(
                            session_id = id,
                            "open session was closed by a concurrent request"
                        );
                        Err(SessionStateError::NoOpenSession.into())
                    }
                    Err(error) => Err(RecordError::StoreUnavailable(error)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;

    use super::{RecordError, RecordedSession, SessionRecorder};
    use crate::app::services::{
        ServiceError, SessionCommandHandler, SessionQueryHandler, SqliteSessionService,
    };
    use crate::domain::models::{ChargingSessionRecord, NewChargingSession, SessionClosure};
    use crate::domain::session_state::{
        Clock, Intent, SessionStateError, SystemClock, TimestampMs,
    };
    use crate::test_support::open_test_connection;

    struct StepClock {
        next: Cell<i64>,
    }

    impl StepClock {
        fn starting_at(value: i64) -> Self {
            Self {
                next: Cell::new(value),
            }
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> TimestampMs {
            let value = self.next.get();
            self.next.set(value + 1_000);
            TimestampMs(value)
        }
    }

    fn sqlite_recorder(name: &str) -> SessionRecorder<SqliteSessionService, StepClock> {
        let service =
            SqliteSessionService::new(Arc::new(Mutex::new(open_test_connection(name))));
        SessionRecorder::new(service, StepClock::starting_at(1_700_000_000_000))
    }

    fn all_sessions<C: Clock>(
        recorder: &SessionRecorder<SqliteSessionService, C>,
    ) -> Vec<ChargingSessionRecord> {
        recorder.store.list_sessions().expect("list should succeed")
    }

    #[test]
    fn start_always_opens_a_new_session() {
        let recorder = sqlite_recorder("recorder-start");

        for percentage in [0_i64, 42, 100] {
            let recorded = recorder
                .record(percentage, "start")
                .expect("start should succeed");
            assert_eq!(recorded.intent, Intent::Start);
            assert_eq!(i64::from(recorded.session.start_percentage), percentage);
            assert!(recorded.session.is_open());
        }

        let sessions = all_sessions(&recorder);
        assert_eq!(sessions.len(), 3);
        assert!(sessions.iter().all(ChargingSessionRecord::is_open));
    }

    #[test]
    fn out_of_range_readings_do_not_touch_the_store() {
        let recorder = sqlite_recorder("recorder-invalid");
        recorder.record(50, "start").expect("start should succeed");

        for intent in ["start", "end"] {
            for percentage in [-1_i64, 101, 1_000] {
                let result = recorder.record(percentage, intent);
                assert!(matches!(
                    result,
                    Err(RecordError::Rejected(SessionStateError::InvalidInput))
                ));
            }
        }

        let sessions = all_sessions(&recorder);
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].is_open());
    }

    #[test]
    fn unknown_intent_is_rejected() {
        let recorder = sqlite_recorder("recorder-intent");

        let result = recorder.record(50, "pause");

        assert!(matches!(
            result,
            Err(RecordError::Rejected(SessionStateError::InvalidIntent))
        ));
        assert!(all_sessions(&recorder).is_empty());
    }

    #[test]
    fn end_closes_only_the_open_session() {
        let recorder = sqlite_recorder("recorder-end");
        recorder.record(10, "start").expect("start should succeed");
        let first_closed = recorder.record(60, "end").expect("end should succeed");
        let open = recorder.record(20, "start").expect("start should succeed");

        let closed = recorder.record(85, "end").expect("end should succeed");

        assert_eq!(closed.intent, Intent::End);
        assert_eq!(closed.session.id, open.session.id);
        assert_eq!(closed.session.start_percentage, 20);
        assert_eq!(closed.session.start_time, open.session.start_time);
        assert_eq!(closed.session.end_percentage, Some(85));
        assert!(closed.session.end_time >= Some(closed.session.start_time));

        let sessions = all_sessions(&recorder);
        let untouched = sessions
            .iter()
            .find(|session| session.id == first_closed.session.id)
            .expect("first session should still exist");
        assert_eq!(untouched, &first_closed.session);
    }

    #[test]
    fn end_with_nothing_open_is_rejected() {
        let recorder = sqlite_recorder("recorder-end-none");

        let result = recorder.record(80, "end");

        assert!(matches!(
            result,
            Err(RecordError::Rejected(SessionStateError::NoOpenSession))
        ));
        assert!(all_sessions(&recorder).is_empty());
    }

    #[test]
    fn list_reflects_starts_and_ends() {
        let recorder = sqlite_recorder("recorder-list");
        for percentage in [10, 20, 30, 40] {
            recorder
                .record(percentage, "start")
                .expect("start should succeed");
        }
        recorder.record(90, "end").expect("end should succeed");
        recorder.record(95, "end").expect("end should succeed");

        let sessions = all_sessions(&recorder);
        assert_eq!(sessions.len(), 4);
        assert_eq!(sessions.iter().filter(|s| s.is_open()).count(), 2);
        assert!(
            sessions
                .windows(2)
                .all(|pair| pair[0].start_time >= pair[1].start_time)
        );
        // newest open sessions are closed first
        assert_eq!(sessions[0].end_percentage, Some(90));
        assert_eq!(sessions[1].end_percentage, Some(95));
    }

    #[test]
    fn concurrent_ends_close_the_session_exactly_once() {
        let service = SqliteSessionService::new(Arc::new(Mutex::new(open_test_connection(
            "recorder-race",
        ))));
        let recorder = Arc::new(SessionRecorder::new(service, SystemClock));
        let opened = recorder.record(30, "start").expect("start should succeed");

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [70_i64, 75]
            .into_iter()
            .map(|percentage| {
                let recorder = Arc::clone(&recorder);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    recorder.record(percentage, "end")
                })
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread should not panic"))
            .collect();

        let winners: Vec<&RecordedSession> =
            results.iter().filter_map(|result| result.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results.iter().any(|result| matches!(
            result,
            Err(RecordError::Rejected(SessionStateError::NoOpenSession))
        )));

        let sessions = recorder.store.list_sessions().expect("list should succeed");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, opened.session.id);
        assert_eq!(sessions[0].end_percentage, winners[0].session.end_percentage);
        assert!(sessions[0].end_time.is_some());
    }

    /// Reports an open session that a concurrent request has already closed.
    struct StaleSnapshotStore {
        close_calls: AtomicUsize,
    }

    impl SessionQueryHandler for StaleSnapshotStore {
        fn find_open_session(&self) -> Result<Option<ChargingSessionRecord>, ServiceError> {
            Ok(Some(ChargingSessionRecord {
                id: 7,
                start_percentage: 25,
                start_time: TimestampMs(1_000),
                end_percentage: None,
                end_time: None,
            }))
        }

        fn list_sessions(&self) -> Result<Vec<ChargingSessionRecord>, ServiceError> {
            Ok(Vec::new())
        }
    }

    impl SessionCommandHandler for StaleSnapshotStore {
        fn insert_session(
            &self,
            _new_session: &NewChargingSession,
        ) -> Result<ChargingSessionRecord, ServiceError> {
            Err(ServiceError::DbLockPoisoned)
        }

        fn close_open_session(
            &self,
            closure: &SessionClosure,
        ) -> Result<ChargingSessionRecord, ServiceError> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::AlreadyClosed {
                id: closure.session_id,
            })
        }

        fn delete_session(&self, _id: i64) -> Result<bool, ServiceError> {
            Ok(false)
        }

        fn delete_all_sessions(&self) -> Result<usize, ServiceError> {
            Ok(0)
        }
    }

    #[test]
    fn lost_close_race_surfaces_as_no_open_session() {
        let recorder = SessionRecorder::new(
            StaleSnapshotStore {
                close_calls: AtomicUsize::new(0),
            },
            StepClock::starting_at(5_000),
        );

        let result = recorder.record(80, "end");

        assert!(matches!(
            result,
            Err(RecordError::Rejected(SessionStateError::NoOpenSession))
        ));
        assert_eq!(recorder.store.close_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn store_failures_surface_as_unavailable() {
        let recorder = SessionRecorder::new(
            StaleSnapshotStore {
                close_calls: AtomicUsize::new(0),
            },
            StepClock::starting_at(5_000),
        );

        let result = recorder.record(40, "start");

        assert!(matches!(
            result,
            Err(RecordError::StoreUnavailable(ServiceError::DbLockPoisoned))
        ));
    }

    #[test]
    fn formats_confirmation_messages() {
        let recorder = sqlite_recorder("recorder-message");

        let started = recorder.record(20, "start").expect("start should succeed");
        let ended = recorder.record(80, "end").expect("end should succeed");

        assert_eq!(started.message(), "Recorded 20% as start charge");
        assert_eq!(ended.message(), "Recorded 80% as end charge");
    }
}
