use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::services::redis_handling::KvStore;
use crate::types::{CoreError, CoreResult, BOOKING_STATUS_KEY, BOOKING_STATUS_TTL_S};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingState {
    Pending,
    Confirmed,
    Failed,
}

impl BookingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingState::Confirmed | BookingState::Failed)
    }
}

/// Outcome record the client polls by session id while the pipeline works.
/// A pending record written under the OTP session keeps `client_session`
/// pointing back at the submit session, so terminal writes reach both.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BookingStatus {
    pub state: BookingState,
    pub reservation_id: Option<i64>,
    pub otp_session: Option<String>,
    pub client_session: Option<String>,
    pub message: Option<String>,
}

impl BookingStatus {
    /// Accepted but not yet picked up by a worker.
    pub fn queued() -> Self {
        BookingStatus {
            state: BookingState::Pending,
            reservation_id: None,
            otp_session: None,
            client_session: None,
            message: None,
        }
    }

    pub fn pending(reservation_id: i64, otp_session: &str, client_session: &str) -> Self {
        BookingStatus {
            state: BookingState::Pending,
            reservation_id: Some(reservation_id),
            otp_session: Some(otp_session.to_owned()),
            client_session: Some(client_session.to_owned()),
            message: None,
        }
    }

    pub fn confirmed(reservation_id: i64) -> Self {
        BookingStatus {
            state: BookingState::Confirmed,
            reservation_id: Some(reservation_id),
            otp_session: None,
            client_session: None,
            message: None,
        }
    }

    pub fn failed(message: &str) -> Self {
        BookingStatus {
            state: BookingState::Failed,
            reservation_id: None,
            otp_session: None,
            client_session: None,
            message: Some(message.to_owned()),
        }
    }
}

#[derive(Clone)]
pub struct BookingStatusStore {
    store: Arc<dyn KvStore>,
}

impl BookingStatusStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        BookingStatusStore { store }
    }

    fn key(session_id: &str) -> String {
        format!("{BOOKING_STATUS_KEY}:{session_id}")
    }

    /// Writes the record under the session id. A terminal record is never
    /// rolled back to pending; retried jobs may attempt exactly that.
    pub fn write(&self, session_id: &str, status: &BookingStatus) -> CoreResult<()> {
        if status.state == BookingState::Pending {
            if let Some(existing) = self.read(session_id)? {
                if existing.state.is_terminal() {
                    return Ok(());
                }
            }
        }
        let raw = serde_json::to_string(status)
            .map_err(|err| CoreError::Infrastructure(err.to_string()))?;
        self.store
            .set_ex(&Self::key(session_id), &raw, BOOKING_STATUS_TTL_S)
    }

    pub fn read(&self, session_id: &str) -> CoreResult<Option<BookingStatus>> {
        let Some(raw) = self.store.get(&Self::key(session_id))? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| CoreError::Infrastructure(err.to_string()))
    }

    /// The session ids sharing a booking's record: the given id plus the
    /// submit session its pending record points back to, when different.
    pub fn linked_sessions(&self, session_id: &str) -> CoreResult<Vec<String>> {
        let mut sessions = vec![session_id.to_owned()];
        if let Some(existing) = self.read(session_id)? {
            if let Some(client) = existing.client_session {
                if client != session_id {
                    sessions.push(client);
                }
            }
        }
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::redis_handling::MemoryStore;

    fn store() -> BookingStatusStore {
        BookingStatusStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn polling_an_unknown_session_finds_nothing() {
        assert!(store().read("nope").unwrap().is_none());
    }

    #[test]
    fn pending_then_confirmed() {
        let statuses = store();
        statuses.write("s1", &BookingStatus::pending(42, "otp-sess", "s1")).unwrap();
        let read = statuses.read("s1").unwrap().unwrap();
        assert_eq!(read.state, BookingState::Pending);
        assert_eq!(read.reservation_id, Some(42));
        assert_eq!(read.otp_session.as_deref(), Some("otp-sess"));

        statuses.write("s1", &BookingStatus::confirmed(42)).unwrap();
        let read = statuses.read("s1").unwrap().unwrap();
        assert_eq!(read.state, BookingState::Confirmed);
    }

    #[test]
    fn terminal_records_never_revert_to_pending() {
        let statuses = store();
        statuses.write("s1", &BookingStatus::failed("table already reserved")).unwrap();
        statuses.write("s1", &BookingStatus::pending(42, "otp-sess", "s1")).unwrap();
        let read = statuses.read("s1").unwrap().unwrap();
        assert_eq!(read.state, BookingState::Failed);
        assert_eq!(read.message.as_deref(), Some("table already reserved"));
    }

    #[test]
    fn terminal_writes_reach_both_sessions_of_a_booking() {
        let statuses = store();
        let pending = BookingStatus::pending(42, "otp-sess", "client-sess");
        statuses.write("client-sess", &pending).unwrap();
        statuses.write("otp-sess", &pending).unwrap();

        let sessions = statuses.linked_sessions("otp-sess").unwrap();
        assert_eq!(sessions, vec!["otp-sess".to_owned(), "client-sess".to_owned()]);

        for session in &sessions {
            statuses.write(session, &BookingStatus::confirmed(42)).unwrap();
        }
        let read = statuses.read("client-sess").unwrap().unwrap();
        assert_eq!(read.state, BookingState::Confirmed);
    }

    #[test]
    fn an_unlinked_session_stands_alone() {
        let statuses = store();
        statuses.write("solo", &BookingStatus::queued()).unwrap();
        assert_eq!(statuses.linked_sessions("solo").unwrap(), vec!["solo".to_owned()]);
        assert_eq!(statuses.linked_sessions("absent").unwrap(), vec!["absent".to_owned()]);
    }

    #[test]
    fn failed_carries_a_human_readable_reason() {
        let statuses = store();
        statuses.write("s2", &BookingStatus::failed("restaurant is closed on this date")).unwrap();
        let read = statuses.read("s2").unwrap().unwrap();
        assert_eq!(read.message.as_deref(), Some("restaurant is closed on this date"));
    }
}
