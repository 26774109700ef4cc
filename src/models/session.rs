use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated identity issued by the session store.
///
/// Serialized to JSON and kept in Redis under `session:{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The opaque session token, also carried in the `session_id` cookie.
    pub id: Uuid,
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// The email the user signed in with.
    pub email: String,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// The parts of the session that may leave the server.
    pub fn view(&self) -> SessionView<'_> {
        SessionView {
            user_id: self.user_id,
            email: &self.email,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// A [`Session`] as sent to clients. The token travels only in the cookie.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView<'a> {
    pub user_id: Uuid,
    pub email: &'a str,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A change in a session's lifecycle, as seen by its subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session was established, or its profile should be reloaded.
    SignedIn(Session),
    /// The session ended.
    SignedOut,
}
