//! Seams between the auth core and the systems it talks to.

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    profile::{Profile, ProfileUpdate},
    session::{Session, SessionEvent},
};

/// Holds the authenticated identity for one client.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The live session, if any. An expired session reads as `None`.
    async fn current_session(&self) -> Result<Option<Session>>;

    /// Subscribes to sign-in and sign-out events. Dropping the receiver
    /// unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Ends the session. Signing out with no session is not an error.
    async fn sign_out(&self) -> Result<()>;
}

/// Reads and writes profile records.
#[async_trait]
pub trait ProfileBackend: Send + Sync {
    /// `Ok(None)` when the user has no profile row.
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>>;

    async fn update_profile(&self, user_id: Uuid, fields: ProfileUpdate) -> Result<Profile>;
}
