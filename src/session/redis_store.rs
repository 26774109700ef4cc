use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, aio::ConnectionManager};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    error::Result,
    models::session::{Session, SessionEvent},
    ports::SessionStore,
    session::bus::SessionBus,
};

fn session_key(session_id: &Uuid) -> String {
    format!("session:{}", session_id)
}

fn user_sessions_key(user_id: &Uuid) -> String {
    format!("user_sessions:{}", user_id)
}

/// Sessions kept in Redis, with lifecycle events on a [`SessionBus`].
#[derive(Clone)]
pub struct RedisSessions {
    redis: ConnectionManager,
    bus: SessionBus,
    ttl_secs: u64,
}

impl RedisSessions {
    pub fn new(redis: ConnectionManager, bus: SessionBus, ttl_secs: u64) -> Self {
        Self { redis, bus, ttl_secs }
    }

    pub fn bus(&self) -> &SessionBus {
        &self.bus
    }

    /// Creates a session for `user_id` and announces it.
    pub async fn create(&self, user_id: Uuid, email: String) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            email,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(self.ttl_secs as i64),
        };

        let session_json = sonic_rs::to_string(&session)?;
        let mut redis = self.redis.clone();

        let _: () = redis
            .set_ex(session_key(&session.id), &session_json, self.ttl_secs)
            .await
            .map_err(|e| {
                tracing::error!("❌ Redis set_ex failed: {}", e);
                e
            })?;

        let index = user_sessions_key(&user_id);
        let _: () = redis.sadd(&index, session.id.to_string()).await?;
        let _: () = redis.expire(&index, self.ttl_secs as i64).await?;

        tracing::info!("✅ Session saved to Redis: session:{}", session.id);
        self.bus.publish(session.id, SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    /// Loads a live session. Expired sessions are deleted and read as `None`.
    pub async fn load(&self, session_id: &Uuid) -> Result<Option<Session>> {
        let mut redis = self.redis.clone();
        let session_json: Option<String> = redis.get(session_key(session_id)).await?;

        let Some(session_json) = session_json else {
            return Ok(None);
        };
        let session: Session = sonic_rs::from_str(&session_json)?;

        if session.is_expired() {
            tracing::warn!("❌ Session expired for user: {}", session.user_id);
            self.remove(&session).await?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Deletes the session and tells its subscribers. Deleting a session that
    /// no longer exists still notifies them.
    pub async fn destroy(&self, session_id: &Uuid) -> Result<()> {
        let mut redis = self.redis.clone();
        let session_json: Option<String> = redis.get(session_key(session_id)).await?;

        match session_json.and_then(|json| sonic_rs::from_str::<Session>(&json).ok()) {
            Some(session) => self.remove(&session).await?,
            None => {
                let _: () = redis.del(session_key(session_id)).await?;
            }
        }

        tracing::info!("✅ Session deleted from Redis: session:{}", session_id);
        self.bus.publish(*session_id, SessionEvent::SignedOut);
        Ok(())
    }

    /// Live sessions belonging to `user_id`. Stale index entries are pruned.
    pub async fn sessions_for_user(&self, user_id: &Uuid) -> Result<Vec<Session>> {
        let mut redis = self.redis.clone();
        let index = user_sessions_key(user_id);
        let members: Vec<String> = redis.smembers(&index).await?;

        let mut sessions = Vec::with_capacity(members.len());
        for member in members {
            let live = match Uuid::parse_str(&member) {
                Ok(id) => self.load(&id).await?,
                Err(_) => None,
            };
            match live {
                Some(session) => sessions.push(session),
                None => {
                    let _: () = redis.srem(&index, &member).await?;
                }
            }
        }
        Ok(sessions)
    }

    /// Re-announces every live session of `user_id` so their auth machines
    /// reload the profile. Returns the number of sessions notified.
    pub async fn refresh_user(&self, user_id: &Uuid) -> Result<usize> {
        let sessions = self.sessions_for_user(user_id).await?;
        let count = sessions.len();
        for session in sessions {
            self.bus.publish(session.id, SessionEvent::SignedIn(session));
        }
        tracing::debug!("🔄 Refreshed {} session(s) for user: {}", count, user_id);
        Ok(count)
    }

    /// A [`SessionStore`] view bound to one session id.
    pub fn scoped(&self, session_id: Uuid) -> RedisSessionStore {
        RedisSessionStore {
            sessions: self.clone(),
            session_id,
        }
    }

    async fn remove(&self, session: &Session) -> Result<()> {
        let mut redis = self.redis.clone();
        let _: () = redis.del(session_key(&session.id)).await?;
        let _: () = redis
            .srem(user_sessions_key(&session.user_id), session.id.to_string())
            .await?;
        Ok(())
    }
}

/// The session store as seen by one browser session.
#[derive(Clone)]
pub struct RedisSessionStore {
    sessions: RedisSessions,
    session_id: Uuid,
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn current_session(&self) -> Result<Option<Session>> {
        self.sessions.load(&self.session_id).await
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sessions.bus.subscribe(self.session_id)
    }

    async fn sign_out(&self) -> Result<()> {
        self.sessions.destroy(&self.session_id).await
    }
}
