use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
    auth::{
        machine::{AuthHandle, AuthMachine, MachineOptions},
        navigation::RedirectSlot,
    },
    models::auth_state::AuthPhase,
    ports::{ProfileBackend, SessionStore},
};

/// Builds the session store view for one session id.
pub type StoreFactory = Arc<dyn Fn(Uuid) -> Arc<dyn SessionStore> + Send + Sync>;

/// The auth machine serving one browser session, plus its parked redirect.
#[derive(Clone)]
pub struct SessionAuth {
    pub handle: AuthHandle,
    pub redirects: Arc<RedirectSlot>,
}

struct Entry {
    auth: SessionAuth,
    last_seen: Instant,
}

/// One auth machine per session id, started on first use.
#[derive(Clone)]
pub struct AuthRegistry {
    machines: Arc<Mutex<HashMap<Uuid, Entry>>>,
    stores: StoreFactory,
    profiles: Arc<dyn ProfileBackend>,
    options: MachineOptions,
}

impl AuthRegistry {
    pub fn new(stores: StoreFactory, profiles: Arc<dyn ProfileBackend>, options: MachineOptions) -> Self {
        Self {
            machines: Arc::new(Mutex::new(HashMap::new())),
            stores,
            profiles,
            options,
        }
    }

    /// Returns the machine for `session_id`, spawning it if needed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach(&self, session_id: Uuid) -> SessionAuth {
        let mut machines = self.machines.lock();

        if let Some(entry) = machines.get_mut(&session_id) {
            if !entry.auth.handle.is_closed() {
                entry.last_seen = Instant::now();
                return entry.auth.clone();
            }
        }

        let redirects = Arc::new(RedirectSlot::new());
        let handle = AuthMachine::spawn(
            (self.stores)(session_id),
            Arc::clone(&self.profiles),
            redirects.clone(),
            self.options,
        );
        let auth = SessionAuth { handle, redirects };
        machines.insert(
            session_id,
            Entry {
                auth: auth.clone(),
                last_seen: Instant::now(),
            },
        );
        tracing::debug!("🧩 Auth machine started for session: {}", session_id);
        auth
    }

    pub fn get(&self, session_id: &Uuid) -> Option<SessionAuth> {
        self.machines.lock().get(session_id).map(|e| e.auth.clone())
    }

    /// Stops and forgets the machine for `session_id`.
    pub fn detach(&self, session_id: &Uuid) -> Option<SessionAuth> {
        let entry = self.machines.lock().remove(session_id)?;
        entry.auth.handle.shutdown();
        Some(entry.auth)
    }

    /// Drops machines that have stopped, that settled signed out with no
    /// redirect left to deliver, or that have been idle longer than `idle`.
    pub fn sweep(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let mut machines = self.machines.lock();
        let before = machines.len();

        machines.retain(|_, entry| {
            let handle = &entry.auth.handle;
            let finished = handle.is_closed()
                || (handle.snapshot().phase() == AuthPhase::Unauthenticated
                    && entry.auth.redirects.peek().is_none());
            let stale = now.duration_since(entry.last_seen) > idle;

            if finished || stale {
                handle.shutdown();
                false
            } else {
                true
            }
        });

        before - machines.len()
    }

    pub fn len(&self) -> usize {
        self.machines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.lock().is_empty()
    }
}
