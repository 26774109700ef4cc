#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast};
use uuid::Uuid;

use dealerhub::{
    auth::{
        machine::{AuthHandle, AuthMachine, MachineOptions},
        navigation::{Navigator, Redirect},
    },
    error::{AppError, Result},
    models::{
        auth_state::AuthState,
        profile::{Profile, ProfileStatus, ProfileUpdate},
        role::Role,
        session::{Session, SessionEvent},
    },
    ports::{ProfileBackend, SessionStore},
};

pub fn session_for(user_id: Uuid) -> Session {
    let now = Utc::now();
    Session {
        id: Uuid::new_v4(),
        user_id,
        email: format!("{}@dealerhub.test", &user_id.simple().to_string()[..8]),
        created_at: now,
        expires_at: now + chrono::Duration::days(7),
    }
}

/// A session that expires `ttl` from now.
pub fn session_expiring_in(user_id: Uuid, ttl: Duration) -> Session {
    let mut session = session_for(user_id);
    session.expires_at = Utc::now() + chrono::Duration::from_std(ttl).expect("short ttl");
    session
}

pub fn profile(user_id: Uuid, role: Role, status: ProfileStatus) -> Profile {
    let now = Utc::now();
    Profile {
        user_id,
        role,
        status,
        display_name: format!("User {}", role),
        created_at: now,
        updated_at: now,
    }
}

/// A session store held in memory. Events are pushed by the test.
pub struct MemorySessionStore {
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<SessionEvent>,
    fail_lookup: AtomicBool,
    fail_sign_out: AtomicBool,
    sign_outs: AtomicUsize,
    lookups: AtomicUsize,
}

impl MemorySessionStore {
    pub fn new(session: Option<Session>) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(session),
            events: broadcast::channel(16).0,
            fail_lookup: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            sign_outs: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
        })
    }

    pub fn sign_in(&self, session: Session) {
        *self.session.lock() = Some(session.clone());
        let _ = self.events.send(SessionEvent::SignedIn(session));
    }

    /// Re-announces the current session, as a profile change does.
    pub fn refresh(&self) {
        if let Some(session) = self.session.lock().clone() {
            let _ = self.events.send(SessionEvent::SignedIn(session));
        }
    }

    /// A sign-out that happened somewhere else.
    pub fn expire(&self) {
        *self.session.lock() = None;
        let _ = self.events.send(SessionEvent::SignedOut);
    }

    pub fn fail_lookup(&self) {
        self.fail_lookup.store(true, Ordering::SeqCst);
    }

    pub fn fail_sign_out(&self) {
        self.fail_sign_out.store(true, Ordering::SeqCst);
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }

    /// How many times `current_session` was called.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<Session> {
        self.session.lock().clone()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn current_session(&self) -> Result<Option<Session>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(AppError::Internal("session store offline".to_string()));
        }
        Ok(self.session.lock().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn sign_out(&self) -> Result<()> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(AppError::Internal("session store offline".to_string()));
        }
        if self.session.lock().take().is_some() {
            let _ = self.events.send(SessionEvent::SignedOut);
        }
        Ok(())
    }
}

/// A profile backend whose answers the test controls.
#[derive(Default)]
pub struct ScriptedProfileBackend {
    profiles: Mutex<HashMap<Uuid, Profile>>,
    held: Mutex<HashMap<Uuid, Arc<Notify>>>,
    failing: Mutex<HashSet<Uuid>>,
    hanging: Mutex<HashSet<Uuid>>,
    panicking: Mutex<HashSet<Uuid>>,
    fetches: AtomicUsize,
}

impl ScriptedProfileBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, profile: Profile) {
        self.profiles.lock().insert(profile.user_id, profile);
    }

    /// Fetches for `user_id` wait until [`release`](Self::release).
    pub fn hold(&self, user_id: Uuid) {
        self.held.lock().insert(user_id, Arc::new(Notify::new()));
    }

    pub fn release(&self, user_id: Uuid) {
        if let Some(gate) = self.held.lock().remove(&user_id) {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    pub fn fail(&self, user_id: Uuid) {
        self.failing.lock().insert(user_id);
    }

    /// Fetches for `user_id` never resolve.
    pub fn hang(&self, user_id: Uuid) {
        self.hanging.lock().insert(user_id);
    }

    /// Fetches for `user_id` panic.
    pub fn panic_on(&self, user_id: Uuid) {
        self.panicking.lock().insert(user_id);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileBackend for ScriptedProfileBackend {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let gate = self.held.lock().get(&user_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.hanging.lock().contains(&user_id) {
            std::future::pending::<()>().await;
        }
        let panics = self.panicking.lock().contains(&user_id);
        if panics {
            panic!("profile row could not be decoded");
        }
        if self.failing.lock().contains(&user_id) {
            return Err(AppError::Internal("profiles table unavailable".to_string()));
        }
        Ok(self.profiles.lock().get(&user_id).cloned())
    }

    async fn update_profile(&self, user_id: Uuid, fields: ProfileUpdate) -> Result<Profile> {
        let mut profiles = self.profiles.lock();
        let profile = profiles.get_mut(&user_id).ok_or(AppError::NotFound)?;
        if let Some(name) = fields.display_name {
            profile.display_name = name;
        }
        if let Some(role) = fields.role {
            profile.role = role;
        }
        if let Some(status) = fields.status {
            profile.status = status;
        }
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<Redirect>>,
}

impl RecordingNavigator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn visits(&self) -> Vec<Redirect> {
        self.visits.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, to: Redirect) {
        self.visits.lock().push(to);
    }
}

pub struct Harness {
    pub store: Arc<MemorySessionStore>,
    pub profiles: Arc<ScriptedProfileBackend>,
    pub navigator: Arc<RecordingNavigator>,
    pub handle: AuthHandle,
}

impl Harness {
    pub fn start(store: Arc<MemorySessionStore>, profiles: Arc<ScriptedProfileBackend>) -> Self {
        Self::start_with(store, profiles, MachineOptions::default())
    }

    pub fn start_with(
        store: Arc<MemorySessionStore>,
        profiles: Arc<ScriptedProfileBackend>,
        options: MachineOptions,
    ) -> Self {
        let navigator = RecordingNavigator::new();
        let handle = AuthMachine::spawn(
            store.clone(),
            profiles.clone(),
            navigator.clone(),
            options,
        );
        Self {
            store,
            profiles,
            navigator,
            handle,
        }
    }

    /// Waits until a snapshot matches, failing the test after a second.
    pub async fn wait_for(&self, predicate: impl FnMut(&AuthState) -> bool) -> AuthState {
        let mut rx = self.handle.subscribe();
        let found = tokio::time::timeout(Duration::from_secs(1), rx.wait_for(predicate))
            .await
            .expect("timed out waiting for auth state")
            .expect("auth machine stopped")
            .clone();
        found
    }
}
