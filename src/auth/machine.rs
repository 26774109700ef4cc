//! The auth state machine.
//!
//! One task owns the state and is its only writer. It reacts to session
//! events, explicit sign-out requests and profile fetch completions, in that
//! priority, and publishes every change on a `watch` channel.
//!
//! Profile fetches run concurrently with event handling. Each one carries the
//! generation it was started under; anything that supersedes it (a newer
//! sign-in, a sign-out) bumps the generation, so a late result is dropped
//! instead of overwriting newer state.
//!
//! A settled session also carries a deadline taken from its `expires_at`.
//! When it passes, the machine ends the session as if the user signed out.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{broadcast::error::RecvError, mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    auth::navigation::{Navigator, Redirect},
    error::{AppError, AuthFailure},
    models::{
        auth_state::AuthState,
        profile::Profile,
        role::RoleSet,
        session::{Session, SessionEvent},
    },
    ports::{ProfileBackend, SessionStore},
};

/// The default upper bound on a profile fetch.
pub const DEFAULT_PROFILE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

const COMMAND_CAPACITY: usize = 8;

/// Tuning for a spawned machine.
#[derive(Debug, Clone, Copy)]
pub struct MachineOptions {
    /// Applied to the initial session lookup and to every profile fetch.
    pub profile_fetch_timeout: Duration,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            profile_fetch_timeout: DEFAULT_PROFILE_FETCH_TIMEOUT,
        }
    }
}

enum Command {
    SignOut(oneshot::Sender<()>),
    Shutdown,
}

enum FetchResult {
    Found(Profile),
    Missing,
    Failed(AppError),
    TimedOut,
}

struct FetchOutcome {
    generation: u64,
    session: Session,
    result: FetchResult,
}

/// Read side of a running machine. Cheap to clone.
///
/// The machine stops once every handle is dropped or
/// [`shutdown`](AuthHandle::shutdown) is called.
#[derive(Clone)]
pub struct AuthHandle {
    state: watch::Receiver<AuthState>,
    commands: mpsc::Sender<Command>,
}

impl AuthHandle {
    /// The current snapshot.
    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// A receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.clone()
    }

    /// Waits for the first snapshot that is not loading.
    ///
    /// Returns the last published snapshot if the machine has stopped.
    pub async fn settled(&self) -> AuthState {
        let mut rx = self.state.clone();
        let settled = rx.wait_for(|s| !s.is_loading()).await.map(|s| s.clone());
        settled.unwrap_or_else(|_| rx.borrow().clone())
    }

    /// Signs the session out and waits until the machine has settled.
    pub async fn sign_out(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::SignOut(reply)).await.is_err() {
            tracing::debug!("Sign-out requested on a stopped auth machine");
            return;
        }
        let _ = done.await;
    }

    pub fn has_role(&self, required: RoleSet) -> bool {
        self.state.borrow().has_role(required)
    }

    pub fn shutdown(&self) {
        let _ = self.commands.try_send(Command::Shutdown);
    }

    /// Whether the machine task has exited.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Merges a session and its profile into [`AuthState`] snapshots.
pub struct AuthMachine {
    store: Arc<dyn SessionStore>,
    profiles: Arc<dyn ProfileBackend>,
    navigator: Arc<dyn Navigator>,
    options: MachineOptions,
    state: watch::Sender<AuthState>,
    generation: u64,
    fetches: JoinSet<FetchOutcome>,
    expiry: Option<Instant>,
}

impl AuthMachine {
    /// Starts a machine on the current tokio runtime.
    ///
    /// The first snapshot is the loading shape; the machine then looks up the
    /// current session and settles.
    pub fn spawn(
        store: Arc<dyn SessionStore>,
        profiles: Arc<dyn ProfileBackend>,
        navigator: Arc<dyn Navigator>,
        options: MachineOptions,
    ) -> AuthHandle {
        let (state, state_rx) = watch::channel(AuthState::loading(None));
        let (commands, commands_rx) = mpsc::channel(COMMAND_CAPACITY);

        let machine = AuthMachine {
            store,
            profiles,
            navigator,
            options,
            state,
            generation: 0,
            fetches: JoinSet::new(),
            expiry: None,
        };
        tokio::spawn(machine.run(commands_rx));

        AuthHandle {
            state: state_rx,
            commands,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        // Subscribe before the lookup so nothing between the two is missed.
        let mut events = self.store.subscribe();
        self.initialize().await;

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::SignOut(reply)) => {
                        self.sign_out().await;
                        let _ = reply.send(());
                    }
                    Some(Command::Shutdown) | None => break,
                },

                event = events.recv() => match event {
                    Ok(SessionEvent::SignedIn(session)) => {
                        tracing::debug!("🔑 SIGNED_IN for user: {}", session.user_id);
                        self.begin_fetch(session);
                    }
                    Ok(SessionEvent::SignedOut) => {
                        tracing::debug!("👋 SIGNED_OUT received");
                        self.invalidate();
                        self.settle_signed_out();
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!("Session events lagged by {}, re-reading session", missed);
                        self.initialize().await;
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("Session event stream closed");
                        break;
                    }
                },

                Some(joined) = self.fetches.join_next() => match joined {
                    Ok(outcome) => self.apply(outcome).await,
                    Err(e) if e.is_cancelled() => {}
                    // Panics are caught inside the task, so this is a runtime fault.
                    Err(e) => tracing::error!("❌ Profile fetch task failed: {}", e),
                },

                _ = until(self.expiry) => self.expire_session().await,
            }
        }

        self.fetches.abort_all();
        tracing::debug!("Auth machine stopped");
    }

    async fn initialize(&mut self) {
        self.invalidate();
        let limit = self.options.profile_fetch_timeout;

        let lookup = tokio::time::timeout(limit, self.store.current_session()).await;
        match lookup {
            Ok(Ok(Some(session))) => self.begin_fetch(session),
            Ok(Ok(None)) => {
                tracing::debug!("No existing session");
                self.settle_signed_out();
            }
            Ok(Err(e)) => {
                tracing::warn!("{}", AuthFailure::SessionLookup(e.to_string()));
                self.settle_signed_out();
            }
            Err(_) => {
                tracing::warn!("Session lookup: {}", AuthFailure::Timeout(limit));
                self.settle_signed_out();
            }
        }
    }

    fn begin_fetch(&mut self, session: Session) {
        self.invalidate();
        let generation = self.generation;
        self.expiry = Some(deadline(&session));

        // Refreshing the session that is already settled keeps the current
        // snapshot until the new profile lands.
        let refreshing = {
            let current = self.state.borrow();
            !current.is_loading() && current.user().map(|u| u.id) == Some(session.id)
        };
        if !refreshing {
            self.publish(AuthState::loading(Some(session.clone())));
        }

        let profiles = Arc::clone(&self.profiles);
        let limit = self.options.profile_fetch_timeout;
        self.fetches.spawn(async move {
            let fetch = AssertUnwindSafe(profiles.get_profile(session.user_id)).catch_unwind();
            let result = match tokio::time::timeout(limit, fetch).await {
                Ok(Ok(Ok(Some(profile)))) => FetchResult::Found(profile),
                Ok(Ok(Ok(None))) => FetchResult::Missing,
                Ok(Ok(Err(e))) => FetchResult::Failed(e),
                Ok(Err(_)) => FetchResult::Failed(AppError::Internal("profile fetch panicked".to_string())),
                Err(_) => FetchResult::TimedOut,
            };
            FetchOutcome {
                generation,
                session,
                result,
            }
        });
    }

    async fn apply(&mut self, outcome: FetchOutcome) {
        if outcome.generation != self.generation {
            tracing::debug!(
                "Discarding stale profile fetch (generation {} < {})",
                outcome.generation,
                self.generation
            );
            return;
        }

        let FetchOutcome { session, result, .. } = outcome;
        let user_id = session.user_id;

        match result {
            FetchResult::Found(profile) => match AuthState::active(session, profile) {
                Some(state) => {
                    tracing::info!("✅ Auth settled for user: {}", user_id);
                    self.publish(state);
                }
                None => self.terminate_deactivated(user_id).await,
            },
            FetchResult::Missing => {
                tracing::warn!("{}", AuthFailure::ProfileNotFound(user_id));
                self.publish(AuthState::without_profile(session));
            }
            FetchResult::Failed(e) => {
                tracing::error!("❌ {}", AuthFailure::ProfileFetch(e.to_string()));
                self.publish(AuthState::without_profile(session));
            }
            FetchResult::TimedOut => {
                let limit = self.options.profile_fetch_timeout;
                tracing::warn!("Profile fetch for {}: {}", user_id, AuthFailure::Timeout(limit));
                self.publish(AuthState::without_profile(session));
            }
        }
    }

    async fn terminate_deactivated(&mut self, user_id: Uuid) {
        self.invalidate();
        tracing::info!("🚫 {}, signing out", AuthFailure::DeactivatedAccount(user_id));

        if let Err(e) = self.store.sign_out().await {
            tracing::warn!("{}", AuthFailure::SignOut(e.to_string()));
        }
        self.navigator.navigate(Redirect::SignInDeactivated);
        self.settle_signed_out();
    }

    async fn expire_session(&mut self) {
        self.invalidate();
        self.expiry = None;
        tracing::info!("⌛ Session expired, signing out");

        if let Err(e) = self.store.sign_out().await {
            tracing::warn!("{}", AuthFailure::SignOut(e.to_string()));
        }
        self.navigator.navigate(Redirect::SignIn);
        self.settle_signed_out();
    }

    async fn sign_out(&mut self) {
        self.invalidate();
        // Local state goes first: a store failure must not keep the user in.
        self.settle_signed_out();

        if let Err(e) = self.store.sign_out().await {
            tracing::warn!("{}", AuthFailure::SignOut(e.to_string()));
        }
        self.navigator.navigate(Redirect::SignIn);
        tracing::info!("👋 Signed out");
    }

    /// Makes every outstanding fetch stale.
    fn invalidate(&mut self) {
        self.generation += 1;
        self.fetches.abort_all();
    }

    fn settle_signed_out(&mut self) {
        self.expiry = None;
        self.publish(AuthState::signed_out());
    }

    fn publish(&self, next: AuthState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            tracing::debug!("Auth phase: {:?} -> {:?}", current.phase(), next.phase());
            *current = next;
            true
        });
    }
}

/// When `session` stops being valid, on the runtime's clock.
fn deadline(session: &Session) -> Instant {
    let remaining = (session.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    Instant::now() + remaining
}

/// Resolves at `deadline`, or never without one.
async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
