use parking_lot::Mutex;

/// Where the presentation layer should send the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    /// Sign-in page, flagged so it can explain the account was deactivated.
    SignInDeactivated,
    SignIn,
    DefaultLanding,
}

/// Resolves [`Redirect`] targets to URL paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectPaths {
    pub sign_in: String,
    pub landing: String,
}

impl Default for RedirectPaths {
    fn default() -> Self {
        Self {
            sign_in: "/sign-in".to_string(),
            landing: "/".to_string(),
        }
    }
}

impl Redirect {
    pub fn path(&self, paths: &RedirectPaths) -> String {
        match self {
            Redirect::SignInDeactivated => format!("{}?deactivated=true", paths.sign_in),
            Redirect::SignIn => paths.sign_in.clone(),
            Redirect::DefaultLanding => paths.landing.clone(),
        }
    }
}

/// Receives navigation side effects from the auth machine.
pub trait Navigator: Send + Sync {
    fn navigate(&self, to: Redirect);
}

/// Keeps the latest redirect until someone takes it.
///
/// The HTTP layer has no long-lived view to navigate, so the redirect is
/// parked here and applied to the session's next request.
#[derive(Debug, Default)]
pub struct RedirectSlot {
    pending: Mutex<Option<Redirect>>,
}

impl RedirectSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Option<Redirect> {
        self.pending.lock().take()
    }

    pub fn peek(&self) -> Option<Redirect> {
        *self.pending.lock()
    }
}

impl Navigator for RedirectSlot {
    fn navigate(&self, to: Redirect) {
        tracing::debug!("↪️ Redirect queued: {:?}", to);
        *self.pending.lock() = Some(to);
    }
}
