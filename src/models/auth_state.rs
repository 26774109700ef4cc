use serde::{Serialize, Serializer};

use crate::models::{
    profile::Profile,
    role::{Role, RoleSet},
    session::Session,
};

/// Coarse phase of an [`AuthState`], handy for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Loading,
    Unauthenticated,
    Authenticated,
}

/// Snapshot of who is signed in and what they may do.
///
/// Only the constructors below build one, so `is_admin` and `is_active`
/// always agree with `profile`, and a deactivated profile is never held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    #[serde(serialize_with = "serialize_user")]
    user: Option<Session>,
    profile: Option<Profile>,
    is_loading: bool,
    is_admin: bool,
    is_active: bool,
}

impl AuthState {
    /// The indeterminate shape, before a session or profile lookup resolves.
    pub fn loading(user: Option<Session>) -> Self {
        Self {
            user,
            profile: None,
            is_loading: true,
            is_admin: false,
            is_active: false,
        }
    }

    /// Nobody is signed in.
    pub fn signed_out() -> Self {
        Self {
            user: None,
            profile: None,
            is_loading: false,
            is_admin: false,
            is_active: false,
        }
    }

    /// A session whose profile could not be loaded. It holds no roles.
    pub fn without_profile(user: Session) -> Self {
        Self {
            user: Some(user),
            profile: None,
            is_loading: false,
            is_admin: false,
            is_active: false,
        }
    }

    /// A session with an active profile. Returns `None` for a deactivated one.
    pub fn active(user: Session, profile: Profile) -> Option<Self> {
        if !profile.is_active() {
            return None;
        }
        Some(Self {
            is_admin: profile.role == Role::Admin,
            is_active: true,
            user: Some(user),
            profile: Some(profile),
            is_loading: false,
        })
    }

    pub fn user(&self) -> Option<&Session> {
        self.user.as_ref()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn phase(&self) -> AuthPhase {
        if self.is_loading {
            AuthPhase::Loading
        } else if self.user.is_some() {
            AuthPhase::Authenticated
        } else {
            AuthPhase::Unauthenticated
        }
    }

    /// True iff the account is active and its role is in `required`.
    /// A deactivated account never holds a role, admin included.
    pub fn has_role(&self, required: RoleSet) -> bool {
        match &self.profile {
            Some(profile) if self.is_active => required.contains(profile.role),
            _ => false,
        }
    }
}

fn serialize_user<S: Serializer>(user: &Option<Session>, serializer: S) -> Result<S::Ok, S::Error> {
    user.as_ref().map(Session::view).serialize(serializer)
}

impl Default for AuthState {
    fn default() -> Self {
        Self::loading(None)
    }
}
