use futures::stream::{self, Stream};
use tokio::sync::watch;

use crate::{
    auth::navigation::Redirect,
    models::{auth_state::AuthState, role::RoleSet},
};

/// What a guarded page should do with the current [`AuthState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Still resolving; show a loading placeholder and do not redirect.
    Pending,
    Redirect(Redirect),
    Render,
}

/// Guards content behind a set of roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleGate {
    required: RoleSet,
}

impl Default for RoleGate {
    fn default() -> Self {
        Self::new(RoleSet::ALL)
    }
}

impl RoleGate {
    pub const fn new(required: RoleSet) -> Self {
        Self { required }
    }

    pub fn required(&self) -> RoleSet {
        self.required
    }

    pub fn evaluate(&self, state: &AuthState) -> GateDecision {
        if state.is_loading() {
            return GateDecision::Pending;
        }
        if state.user().is_none() {
            return GateDecision::Redirect(Redirect::SignIn);
        }
        if !state.has_role(self.required) {
            return GateDecision::Redirect(Redirect::DefaultLanding);
        }
        GateDecision::Render
    }

    /// Re-evaluates the gate on every snapshot.
    ///
    /// Yields the decision for the current snapshot immediately, then one item
    /// each time the decision changes. Ends when the machine stops.
    pub fn decisions(
        self,
        state: watch::Receiver<AuthState>,
    ) -> impl Stream<Item = GateDecision> + Send + 'static {
        stream::unfold((state, None), move |(mut rx, last)| async move {
            let mut first = last.is_none();
            loop {
                if !first && rx.changed().await.is_err() {
                    return None;
                }
                first = false;

                let decision = self.evaluate(&rx.borrow_and_update());
                if Some(decision) != last {
                    return Some((decision, (rx, Some(decision))));
                }
            }
        })
    }
}
