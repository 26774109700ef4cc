mod common;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use common::{
    Harness, MemorySessionStore, ScriptedProfileBackend, profile, session_expiring_in, session_for,
};
use dealerhub::{
    auth::{
        machine::MachineOptions,
        navigation::Redirect,
        registry::{AuthRegistry, StoreFactory},
    },
    models::{
        auth_state::{AuthPhase, AuthState},
        profile::ProfileStatus,
        role::{Role, RoleSet},
    },
    ports::SessionStore,
};

fn is_loading_for(user_id: Uuid) -> impl FnMut(&AuthState) -> bool {
    move |s| s.is_loading() && s.user().map(|u| u.user_id) == Some(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_existing_admin_session_settles_with_admin_flags() {
        let user_id = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(user_id, Role::Admin, ProfileStatus::Active));
        let harness = Harness::start(MemorySessionStore::new(Some(session_for(user_id))), profiles);

        let state = harness.handle.settled().await;

        assert_eq!(state.phase(), AuthPhase::Authenticated);
        assert!(state.is_admin());
        assert!(state.is_active());
        assert_eq!(state.profile().map(|p| p.role), Some(Role::Admin));
        assert!(harness.handle.has_role(RoleSet::of(&[Role::Admin])));
        assert!(harness.navigator.visits().is_empty());
    }

    #[tokio::test]
    async fn test_no_session_settles_signed_out() {
        let harness = Harness::start(MemorySessionStore::new(None), ScriptedProfileBackend::new());

        let state = harness.handle.settled().await;

        assert_eq!(state, AuthState::signed_out());
        assert_eq!(harness.profiles.fetches(), 0);
        assert!(!harness.handle.has_role(RoleSet::ALL));
    }

    #[tokio::test]
    async fn test_initial_snapshot_is_loading() {
        let user_id = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(user_id, Role::Worker, ProfileStatus::Active));
        profiles.hold(user_id);
        let harness = Harness::start(MemorySessionStore::new(Some(session_for(user_id))), profiles);

        let state = harness.wait_for(is_loading_for(user_id)).await;
        assert!(!state.is_admin());
        assert!(!state.is_active());
        assert!(state.profile().is_none());

        harness.profiles.release(user_id);
        let state = harness.handle.settled().await;
        assert!(state.is_active());
    }

    #[tokio::test]
    async fn test_deactivated_profile_forces_sign_out_with_flag() {
        let user_id = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(user_id, Role::Admin, ProfileStatus::Deactivated));
        let harness = Harness::start(MemorySessionStore::new(Some(session_for(user_id))), profiles);

        let state = harness.handle.settled().await;

        assert_eq!(state, AuthState::signed_out());
        assert!(!state.is_admin());
        assert_eq!(harness.store.sign_outs(), 1);
        assert!(harness.store.current().is_none());
        assert_eq!(harness.navigator.visits(), vec![Redirect::SignInDeactivated]);
    }

    #[tokio::test]
    async fn test_sign_in_event_loads_profile() {
        let user_id = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(user_id, Role::Dealer, ProfileStatus::Active));
        let harness = Harness::start(MemorySessionStore::new(None), profiles);
        harness.handle.settled().await;

        harness.store.sign_in(session_for(user_id));

        let state = harness.wait_for(|s| s.is_active()).await;
        assert_eq!(state.profile().map(|p| p.role), Some(Role::Dealer));
        assert!(!state.is_admin());
    }

    #[tokio::test]
    async fn test_sign_out_during_pending_fetch_wins() {
        let user_id = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(user_id, Role::Admin, ProfileStatus::Active));
        profiles.hold(user_id);
        let harness = Harness::start(MemorySessionStore::new(Some(session_for(user_id))), profiles);
        harness.wait_for(is_loading_for(user_id)).await;

        harness.store.expire();
        harness.wait_for(|s| *s == AuthState::signed_out()).await;

        harness.profiles.release(user_id);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(harness.handle.snapshot(), AuthState::signed_out());
        assert!(!harness.handle.has_role(RoleSet::ALL));
    }

    #[tokio::test]
    async fn test_newer_sign_in_supersedes_pending_fetch() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(first, Role::Admin, ProfileStatus::Active));
        profiles.insert(profile(second, Role::Worker, ProfileStatus::Active));
        profiles.hold(first);
        let harness = Harness::start(MemorySessionStore::new(Some(session_for(first))), profiles);
        harness.wait_for(is_loading_for(first)).await;

        harness.store.sign_in(session_for(second));
        let state = harness.wait_for(|s| s.is_active()).await;
        assert_eq!(state.user().map(|u| u.user_id), Some(second));

        harness.profiles.release(first);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = harness.handle.snapshot();
        assert_eq!(state.user().map(|u| u.user_id), Some(second));
        assert_eq!(state.profile().map(|p| p.role), Some(Role::Worker));
        assert!(!state.is_admin());
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_fetch_timeout_settles_without_roles() {
        let user_id = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(user_id, Role::Admin, ProfileStatus::Active));
        profiles.hang(user_id);
        let options = MachineOptions {
            profile_fetch_timeout: Duration::from_millis(200),
        };
        let harness = Harness::start_with(
            MemorySessionStore::new(Some(session_for(user_id))),
            profiles,
            options,
        );

        let state = harness.handle.settled().await;

        assert_eq!(state.phase(), AuthPhase::Authenticated);
        assert!(state.profile().is_none());
        assert!(!state.is_active());
        assert!(!harness.handle.has_role(RoleSet::ALL));
        assert!(harness.navigator.visits().is_empty());
    }

    #[tokio::test]
    async fn test_profile_fetch_error_settles_without_roles() {
        let user_id = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.fail(user_id);
        let session = session_for(user_id);
        let harness = Harness::start(MemorySessionStore::new(Some(session.clone())), profiles);

        let state = harness.handle.settled().await;

        assert_eq!(state, AuthState::without_profile(session));
        assert_eq!(harness.store.sign_outs(), 0);
    }

    #[tokio::test]
    async fn test_missing_profile_keeps_session_without_roles() {
        let user_id = Uuid::new_v4();
        let session = session_for(user_id);
        let harness = Harness::start(
            MemorySessionStore::new(Some(session.clone())),
            ScriptedProfileBackend::new(),
        );

        let state = harness.handle.settled().await;

        assert_eq!(state, AuthState::without_profile(session));
        assert!(!state.is_admin());
        assert!(harness.navigator.visits().is_empty());
    }

    #[tokio::test]
    async fn test_session_lookup_failure_settles_signed_out() {
        let store = MemorySessionStore::new(Some(session_for(Uuid::new_v4())));
        store.fail_lookup();
        let harness = Harness::start(store, ScriptedProfileBackend::new());

        assert_eq!(harness.handle.settled().await, AuthState::signed_out());
    }

    #[tokio::test]
    async fn test_sign_out_clears_state_and_navigates() {
        let user_id = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(user_id, Role::Salesman, ProfileStatus::Active));
        let harness = Harness::start(MemorySessionStore::new(Some(session_for(user_id))), profiles);
        assert!(harness.handle.settled().await.is_active());

        harness.handle.sign_out().await;

        assert_eq!(harness.handle.snapshot(), AuthState::signed_out());
        assert_eq!(harness.store.sign_outs(), 1);
        assert!(harness.store.current().is_none());
        assert_eq!(harness.navigator.visits(), vec![Redirect::SignIn]);
    }

    #[tokio::test]
    async fn test_sign_out_twice_is_harmless() {
        let user_id = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(user_id, Role::User, ProfileStatus::Active));
        let harness = Harness::start(MemorySessionStore::new(Some(session_for(user_id))), profiles);
        harness.handle.settled().await;

        harness.handle.sign_out().await;
        harness.handle.sign_out().await;

        assert_eq!(harness.handle.snapshot(), AuthState::signed_out());
        assert_eq!(harness.store.sign_outs(), 2);
    }

    #[tokio::test]
    async fn test_sign_out_failure_still_clears_local_state() {
        let user_id = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(user_id, Role::Admin, ProfileStatus::Active));
        let store = MemorySessionStore::new(Some(session_for(user_id)));
        store.fail_sign_out();
        let harness = Harness::start(store, profiles);
        harness.handle.settled().await;

        harness.handle.sign_out().await;

        let state = harness.handle.snapshot();
        assert_eq!(state, AuthState::signed_out());
        assert!(!state.is_admin());
        assert_eq!(harness.navigator.visits(), vec![Redirect::SignIn]);
    }

    #[tokio::test]
    async fn test_sign_out_during_pending_fetch_discards_profile() {
        let user_id = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(user_id, Role::Admin, ProfileStatus::Active));
        profiles.hold(user_id);
        let harness = Harness::start(MemorySessionStore::new(Some(session_for(user_id))), profiles);
        harness.wait_for(is_loading_for(user_id)).await;

        harness.handle.sign_out().await;
        harness.profiles.release(user_id);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(harness.handle.snapshot(), AuthState::signed_out());
    }

    #[tokio::test]
    async fn test_deactivation_reaches_open_session() {
        let user_id = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(user_id, Role::Admin, ProfileStatus::Active));
        let harness = Harness::start(MemorySessionStore::new(Some(session_for(user_id))), profiles);
        assert!(harness.handle.settled().await.is_admin());

        harness.profiles.insert(profile(user_id, Role::Admin, ProfileStatus::Deactivated));
        harness.store.refresh();

        harness.wait_for(|s| *s == AuthState::signed_out()).await;
        assert_eq!(harness.navigator.visits(), vec![Redirect::SignInDeactivated]);
        assert!(!harness.handle.has_role(RoleSet::of(&[Role::Admin])));
    }

    #[tokio::test]
    async fn test_refresh_of_settled_session_skips_loading() {
        let user_id = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(user_id, Role::Dealer, ProfileStatus::Active));
        let harness = Harness::start(MemorySessionStore::new(Some(session_for(user_id))), profiles);
        harness.handle.settled().await;

        let mut rx = harness.handle.subscribe();
        rx.borrow_and_update();
        harness.profiles.insert(profile(user_id, Role::Salesman, ProfileStatus::Active));
        harness.store.refresh();

        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .expect("no update published")
            .expect("auth machine stopped");
        let state = rx.borrow_and_update().clone();
        assert!(!state.is_loading());
        assert_eq!(state.profile().map(|p| p.role), Some(Role::Salesman));
    }

    #[tokio::test]
    async fn test_shutdown_stops_machine() {
        let harness = Harness::start(MemorySessionStore::new(None), ScriptedProfileBackend::new());
        harness.handle.settled().await;

        harness.handle.shutdown();

        tokio::time::timeout(Duration::from_secs(1), async {
            while !harness.handle.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("machine still running");
    }

    #[tokio::test]
    async fn test_session_expiry_signs_out() {
        let user_id = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(user_id, Role::Admin, ProfileStatus::Active));
        let session = session_expiring_in(user_id, Duration::from_millis(200));
        let harness = Harness::start(MemorySessionStore::new(Some(session)), profiles);
        assert!(harness.handle.settled().await.is_admin());

        let state = harness.wait_for(|s| s.user().is_none()).await;

        assert_eq!(state, AuthState::signed_out());
        assert!(!harness.handle.has_role(RoleSet::of(&[Role::Admin])));
        assert_eq!(harness.store.sign_outs(), 1);
        assert!(harness.store.current().is_none());
        assert_eq!(harness.navigator.visits(), vec![Redirect::SignIn]);
    }

    #[tokio::test]
    async fn test_registry_does_not_serve_expired_session() {
        let user_id = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(user_id, Role::Admin, ProfileStatus::Active));
        let session = session_expiring_in(user_id, Duration::from_millis(200));
        let session_id = session.id;
        let store = MemorySessionStore::new(Some(session));
        let stores: StoreFactory = Arc::new(move |_| store.clone() as Arc<dyn SessionStore>);
        let registry = AuthRegistry::new(stores, profiles, MachineOptions::default());

        let first = registry.attach(session_id);
        assert!(first.handle.settled().await.is_admin());

        tokio::time::sleep(Duration::from_millis(400)).await;

        let later = registry.attach(session_id);
        let state = later.handle.settled().await;
        assert!(state.user().is_none());
        assert!(!later.handle.has_role(RoleSet::of(&[Role::Admin])));
        assert_eq!(later.redirects.take(), Some(Redirect::SignIn));
    }

    #[tokio::test]
    async fn test_lagged_events_reread_current_session() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(first, Role::Worker, ProfileStatus::Active));
        profiles.insert(profile(second, Role::Dealer, ProfileStatus::Active));
        let harness = Harness::start(MemorySessionStore::new(Some(session_for(first))), profiles);
        assert!(harness.handle.settled().await.is_active());
        assert_eq!(harness.store.lookups(), 1);

        // More sign-ins than the event buffer holds, with no await in between.
        for _ in 0..20 {
            harness.store.sign_in(session_for(second));
        }
        let latest = harness.store.current().expect("latest session").id;

        let state = harness
            .wait_for(|s| s.is_active() && s.user().map(|u| u.id) == Some(latest))
            .await;

        assert_eq!(state.profile().map(|p| p.role), Some(Role::Dealer));
        assert_eq!(harness.store.lookups(), 2);
    }

    #[tokio::test]
    async fn test_panicking_fetch_settles_without_roles() {
        let user_id = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(user_id, Role::Admin, ProfileStatus::Active));
        profiles.panic_on(user_id);
        let session = session_for(user_id);
        let harness = Harness::start(MemorySessionStore::new(Some(session.clone())), profiles);

        let state = harness.handle.settled().await;

        assert_eq!(state, AuthState::without_profile(session));
        assert!(!harness.handle.has_role(RoleSet::ALL));
    }

    #[tokio::test]
    async fn test_registry_reuses_and_sweeps_machines() {
        let active_user = Uuid::new_v4();
        let profiles = ScriptedProfileBackend::new();
        profiles.insert(profile(active_user, Role::Worker, ProfileStatus::Active));

        let active_session = session_for(active_user);
        let signed_in = MemorySessionStore::new(Some(active_session.clone()));
        let active_id = active_session.id;
        let stores: StoreFactory = Arc::new(move |session_id| {
            if session_id == active_id {
                signed_in.clone() as Arc<dyn SessionStore>
            } else {
                MemorySessionStore::new(None) as Arc<dyn SessionStore>
            }
        });
        let registry = AuthRegistry::new(stores, profiles, MachineOptions::default());

        let first = registry.attach(active_id);
        let again = registry.attach(active_id);
        assert_eq!(registry.len(), 1);
        assert!(first.handle.settled().await.is_active());
        assert!(again.handle.snapshot().is_active());

        let stale = registry.attach(Uuid::new_v4());
        assert_eq!(stale.handle.settled().await, AuthState::signed_out());
        assert_eq!(registry.len(), 2);

        let removed = registry.sweep(Duration::from_secs(3600));
        assert_eq!(removed, 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&active_id).is_some());

        assert!(registry.detach(&active_id).is_some());
        assert!(registry.is_empty());
    }
}
