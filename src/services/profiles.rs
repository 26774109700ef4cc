use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::{
        auth_state::AuthState,
        profile::{Profile, ProfileUpdate},
    },
    state::AppState,
};

/// Decides whether `actor` may apply `fields` to the profile of `user_id`.
///
/// Admins may edit any profile. Other active users may only change their own
/// display name.
pub fn authorize_update(actor: &AuthState, user_id: Uuid, fields: &ProfileUpdate) -> Result<()> {
    if fields.is_empty() {
        return Err(AppError::Validation("Nothing to update".to_string()));
    }

    let own = match actor.profile() {
        Some(profile) if actor.is_active() => profile,
        _ if actor.user().is_none() => return Err(AppError::Unauthorized),
        _ => return Err(AppError::Forbidden),
    };

    if actor.is_admin() {
        return Ok(());
    }

    if own.user_id != user_id || fields.changes_access() {
        return Err(AppError::Forbidden);
    }

    Ok(())
}

/// Updates a profile and pushes the change to the user's open sessions.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `actor` - Who is making the change.
/// * `user_id` - Whose profile changes.
/// * `fields` - The fields to change.
///
/// # Returns
///
/// A `Result` containing the updated `Profile`.
pub async fn update_profile(
    state: &AppState,
    actor: &AuthState,
    user_id: Uuid,
    fields: ProfileUpdate,
) -> Result<Profile> {
    authorize_update(actor, user_id, &fields)?;

    let profile = state.profiles.update_profile(user_id, fields).await?;

    // The write already happened; a failed refresh only delays propagation
    // until the session's next sign-in.
    match state.sessions.refresh_user(&user_id).await {
        Ok(count) => tracing::info!("🔄 Profile change pushed to {} session(s)", count),
        Err(e) => tracing::warn!("Failed to refresh sessions for {}: {}", user_id, e),
    }

    Ok(profile)
}
