use argon2::{
    password_hash::{PasswordHash, PasswordVerifier},
    Argon2,
};
use zeroize::Zeroize;

use crate::error::{AppError, Result};
use crate::models::session::Session;
use crate::repositories::user as user_repo;
use crate::state::AppState;

/// Verifies a password against an Argon2 hash.
///
/// # Arguments
///
/// * `password` - The password to verify.
/// * `hash` - The PHC-formatted hash to verify against.
///
/// # Returns
///
/// A `Result` containing `true` if the password matches, `false` otherwise.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let mut password_bytes = password.as_bytes().to_vec();
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Hash parse error: {}", e)))?;
    let result = Argon2::default()
        .verify_password(&password_bytes, &parsed_hash)
        .is_ok();

    password_bytes.zeroize();
    tracing::debug!("Password verification completed");
    Ok(result)
}

/// Checks credentials and opens a session.
///
/// Profile and activation checks are left to the session's auth machine, so
/// a deactivated account gets a session that is terminated as soon as its
/// profile loads.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `email` - The email to sign in with.
/// * `password` - The user's password.
///
/// # Returns
///
/// A `Result` containing the new `Session`.
pub async fn sign_in(state: &AppState, email: &str, password: &str) -> Result<Session> {
    tracing::debug!("🔐 Sign-in attempt: {}", email);

    let credentials = user_repo::find_credentials_by_email(&state.db, email)
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

    if !verify_password(password, &credentials.password_hash)? {
        return Err(AppError::Authentication(
            "Invalid email or password".to_string(),
        ));
    }

    let session = state
        .sessions
        .create(credentials.user_id, credentials.email)
        .await?;

    tracing::info!("✅ User signed in: {}", session.user_id);
    Ok(session)
}
