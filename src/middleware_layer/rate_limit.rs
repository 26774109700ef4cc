use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sonic_rs::JsonValueTrait;

use crate::{error::AppError, state::AppState, validation::auth::normalize_email};

/// Failed attempts allowed before sign-in is locked for an email.
const MAX_FAILED_SIGN_INS: i32 = 5;
/// How long the failure counter lives, in seconds.
const LOCKOUT_SECS: i64 = 43200;
/// Largest sign-in body accepted.
const MAX_BODY_BYTES: usize = 16 * 1024;

/// The throttle key for a sign-in body, or `None` when it names no email.
pub fn sign_in_throttle_key(body_bytes: &[u8]) -> Option<String> {
    let json = sonic_rs::from_slice::<sonic_rs::Value>(body_bytes).ok()?;
    let email = normalize_email(json.get("email")?.as_str()?);
    if email.is_empty() {
        return None;
    }
    Some(format!("rate_limit:sign_in:{}", email))
}

/// A middleware that throttles failed sign-in attempts per email.
///
/// Client errors from the handler count as failures; a successful sign-in
/// resets the counter. Bodies without an email are passed through
/// unthrottled, since validation rejects them anyway.
pub async fn rate_limit_sign_in(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();
    let body_bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return AppError::Validation("Request body too large".to_string()).into_response();
        }
    };

    let request = Request::from_parts(parts, Body::from(body_bytes.clone()));
    let Some(key) = sign_in_throttle_key(&body_bytes) else {
        return next.run(request).await;
    };
    let mut redis = state.redis.clone();

    let count: Option<i32> = redis::cmd("GET")
        .arg(&key)
        .query_async(&mut redis)
        .await
        .unwrap_or(None);

    if let Some(attempts) = count {
        if attempts >= MAX_FAILED_SIGN_INS {
            let ttl: Option<i64> = redis::cmd("TTL")
                .arg(&key)
                .query_async(&mut redis)
                .await
                .unwrap_or(None);

            return AppError::RateLimitExceeded(format!(
                "Too many failed sign-in attempts. Try again in {} minutes",
                ttl.unwrap_or(0) / 60
            ))
            .into_response();
        }
    }

    let response = next.run(request).await;

    if response.status().is_client_error() {
        let _: () = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut redis)
            .await
            .unwrap_or(());

        let _: () = redis::cmd("EXPIRE")
            .arg(&key)
            .arg(LOCKOUT_SECS)
            .query_async(&mut redis)
            .await
            .unwrap_or(());
    } else if response.status().is_success() {
        let _: () = redis::cmd("DEL")
            .arg(&key)
            .query_async(&mut redis)
            .await
            .unwrap_or(());
    }

    response
}
