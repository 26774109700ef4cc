use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::Result,
    middleware_layer::auth::CurrentAuth,
    models::{
        profile::{Profile, ProfileStatus, ProfileUpdate},
        role::Role,
    },
    services::profiles as profile_service,
    state::AppState,
    validation::auth::validate,
};

/// The request payload for editing a profile.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[garde(length(min = 1, max = 120))]
    pub display_name: Option<String>,
    #[garde(skip)]
    pub role: Option<Role>,
    #[garde(skip)]
    pub status: Option<ProfileStatus>,
}

impl From<UpdateProfileRequest> for ProfileUpdate {
    fn from(req: UpdateProfileRequest) -> Self {
        ProfileUpdate {
            display_name: req
                .display_name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
            role: req.role,
            status: req.status,
        }
    }
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub profile: Profile,
}

/// Returns the caller's own profile.
#[axum::debug_handler]
pub async fn get_own_profile(Extension(current): Extension<CurrentAuth>) -> Result<Response> {
    let profile = current.require_active()?.clone();
    Ok((
        StatusCode::OK,
        Json(ProfileResponse {
            success: true,
            profile,
        }),
    )
        .into_response())
}

/// Edits a profile.
///
/// Role and status changes are admin-only and reach the affected user's open
/// sessions without a reload.
#[axum::debug_handler]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAuth>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Response> {
    validate(&payload)?;
    let fields = ProfileUpdate::from(payload);

    tracing::info!(
        "✏️ Profile update for {} (access change: {})",
        user_id,
        fields.changes_access()
    );

    let profile = profile_service::update_profile(&state, &current.state, user_id, fields).await?;

    Ok((
        StatusCode::OK,
        Json(ProfileResponse {
            success: true,
            profile,
        }),
    )
        .into_response())
}
