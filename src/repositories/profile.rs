use async_trait::async_trait;
use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::profile::{Profile, ProfileUpdate},
    ports::ProfileBackend,
};

/// Finds the profile belonging to `user_id`.
pub async fn find_by_user_id(pool: &Pool, user_id: &Uuid) -> Result<Option<Profile>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT user_id, role, status, display_name, created_at, updated_at
            FROM profiles
            WHERE user_id = $1
            "#,
            &[user_id],
        )
        .await?;
    Ok(row.as_ref().map(Profile::try_from).transpose()?)
}

/// Applies `fields` to the profile of `user_id`, leaving `None` fields as
/// they are. Returns `None` when the user has no profile.
pub async fn update_profile(
    pool: &Pool,
    user_id: &Uuid,
    fields: &ProfileUpdate,
) -> Result<Option<Profile>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            UPDATE profiles
            SET
                display_name = COALESCE($2, display_name),
                role = COALESCE($3, role),
                status = COALESCE($4, status),
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING user_id, role, status, display_name, created_at, updated_at
            "#,
            &[user_id, &fields.display_name, &fields.role, &fields.status],
        )
        .await?;
    Ok(row.as_ref().map(Profile::try_from).transpose()?)
}

/// [`ProfileBackend`] over the `profiles` table.
#[derive(Clone)]
pub struct PgProfileBackend {
    pool: Pool,
}

impl PgProfileBackend {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileBackend for PgProfileBackend {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        find_by_user_id(&self.pool, &user_id).await
    }

    async fn update_profile(&self, user_id: Uuid, fields: ProfileUpdate) -> Result<Profile> {
        let profile = update_profile(&self.pool, &user_id, &fields)
            .await?
            .ok_or(AppError::NotFound)?;
        tracing::info!("✅ Profile updated for user: {}", user_id);
        Ok(profile)
    }
}
