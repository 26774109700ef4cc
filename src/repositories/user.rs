use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::Result;

/// What sign-in needs from the `users` table.
#[derive(Clone, Debug)]
pub struct Credentials {
    /// The unique identifier for the user.
    pub user_id: Uuid,
    /// The email the user signs in with.
    pub email: String,
    /// The user's Argon2 password hash.
    pub password_hash: String,
}

impl TryFrom<&Row> for Credentials {
    type Error = tokio_postgres::Error;

    fn try_from(row: &Row) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password")?,
        })
    }
}

/// Finds sign-in credentials by email, case-insensitively.
pub async fn find_credentials_by_email(pool: &Pool, email: &str) -> Result<Option<Credentials>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT id, email, password
            FROM users
            WHERE lower(email) = lower($1)
            "#,
            &[&email],
        )
        .await?;
    Ok(row.as_ref().map(Credentials::try_from).transpose()?)
}
