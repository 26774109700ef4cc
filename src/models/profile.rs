use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::models::role::Role;

/// Whether a profile may use the panel.
///
/// Stored as the Postgres enum `profile_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "lowercase")]
#[postgres(name = "profile_status")]
pub enum ProfileStatus {
    #[postgres(name = "active")]
    Active,
    #[postgres(name = "deactivated")]
    Deactivated,
}

/// The business record describing a user's role and activation status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// The ID of the user this profile belongs to.
    pub user_id: Uuid,
    /// The user's permission level.
    pub role: Role,
    /// Whether the account is active.
    pub status: ProfileStatus,
    /// The name shown in the panel.
    pub display_name: String,
    /// The timestamp when the profile was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the profile was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_active(&self) -> bool {
        self.status == ProfileStatus::Active
    }
}

impl TryFrom<&Row> for Profile {
    type Error = tokio_postgres::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            role: row.try_get("role")?,
            status: row.try_get("status")?,
            display_name: row.try_get("display_name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Fields a profile edit may change. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub status: Option<ProfileStatus>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.role.is_none() && self.status.is_none()
    }

    /// Whether the edit touches anything besides the display name.
    pub fn changes_access(&self) -> bool {
        self.role.is_some() || self.status.is_some()
    }
}
