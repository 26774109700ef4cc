use std::fmt;
use std::str::FromStr;

use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};

/// A permission level in the panel.
///
/// Stored as the Postgres enum `app_role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "lowercase")]
#[postgres(name = "app_role")]
pub enum Role {
    #[postgres(name = "user")]
    User,
    #[postgres(name = "admin")]
    Admin,
    #[postgres(name = "worker")]
    Worker,
    #[postgres(name = "dealer")]
    Dealer,
    #[postgres(name = "salesman")]
    Salesman,
}

impl Role {
    /// Every role, in declaration order.
    pub const ALL: [Role; 5] = [
        Role::User,
        Role::Admin,
        Role::Worker,
        Role::Dealer,
        Role::Salesman,
    ];

    /// Returns the wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Worker => "worker",
            Role::Dealer => "dealer",
            Role::Salesman => "salesman",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Role::User => 1 << 0,
            Role::Admin => 1 << 1,
            Role::Worker => 1 << 2,
            Role::Dealer => 1 << 3,
            Role::Salesman => 1 << 4,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name one of the known roles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "worker" => Ok(Role::Worker),
            "dealer" => Ok(Role::Dealer),
            "salesman" => Ok(Role::Salesman),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// A set of roles, used to declare who may see a page.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RoleSet(u8);

impl RoleSet {
    /// The empty set. Nobody passes a gate configured with it.
    pub const EMPTY: RoleSet = RoleSet(0);

    /// `{user, admin, salesman, worker, dealer}`.
    pub const ALL: RoleSet = RoleSet(0b1_1111);

    /// Builds a set from a list of roles.
    pub fn of(roles: &[Role]) -> Self {
        roles.iter().copied().collect()
    }

    pub const fn contains(self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    pub const fn with(self, role: Role) -> Self {
        RoleSet(self.0 | role.bit())
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates the roles in the set, in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Role> {
        Role::ALL.into_iter().filter(move |r| self.contains(*r))
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        iter.into_iter().fold(RoleSet::EMPTY, RoleSet::with)
    }
}

impl fmt::Debug for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for RoleSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}
