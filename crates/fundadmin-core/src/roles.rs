use crate::error::FundError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordered role model. Lower rank means more privilege; rank 0 is root.
///
/// Staff and Support alias to the same rank and are interchangeable in every
/// comparison.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Root,
    Admin,
    Staff,
    Support,
    Investor,
    Guest,
}

/// Process-wide immutable role table, loaded once at startup and shared by
/// every component that needs to enumerate the model.
pub const ROLES: &[Role] = &[
    Role::Root,
    Role::Admin,
    Role::Staff,
    Role::Support,
    Role::Investor,
    Role::Guest,
];

impl Role {
    pub fn rank(self) -> u8 {
        match self {
            Self::Root => 0,
            Self::Admin => 1,
            Self::Staff | Self::Support => 2,
            Self::Investor => 3,
            Self::Guest => 4,
        }
    }

    /// True iff `self` is equal-or-more-privileged than `minimum`.
    pub fn is_at_least(self, minimum: Role) -> bool {
        self.rank() <= minimum.rank()
    }

    pub fn is_root(self) -> bool {
        matches!(self, Self::Root)
    }

    /// Equivalence class of the role: Staff and Support share one class,
    /// every other role is alone in its own.
    pub fn alias_group(self) -> &'static [Role] {
        match self {
            Self::Root => &[Self::Root],
            Self::Admin => &[Self::Admin],
            Self::Staff | Self::Support => &[Self::Staff, Self::Support],
            Self::Investor => &[Self::Investor],
            Self::Guest => &[Self::Guest],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Admin => "admin",
            Self::Staff => "staff",
            Self::Support => "support",
            Self::Investor => "investor",
            Self::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = FundError;

    /// Boundary conversion from raw input. The rest of the crate only ever
    /// sees validated `Role` values.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "root" => Ok(Self::Root),
            "admin" => Ok(Self::Admin),
            "staff" => Ok(Self::Staff),
            "support" => Ok(Self::Support),
            "investor" => Ok(Self::Investor),
            "guest" => Ok(Self::Guest),
            other => Err(FundError::Validation(format!("invalid role '{other}'"))),
        }
    }
}
