/// Principal identity and role
///
/// A principal is a user account owned by the persistence layer. The token
/// core only ever needs its numeric id and its current role.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric account identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(i64);

impl PrincipalId {
    /// Wrap a raw id. Ids are strictly positive.
    pub fn new(id: i64) -> Option<Self> {
        if id > 0 {
            Some(Self(id))
        } else {
            None
        }
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PrincipalId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Reject signs and leading zeros so each id has exactly one encoding
        if s.is_empty() || s.starts_with('0') || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(());
        }
        s.parse::<i64>().ok().and_then(PrincipalId::new).ok_or(())
    }
}

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}
