//! Property directory and profile types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::{PropertyId, UserId};

/// Property record, as far as the invite engine needs to know it.
#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    pub id: PropertyId,
    pub owner_id: UserId,
    pub name: String,
    pub address: String,
    pub owner_display_name: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters for registering a property
#[derive(Clone, Debug)]
pub struct CreatePropertyParams {
    pub owner_id: UserId,
    pub name: String,
    pub address: String,
    pub owner_display_name: String,
}

/// Role/affiliation of a user in the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileRole {
    Tenant,
    Landlord,
}

impl ProfileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileRole::Tenant => "tenant",
            ProfileRole::Landlord => "landlord",
        }
    }
}

impl fmt::Display for ProfileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tenant" => Ok(ProfileRole::Tenant),
            "landlord" => Ok(ProfileRole::Landlord),
            other => Err(format!("unknown profile role: {}", other)),
        }
    }
}

/// User profile record
#[derive(Clone, Debug, PartialEq)]
pub struct Profile {
    pub user_id: UserId,
    pub role: Option<ProfileRole>,
    pub updated_at: DateTime<Utc>,
}
