use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role_id: Option<i16>,
    pub iat: Option<u64>,
}

/// Staff roles as numbered in the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Reception,
    Doctor,
    Nurse,
    Lab,
    Pharmacist,
    Cashier,
}

impl Role {
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Reception),
            3 => Some(Role::Doctor),
            4 => Some(Role::Nurse),
            5 => Some(Role::Lab),
            6 => Some(Role::Pharmacist),
            7 => Some(Role::Cashier),
            _ => None,
        }
    }

    pub fn id(&self) -> i16 {
        match self {
            Role::Admin => 1,
            Role::Reception => 2,
            Role::Doctor => 3,
            Role::Nurse => 4,
            Role::Lab => 5,
            Role::Pharmacist => 6,
            Role::Cashier => 7,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Reception => write!(f, "reception"),
            Role::Doctor => write!(f, "doctor"),
            Role::Nurse => write!(f, "nurse"),
            Role::Lab => write!(f, "lab"),
            Role::Pharmacist => write!(f, "pharmacist"),
            Role::Cashier => write!(f, "cashier"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn has_any_role(&self, allowed: &[Role]) -> bool {
        self.role.map(|role| allowed.contains(&role)).unwrap_or(false)
    }

    /// The subject as a UUID, when the identity provider issues UUID subjects.
    pub fn uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.id).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ids_round_trip() {
        for id in 1..=7 {
            let role = Role::from_id(id).unwrap();
            assert_eq!(role.id(), id);
        }
        assert_eq!(Role::from_id(0), None);
        assert_eq!(Role::from_id(8), None);
    }

    #[test]
    fn user_without_role_has_no_access() {
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: None,
            role: None,
            created_at: None,
        };
        assert!(!user.has_any_role(&[Role::Admin, Role::Reception]));
    }
}
