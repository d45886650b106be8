use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::Role;

/// Stored user profile
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub wallet_address: Option<String>,
    pub phone: Option<String>,
    pub bank_name: Option<String>,
    pub bank_account: Option<String>,
    pub active_role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: None,
            email: None,
            wallet_address: None,
            phone: None,
            bank_name: None,
            bank_account: None,
            active_role: Role::User,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Profile together with every granted role
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub roles: Vec<Role>,
}

/// Partial profile update; absent fields are left alone
#[derive(Debug, Deserialize, Validate, Default, Clone)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: Option<String>,
    #[validate(length(min = 6, max = 32))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 120))]
    pub bank_name: Option<String>,
    #[validate(length(min = 4, max = 64))]
    pub bank_account: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActivateRoleRequest {
    pub role: Role,
}
