use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

use super::model::{UpdateProfileRequest, User, UserProfile};
use super::store::UserStore;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::models::Role;

/// User service for profile and role management
pub struct UserService {
    store: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Fetch the caller's record, creating it with the `user` role on first sight
    pub async fn ensure_user(&self, caller: &AuthenticatedUser) -> ApiResult<UserProfile> {
        let user = match self.store.find(&caller.user_id).await? {
            Some(user) => user,
            None => {
                let user = self
                    .store
                    .get_or_create(&User::new(caller.user_id.clone(), Utc::now()))
                    .await?;
                tracing::info!(user_id = %user.id, "User registered");
                user
            }
        };

        self.profile(user).await
    }

    pub async fn update_profile(
        &self,
        caller: &AuthenticatedUser,
        patch: UpdateProfileRequest,
    ) -> ApiResult<UserProfile> {
        patch.validate()?;
        self.ensure_user(caller).await?;

        let user = self
            .store
            .update_profile(&caller.user_id, &patch, Utc::now())
            .await?;

        tracing::debug!(user_id = %user.id, "Profile updated");
        self.profile(user).await
    }

    /// Switch the caller's active role to one already granted
    pub async fn activate_role(
        &self,
        caller: &AuthenticatedUser,
        role: Role,
    ) -> ApiResult<UserProfile> {
        let profile = self.ensure_user(caller).await?;
        if !profile.roles.contains(&role) {
            return Err(ApiError::AccessDenied(format!(
                "Role {} has not been granted",
                role
            )));
        }

        let user = self
            .store
            .set_active_role(&caller.user_id, role, Utc::now())
            .await?;

        tracing::info!(user_id = %user.id, role = %role, "Active role changed");
        self.profile(user).await
    }

    /// Grant `role` to `user_id`, registering the user if needed.
    /// Returns false when the user already held it.
    pub async fn grant_role(&self, user_id: &str, role: Role) -> ApiResult<bool> {
        self.store
            .get_or_create(&User::new(user_id, Utc::now()))
            .await?;
        if self.store.roles(user_id).await?.contains(&role) {
            return Ok(false);
        }
        self.store.grant_role(user_id, role).await?;

        tracing::info!(user_id = %user_id, role = %role, "Role granted");
        Ok(true)
    }

    pub async fn revoke_role(&self, user_id: &str, role: Role) -> ApiResult<()> {
        self.store.revoke_role(user_id, role).await?;
        tracing::info!(user_id = %user_id, role = %role, "Role revoked");
        Ok(())
    }

    async fn profile(&self, user: User) -> ApiResult<UserProfile> {
        let roles = self.store.roles(&user.id).await?;
        Ok(UserProfile { user, roles })
    }
}
