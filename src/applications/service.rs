//! Ally application review workflow

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::model::{
    AllyApplication, ApplicationStatus, Review, SubmitApplicationRequest,
};
use super::store::ApplicationStore;
use crate::db::StoreError;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::models::Role;
use crate::users::UserService;

pub struct ApplicationService {
    store: Arc<dyn ApplicationStore>,
    users: Arc<UserService>,
}

fn required(value: Option<String>, field: &str) -> ApiResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::MissingField(format!("{} is required", field)))
}

impl ApplicationService {
    pub fn new(store: Arc<dyn ApplicationStore>, users: Arc<UserService>) -> Self {
        Self { store, users }
    }

    pub async fn submit(
        &self,
        caller: &AuthenticatedUser,
        request: SubmitApplicationRequest,
    ) -> ApiResult<AllyApplication> {
        caller.require_role(Role::User)?;

        let full_name = required(request.full_name, "full_name")?;
        let phone = required(request.phone, "phone")?;
        let address = required(request.address, "address")?;

        if self
            .store
            .find_pending_for_user(&caller.user_id)
            .await?
            .is_some()
        {
            return Err(ApiError::InvalidState(
                "You already have a pending application".to_string(),
            ));
        }

        self.users.ensure_user(caller).await?;

        let now = Utc::now();
        let application = AllyApplication {
            id: Uuid::new_v4(),
            user_id: caller.user_id.clone(),
            full_name,
            phone,
            address,
            status: ApplicationStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };

        // A concurrent submit can still trip the one-pending index
        let created = self.store.insert(&application).await.map_err(|e| match e {
            StoreError::Duplicate(_) => {
                ApiError::InvalidState("You already have a pending application".to_string())
            }
            other => other.into(),
        })?;

        tracing::info!(application_id = %created.id, user_id = %created.user_id, "Ally application submitted");
        Ok(created)
    }

    pub async fn my_applications(
        &self,
        caller: &AuthenticatedUser,
    ) -> ApiResult<Vec<AllyApplication>> {
        Ok(self.store.list_for_user(&caller.user_id).await?)
    }

    pub async fn list(
        &self,
        caller: &AuthenticatedUser,
        status: Option<ApplicationStatus>,
    ) -> ApiResult<Vec<AllyApplication>> {
        caller.require_admin()?;
        Ok(self.store.list(status).await?)
    }

    /// Approve a pending application and grant the applicant the ally role.
    ///
    /// The role is granted before the application is marked approved, so an
    /// approval is never recorded without its grant. A lost review race takes
    /// back a grant made here.
    pub async fn approve(&self, caller: &AuthenticatedUser, id: Uuid) -> ApiResult<AllyApplication> {
        caller.require_admin()?;

        let application = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Application {} not found", id)))?;
        if application.status != ApplicationStatus::Pending {
            return Err(ApiError::InvalidState(format!(
                "Application was already {:?}",
                application.status
            )));
        }

        let newly_granted = self.users.grant_role(&application.user_id, Role::Ally).await?;

        let review = Review {
            status: ApplicationStatus::Approved,
            reviewed_by: caller.user_id.clone(),
            reviewed_at: Utc::now(),
            rejection_reason: None,
        };
        let approved = match self.review(id, &review).await {
            Ok(approved) => approved,
            Err(e) => {
                if newly_granted {
                    if let Err(revoke_err) =
                        self.users.revoke_role(&application.user_id, Role::Ally).await
                    {
                        tracing::error!(
                            application_id = %id,
                            error = %revoke_err,
                            "Failed to revoke ally role after lost review"
                        );
                    }
                }
                return Err(e);
            }
        };

        tracing::info!(application_id = %id, admin_id = %caller.user_id, "Ally application approved");
        Ok(approved)
    }

    pub async fn reject(
        &self,
        caller: &AuthenticatedUser,
        id: Uuid,
        reason: Option<String>,
    ) -> ApiResult<AllyApplication> {
        caller.require_admin()?;
        let reason = required(reason, "reason")?;

        let review = Review {
            status: ApplicationStatus::Rejected,
            reviewed_by: caller.user_id.clone(),
            reviewed_at: Utc::now(),
            rejection_reason: Some(reason),
        };
        let rejected = self.review(id, &review).await?;

        tracing::info!(application_id = %id, admin_id = %caller.user_id, "Ally application rejected");
        Ok(rejected)
    }

    async fn review(&self, id: Uuid, review: &Review) -> ApiResult<AllyApplication> {
        if let Some(reviewed) = self.store.review(id, review).await? {
            return Ok(reviewed);
        }

        match self.store.find_by_id(id).await? {
            None => Err(ApiError::NotFound(format!("Application {} not found", id))),
            Some(existing) => Err(ApiError::InvalidState(format!(
                "Application was already {:?}",
                existing.status
            ))),
        }
    }
}
