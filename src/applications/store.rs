//! Ally application persistence

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{AllyApplication, ApplicationStatus, Review};
use crate::db::{StoreError, StoreResult};

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Fails with `Duplicate` when the user already has a pending application
    async fn insert(&self, application: &AllyApplication) -> StoreResult<AllyApplication>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<AllyApplication>>;

    async fn find_pending_for_user(&self, user_id: &str) -> StoreResult<Option<AllyApplication>>;

    /// Newest first
    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<AllyApplication>>;

    /// Newest first
    async fn list(&self, status: Option<ApplicationStatus>) -> StoreResult<Vec<AllyApplication>>;

    /// Record a review if the application is still pending
    async fn review(&self, id: Uuid, review: &Review) -> StoreResult<Option<AllyApplication>>;
}

/// Application store held in process memory
#[derive(Default)]
pub struct MemoryApplicationStore {
    applications: RwLock<Vec<AllyApplication>>,
}

impl MemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut applications: Vec<AllyApplication>) -> Vec<AllyApplication> {
    applications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    applications
}

#[async_trait]
impl ApplicationStore for MemoryApplicationStore {
    async fn insert(&self, application: &AllyApplication) -> StoreResult<AllyApplication> {
        let mut applications = self.applications.write().await;
        let pending_exists = applications
            .iter()
            .any(|a| a.user_id == application.user_id && a.status == ApplicationStatus::Pending);
        if pending_exists {
            return Err(StoreError::Duplicate(
                "ally_applications_one_pending_per_user".to_string(),
            ));
        }
        applications.push(application.clone());
        Ok(application.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<AllyApplication>> {
        let applications = self.applications.read().await;
        Ok(applications.iter().find(|a| a.id == id).cloned())
    }

    async fn find_pending_for_user(&self, user_id: &str) -> StoreResult<Option<AllyApplication>> {
        let applications = self.applications.read().await;
        Ok(applications
            .iter()
            .find(|a| a.user_id == user_id && a.status == ApplicationStatus::Pending)
            .cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<AllyApplication>> {
        let applications = self.applications.read().await;
        Ok(newest_first(
            applications
                .iter()
                .filter(|a| a.user_id == user_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list(&self, status: Option<ApplicationStatus>) -> StoreResult<Vec<AllyApplication>> {
        let applications = self.applications.read().await;
        Ok(newest_first(
            applications
                .iter()
                .filter(|a| status.map_or(true, |s| a.status == s))
                .cloned()
                .collect(),
        ))
    }

    async fn review(&self, id: Uuid, review: &Review) -> StoreResult<Option<AllyApplication>> {
        let mut applications = self.applications.write().await;
        let Some(application) = applications
            .iter_mut()
            .find(|a| a.id == id && a.status == ApplicationStatus::Pending)
        else {
            return Ok(None);
        };

        application.status = review.status;
        application.reviewed_by = Some(review.reviewed_by.clone());
        application.reviewed_at = Some(review.reviewed_at);
        application.rejection_reason = review.rejection_reason.clone();
        application.updated_at = review.reviewed_at;

        Ok(Some(application.clone()))
    }
}

/// Postgres-backed application store
#[derive(Clone)]
pub struct PgApplicationStore {
    pool: PgPool,
}

impl PgApplicationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApplicationStore for PgApplicationStore {
    async fn insert(&self, application: &AllyApplication) -> StoreResult<AllyApplication> {
        let row = sqlx::query_as::<_, AllyApplication>(
            r#"
            INSERT INTO ally_applications (
                id, user_id, full_name, phone, address, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(application.id)
        .bind(&application.user_id)
        .bind(&application.full_name)
        .bind(&application.phone)
        .bind(&application.address)
        .bind(application.status)
        .bind(application.created_at)
        .bind(application.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<AllyApplication>> {
        let row = sqlx::query_as::<_, AllyApplication>(
            "SELECT * FROM ally_applications WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_pending_for_user(&self, user_id: &str) -> StoreResult<Option<AllyApplication>> {
        let row = sqlx::query_as::<_, AllyApplication>(
            "SELECT * FROM ally_applications WHERE user_id = $1 AND status = 'PENDING'",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<AllyApplication>> {
        let rows = sqlx::query_as::<_, AllyApplication>(
            "SELECT * FROM ally_applications WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list(&self, status: Option<ApplicationStatus>) -> StoreResult<Vec<AllyApplication>> {
        let rows = sqlx::query_as::<_, AllyApplication>(
            r#"
            SELECT * FROM ally_applications
            WHERE ($1::application_status IS NULL OR status = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn review(&self, id: Uuid, review: &Review) -> StoreResult<Option<AllyApplication>> {
        let row = sqlx::query_as::<_, AllyApplication>(
            r#"
            UPDATE ally_applications
            SET status = $2,
                reviewed_by = $3,
                reviewed_at = $4,
                rejection_reason = $5,
                updated_at = $4
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(review.status)
        .bind(&review.reviewed_by)
        .bind(review.reviewed_at)
        .bind(&review.rejection_reason)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
