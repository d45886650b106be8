//! User persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

use super::model::{UpdateProfileRequest, User};
use crate::db::{StoreError, StoreResult};
use crate::models::Role;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find(&self, id: &str) -> StoreResult<Option<User>>;

    /// Insert `user` unless a record with that id exists; returns the stored row
    async fn get_or_create(&self, user: &User) -> StoreResult<User>;

    async fn update_profile(
        &self,
        id: &str,
        patch: &UpdateProfileRequest,
        now: DateTime<Utc>,
    ) -> StoreResult<User>;

    async fn roles(&self, id: &str) -> StoreResult<Vec<Role>>;

    /// Idempotent
    async fn grant_role(&self, id: &str, role: Role) -> StoreResult<()>;

    /// Idempotent; a missing grant is not an error
    async fn revoke_role(&self, id: &str, role: Role) -> StoreResult<()>;

    async fn set_active_role(&self, id: &str, role: Role, now: DateTime<Utc>)
        -> StoreResult<User>;
}

#[derive(Default)]
struct MemoryUsers {
    users: HashMap<String, User>,
    roles: HashMap<String, BTreeSet<Role>>,
}

/// User store held in process memory
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<MemoryUsers>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(id: &str) -> StoreError {
    StoreError::NotFound(format!("User {}", id))
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.inner.read().await.users.get(id).cloned())
    }

    async fn get_or_create(&self, user: &User) -> StoreResult<User> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .users
            .entry(user.id.clone())
            .or_insert_with(|| user.clone())
            .clone();
        inner
            .roles
            .entry(user.id.clone())
            .or_default()
            .insert(Role::User);
        Ok(stored)
    }

    async fn update_profile(
        &self,
        id: &str,
        patch: &UpdateProfileRequest,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        let mut inner = self.inner.write().await;
        let user = inner.users.get_mut(id).ok_or_else(|| not_found(id))?;

        macro_rules! merge {
            ($($field:ident),*) => {
                $(if let Some(value) = &patch.$field {
                    user.$field = Some(value.clone());
                })*
            };
        }
        merge!(name, email, wallet_address, phone, bank_name, bank_account);
        user.updated_at = now;

        Ok(user.clone())
    }

    async fn roles(&self, id: &str) -> StoreResult<Vec<Role>> {
        let inner = self.inner.read().await;
        Ok(inner
            .roles
            .get(id)
            .map(|roles| roles.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn grant_role(&self, id: &str, role: Role) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(id) {
            return Err(not_found(id));
        }
        inner.roles.entry(id.to_string()).or_default().insert(role);
        Ok(())
    }

    async fn revoke_role(&self, id: &str, role: Role) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(roles) = inner.roles.get_mut(id) {
            roles.remove(&role);
        }
        Ok(())
    }

    async fn set_active_role(
        &self,
        id: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        let mut inner = self.inner.write().await;
        let user = inner.users.get_mut(id).ok_or_else(|| not_found(id))?;
        user.active_role = role;
        user.updated_at = now;
        Ok(user.clone())
    }
}

/// Postgres-backed user store
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find(&self, id: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_or_create(&self, user: &User) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, active_role, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&user.id)
        .bind(user.active_role)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO user_roles (user_id, role) VALUES ($1, 'user') ON CONFLICT DO NOTHING",
        )
        .bind(&user.id)
        .execute(&mut *tx)
        .await?;

        let stored = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(&user.id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn update_profile(
        &self,
        id: &str,
        patch: &UpdateProfileRequest,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                wallet_address = COALESCE($4, wallet_address),
                phone = COALESCE($5, phone),
                bank_name = COALESCE($6, bank_name),
                bank_account = COALESCE($7, bank_account),
                updated_at = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.email)
        .bind(&patch.wallet_address)
        .bind(&patch.phone)
        .bind(&patch.bank_name)
        .bind(&patch.bank_account)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found(id))?;

        Ok(user)
    }

    async fn roles(&self, id: &str) -> StoreResult<Vec<Role>> {
        let roles: Vec<(Role,)> =
            sqlx::query_as("SELECT role FROM user_roles WHERE user_id = $1 ORDER BY role")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
        Ok(roles.into_iter().map(|(role,)| role).collect())
    }

    async fn grant_role(&self, id: &str, role: Role) -> StoreResult<()> {
        sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(id)
            .bind(role)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn revoke_role(&self, id: &str, role: Role) -> StoreResult<()> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role = $2")
            .bind(id)
            .bind(role)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_active_role(
        &self,
        id: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET active_role = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(role)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found(id))?;

        Ok(user)
    }
}
