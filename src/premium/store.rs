use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Row, postgres::PgRow};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tracing::Instrument;

use super::{Account, Plan};

const FIND_BY_EMAIL: &str = r"
    SELECT
        id::bigint AS id,
        email,
        plan,
        expiry_date::timestamptz AS expiry_date,
        trial_started_at::timestamptz AS trial_started_at,
        trial_ended_at::timestamptz AS trial_ended_at
    FROM users
    WHERE email = $1
    LIMIT 1
";

const FIND_BY_ID: &str = r"
    SELECT
        id::bigint AS id,
        email,
        plan,
        expiry_date::timestamptz AS expiry_date,
        trial_started_at::timestamptz AS trial_started_at,
        trial_ended_at::timestamptz AS trial_ended_at
    FROM users
    WHERE id = $1
    LIMIT 1
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account lookup failed: {0}")]
    Query(#[from] sqlx::Error),
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// # Errors
    /// Returns an error if the backing store cannot be queried.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// # Errors
    /// Returns an error if the backing store cannot be queried.
    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, StoreError>;
}

impl<'r> FromRow<'r, PgRow> for Account {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let plan: Option<String> = row.try_get("plan")?;
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            plan: plan.as_deref().map_or(Plan::Free, Plan::from_db),
            expiry_date: row.try_get("expiry_date")?,
            trial_started_at: row.try_get("trial_started_at")?,
            trial_ended_at: row.try_get("trial_ended_at")?,
        })
    }
}

/// Reads accounts from the `users` table.
#[derive(Debug, Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn select_span() -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.sql.table = "users"
    )
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as::<_, Account>(FIND_BY_EMAIL)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(select_span())
            .await?;
        Ok(account)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as::<_, Account>(FIND_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(select_span())
            .await?;
        Ok(account)
    }
}

/// In-process account table for tests and local runs without a database.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<i64, Account>>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: Account) {
        self.accounts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(account.id, account);
    }

    pub fn remove(&self, id: i64) -> Option<Account> {
        self.accounts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        Ok(accounts.values().find(|account| account.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        Ok(accounts.get(&id).cloned())
    }
}
