use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::users::repo_types::{UniqueField, User, UserRow, UserStatus};

/// Persistence operations the user service relies on.
///
/// Errors are infrastructure failures, except [`UniqueViolation`] on writes. A
/// missing row is `Ok(None)` and a write that touched nothing is `Ok(0)`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_id(&self, id: i64) -> anyhow::Result<Option<User>>;

    async fn get_by_unique_field(
        &self,
        field: UniqueField,
        value: &str,
        status: Option<UserStatus>,
    ) -> anyhow::Result<Option<User>>;

    /// Ordered by id.
    async fn find_by_status(&self, status: &str) -> anyhow::Result<Vec<User>>;

    /// Returns the id assigned by the store. `user.id` is ignored. Fails with
    /// [`UniqueViolation`] when another active user already holds the email.
    async fn insert(&self, user: &User) -> anyhow::Result<i64>;

    /// Writes every mutable column of `user`. `date_created` is left untouched.
    async fn update_fields(&self, user: &User) -> anyhow::Result<u64>;

    async fn delete_by_id(&self, id: i64) -> anyhow::Result<u64>;
}

/// A write would give one active email to two users.
#[derive(Debug, Error)]
#[error("unique constraint violated: {0}")]
pub struct UniqueViolation(pub String);

fn write_err(e: sqlx::Error, what: &'static str) -> anyhow::Error {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            UniqueViolation(db.message().to_string()).into()
        }
        _ => anyhow::Error::new(e).context(what),
    }
}

const COLUMNS: &str = "id, first_name, last_name, email, date_created, status, password_hash";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get user by id")?;
        row.map(User::try_from).transpose()
    }

    async fn get_by_unique_field(
        &self,
        field: UniqueField,
        value: &str,
        status: Option<UserStatus>,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS}
              FROM users
             WHERE {} = $1
               AND ($2::text IS NULL OR status = $2)
             ORDER BY id
             LIMIT 1
            "#,
            field.column()
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .bind(status.map(UserStatus::as_str))
            .fetch_optional(&self.db)
            .await
            .with_context(|| format!("get user by {}", field.column()))?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_status(&self, status: &str) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {COLUMNS} FROM users WHERE status = $1 ORDER BY id"
        ))
        .bind(status)
        .fetch_all(&self.db)
        .await
        .context("find users by status")?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn insert(&self, user: &User) -> anyhow::Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (first_name, last_name, email, date_created, status, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.date_created)
        .bind(user.status.as_str())
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| write_err(e, "insert user"))?;
        Ok(id)
    }

    async fn update_fields(&self, user: &User) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET first_name = $1, last_name = $2, email = $3, status = $4, password_hash = $5
             WHERE id = $6
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(user.status.as_str())
        .bind(&user.password_hash)
        .bind(user.id)
        .execute(&self.db)
        .await
        .map_err(|e| write_err(e, "update user"))?;
        Ok(res.rows_affected())
    }

    async fn delete_by_id(&self, id: i64) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete user")?;
        Ok(res.rows_affected())
    }
}
