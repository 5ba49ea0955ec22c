use std::sync::Mutex;

use async_trait::async_trait;

use crate::users::{
    repo::{UniqueViolation, UserStore},
    repo_types::{UniqueField, User, UserStatus},
};

/// `UserStore` kept in process memory. Assigns ids like a sequence.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: Vec<User>,
}

impl Inner {
    /// Mirrors the partial unique index on active emails.
    fn check_email(&self, user: &User) -> anyhow::Result<()> {
        let clash = user.status == UserStatus::Active
            && self.rows.iter().any(|u| {
                u.id != user.id && u.status == UserStatus::Active && u.email == user.email
            });
        if clash {
            return Err(UniqueViolation(format!("email {} taken", user.email)).into());
        }
        Ok(())
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a row behind the service's back.
    pub fn forget(&self, id: i64) {
        self.lock().rows.retain(|u| u.id != id);
    }

    pub fn snapshot(&self, id: i64) -> Option<User> {
        self.lock().rows.iter().find(|u| u.id == id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        Ok(self.snapshot(id))
    }

    async fn get_by_unique_field(
        &self,
        field: UniqueField,
        value: &str,
        status: Option<UserStatus>,
    ) -> anyhow::Result<Option<User>> {
        let inner = self.lock();
        Ok(inner
            .rows
            .iter()
            .find(|u| {
                let v = match field {
                    UniqueField::Email => &u.email,
                };
                v == value && status.map_or(true, |s| u.status == s)
            })
            .cloned())
    }

    async fn find_by_status(&self, status: &str) -> anyhow::Result<Vec<User>> {
        let inner = self.lock();
        Ok(inner
            .rows
            .iter()
            .filter(|u| u.status.as_str() == status)
            .cloned()
            .collect())
    }

    async fn insert(&self, user: &User) -> anyhow::Result<i64> {
        let mut inner = self.lock();
        inner.check_email(&User { id: 0, ..user.clone() })?;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.push(User { id, ..user.clone() });
        Ok(id)
    }

    async fn update_fields(&self, user: &User) -> anyhow::Result<u64> {
        let mut inner = self.lock();
        inner.check_email(user)?;
        match inner.rows.iter_mut().find(|u| u.id == user.id) {
            Some(row) => {
                *row = User {
                    date_created: row.date_created.clone(),
                    ..user.clone()
                };
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_by_id(&self, id: i64) -> anyhow::Result<u64> {
        let mut inner = self.lock();
        let before = inner.rows.len();
        inner.rows.retain(|u| u.id != id);
        Ok((before - inner.rows.len()) as u64)
    }
}

/// Store whose every call fails, for exercising the `Internal` path.
pub struct BrokenUserStore;

#[async_trait]
impl UserStore for BrokenUserStore {
    async fn get_by_id(&self, _id: i64) -> anyhow::Result<Option<User>> {
        anyhow::bail!("connection refused")
    }

    async fn get_by_unique_field(
        &self,
        _field: UniqueField,
        _value: &str,
        _status: Option<UserStatus>,
    ) -> anyhow::Result<Option<User>> {
        anyhow::bail!("connection refused")
    }

    async fn find_by_status(&self, _status: &str) -> anyhow::Result<Vec<User>> {
        anyhow::bail!("connection refused")
    }

    async fn insert(&self, _user: &User) -> anyhow::Result<i64> {
        anyhow::bail!("connection refused")
    }

    async fn update_fields(&self, _user: &User) -> anyhow::Result<u64> {
        anyhow::bail!("connection refused")
    }

    async fn delete_by_id(&self, _id: i64) -> anyhow::Result<u64> {
        anyhow::bail!("connection refused")
    }
}
