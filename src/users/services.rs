use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    clock::Clock,
    config::UserPolicy,
    error::{UserError, UserResult},
    users::{
        dto::UserRequest,
        password::Credentials,
        reconcile::{non_empty, reconcile, UpdateMode},
        repo::{UniqueViolation, UserStore},
        repo_types::{UniqueField, User, UserStatus},
    },
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Emails identify accounts case-insensitively; they are stored lowercased.
pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Logs a store failure and hides its details from the caller. A unique
/// violation lost to a concurrent writer reads as the taken-email rejection.
fn store_err(op: &'static str) -> impl FnOnce(anyhow::Error) -> UserError {
    move |e| {
        if e.downcast_ref::<UniqueViolation>().is_some() {
            warn!(error = %e, op, "email already registered");
            return UserError::invalid("email already registered");
        }
        error!(error = %e, op, "user store failure");
        UserError::internal("database error")
    }
}

/// Coordinates the credential codec, the reconciler and the store for every
/// user operation. Holds no per-request state.
///
/// `update` reads, reconciles and writes without a version check, so two
/// concurrent updates of the same user resolve as last writer wins.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    creds: Credentials,
    policy: UserPolicy,
}

impl UserService {
    pub fn new(
        store: Arc<dyn UserStore>,
        clock: Arc<dyn Clock>,
        creds: Credentials,
        policy: UserPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            creds,
            policy,
        }
    }

    #[instrument(skip(self, input))]
    pub async fn create(&self, input: UserRequest) -> UserResult<User> {
        let email = non_empty(&input.email)
            .map(normalize_email)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| UserError::invalid("invalid email address"))?;
        let email = email.as_str();
        let password =
            non_empty(&input.password).ok_or_else(|| UserError::invalid("invalid password"))?;

        if !is_valid_email(email) {
            warn!(email = %email, "invalid email");
            return Err(UserError::invalid("invalid email address"));
        }

        if self
            .store
            .get_by_unique_field(UniqueField::Email, email, None)
            .await
            .map_err(store_err("create: lookup email"))?
            .is_some()
        {
            warn!(email = %email, "email already registered");
            return Err(UserError::invalid("email already registered"));
        }

        let password_hash = self.creds.hash(password).map_err(|e| {
            error!(error = %e, "hash_password failed");
            UserError::invalid("invalid user password")
        })?;

        let date_created = self.clock.storage_now().map_err(|e| {
            error!(error = %e, "formatting creation time failed");
            UserError::internal("could not timestamp user")
        })?;

        let mut user = User {
            id: 0,
            first_name: input.first_name.unwrap_or_default(),
            last_name: input.last_name.unwrap_or_default(),
            email: email.to_string(),
            status: self.policy.default_status,
            password_hash,
            date_created,
        };
        user.id = self
            .store
            .insert(&user)
            .await
            .map_err(store_err("create: insert"))?;

        info!(user_id = user.id, email = %user.email, "user created");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, id: i64) -> UserResult<User> {
        self.store
            .get_by_id(id)
            .await
            .map_err(store_err("fetch"))?
            .ok_or_else(|| UserError::not_found(format!("user {id} not found")))
    }

    /// Users whose status equals `status` exactly, in store order.
    #[instrument(skip(self))]
    pub async fn search(&self, status: &str) -> UserResult<Vec<User>> {
        self.store
            .find_by_status(status)
            .await
            .map_err(store_err("search"))
    }

    #[instrument(skip(self, input))]
    pub async fn update(&self, mode: UpdateMode, id: i64, input: UserRequest) -> UserResult<User> {
        let old = self.fetch(id).await?;
        let user = reconcile(&old, &input, mode, &self.creds)?;

        if user.email != old.email {
            let holder = self
                .store
                .get_by_unique_field(UniqueField::Email, &user.email, None)
                .await
                .map_err(store_err("update: lookup email"))?;
            if holder.is_some_and(|h| h.id != id) {
                warn!(user_id = id, "email already registered to another user");
                return Err(UserError::invalid("email already registered"));
            }
        }

        let rows = self
            .store
            .update_fields(&user)
            .await
            .map_err(store_err("update"))?;
        if rows == 0 {
            warn!(user_id = id, "user vanished before update");
            return Err(UserError::not_found(format!("user {id} not found")));
        }

        info!(user_id = id, ?mode, "user updated");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> UserResult<()> {
        let rows = self
            .store
            .delete_by_id(id)
            .await
            .map_err(store_err("delete"))?;
        if rows == 0 {
            return Err(UserError::not_found(format!("user {id} not found")));
        }
        info!(user_id = id, "user deleted");
        Ok(())
    }

    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> UserResult<User> {
        let email = normalize_email(email);
        let email = email.as_str();
        if email.is_empty() {
            return Err(UserError::invalid("invalid email address"));
        }
        if password.is_empty() {
            return Err(UserError::invalid("invalid password"));
        }

        let user = match self
            .store
            .get_by_unique_field(UniqueField::Email, email, Some(UserStatus::Active))
            .await
            .map_err(store_err("authenticate"))?
        {
            Some(u) => u,
            None => {
                warn!(email = %email, "login unknown email");
                return Err(if self.policy.unify_login_failures {
                    UserError::invalid("invalid credentials")
                } else {
                    UserError::not_found("user not found")
                });
            }
        };

        let ok = self.creds.verify(&user.password_hash, password).map_err(|e| {
            error!(error = %e, user_id = user.id, "stored password hash is malformed");
            UserError::internal("could not verify credentials")
        })?;
        if !ok {
            warn!(user_id = user.id, "login invalid password");
            return Err(UserError::invalid("invalid credentials"));
        }

        info!(user_id = user.id, "user logged in");
        Ok(user)
    }
}
