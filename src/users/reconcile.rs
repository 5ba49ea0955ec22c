use tracing::error;

use crate::{
    error::{UserError, UserResult},
    users::{
        dto::UserRequest,
        password::Credentials,
        repo_types::{User, UserStatus},
        services::{is_valid_email, normalize_email},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// PUT: names are taken as sent, so an empty name clears it.
    Replace,
    /// PATCH: every empty field keeps its stored value.
    Patch,
}

/// `Some` only for a present, non-empty value.
pub(crate) fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|v| !v.is_empty())
}

/// Resolves the record to persist from the stored `old` and an incoming request.
///
/// `id` and `date_created` always come from `old`. Password, email and status
/// carry forward when empty in either mode.
pub fn reconcile(
    old: &User,
    req: &UserRequest,
    mode: UpdateMode,
    creds: &Credentials,
) -> UserResult<User> {
    let email = match non_empty(&req.email).map(normalize_email).filter(|e| !e.is_empty()) {
        Some(e) if !is_valid_email(&e) => return Err(UserError::invalid("invalid email address")),
        Some(e) => e,
        None => old.email.clone(),
    };

    let status = match non_empty(&req.status).map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s
            .parse::<UserStatus>()
            .map_err(|_| UserError::invalid("invalid user status"))?,
        None => old.status,
    };

    let (first_name, last_name) = match mode {
        UpdateMode::Replace => (
            req.first_name.clone().unwrap_or_default(),
            req.last_name.clone().unwrap_or_default(),
        ),
        UpdateMode::Patch => (
            non_empty(&req.first_name).map_or_else(|| old.first_name.clone(), str::to_string),
            non_empty(&req.last_name).map_or_else(|| old.last_name.clone(), str::to_string),
        ),
    };

    let password_hash = match non_empty(&req.password) {
        Some(plain) => creds.hash(plain).map_err(|e| {
            error!(error = %e, user_id = old.id, "password hashing failed");
            UserError::invalid("invalid user password")
        })?,
        None => old.password_hash.clone(),
    };

    Ok(User {
        id: old.id,
        first_name,
        last_name,
        email,
        status,
        password_hash,
        date_created: old.date_created.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn old(creds: &Credentials) -> User {
        User {
            id: 42,
            first_name: "A".into(),
            last_name: "B".into(),
            email: "a@b.com".into(),
            status: UserStatus::Active,
            password_hash: creds.hash("pw1").unwrap(),
            date_created: "2023-11-02 08:30:00".into(),
        }
    }

    fn req() -> UserRequest {
        UserRequest::default()
    }

    #[test]
    fn empty_password_carries_hash_forward_in_both_modes() {
        let creds = Credentials::fast();
        let old = old(&creds);
        for mode in [UpdateMode::Replace, UpdateMode::Patch] {
            for password in [None, Some(String::new())] {
                let r = UserRequest { password, ..req() };
                let out = reconcile(&old, &r, mode, &creds).unwrap();
                assert_eq!(out.password_hash, old.password_hash, "{mode:?}");
            }
        }
    }

    #[test]
    fn new_password_is_hashed() {
        let creds = Credentials::fast();
        let old = old(&creds);
        let r = UserRequest {
            password: Some("pw2".into()),
            ..req()
        };
        let out = reconcile(&old, &r, UpdateMode::Patch, &creds).unwrap();
        assert_ne!(out.password_hash, old.password_hash);
        assert_ne!(out.password_hash, "pw2");
        assert!(creds.verify(&out.password_hash, "pw2").unwrap());
    }

    #[test]
    fn patch_and_replace_diverge_on_empty_names() {
        let creds = Credentials::fast();
        let old = old(&creds);
        let r = UserRequest {
            first_name: Some(String::new()),
            ..req()
        };

        let patched = reconcile(&old, &r, UpdateMode::Patch, &creds).unwrap();
        assert_eq!(patched.first_name, "A");
        assert_eq!(patched.last_name, "B");

        let replaced = reconcile(&old, &r, UpdateMode::Replace, &creds).unwrap();
        assert_eq!(replaced.first_name, "");
        assert_eq!(replaced.last_name, "");
    }

    #[test]
    fn email_and_status_carry_forward_in_replace_mode() {
        let creds = Credentials::fast();
        let old = User {
            status: UserStatus::Inactive,
            ..old(&creds)
        };
        let r = UserRequest {
            first_name: Some("X".into()),
            last_name: Some("Y".into()),
            email: Some(String::new()),
            ..req()
        };
        let out = reconcile(&old, &r, UpdateMode::Replace, &creds).unwrap();
        assert_eq!(out.email, "a@b.com");
        assert_eq!(out.status, UserStatus::Inactive);
        assert_eq!((out.first_name.as_str(), out.last_name.as_str()), ("X", "Y"));
    }

    #[test]
    fn identity_and_creation_date_are_fixed() {
        let creds = Credentials::fast();
        let old = old(&creds);
        let r = UserRequest {
            email: Some("new@b.com".into()),
            status: Some("inactive".into()),
            ..req()
        };
        let out = reconcile(&old, &r, UpdateMode::Replace, &creds).unwrap();
        assert_eq!(out.id, 42);
        assert_eq!(out.date_created, old.date_created);
        assert_eq!(out.email, "new@b.com");
        assert_eq!(out.status, UserStatus::Inactive);
    }

    #[test]
    fn rejects_unknown_status_and_bad_email() {
        let creds = Credentials::fast();
        let old = old(&creds);

        let r = UserRequest {
            status: Some("deleted".into()),
            ..req()
        };
        assert!(matches!(
            reconcile(&old, &r, UpdateMode::Patch, &creds),
            Err(UserError::InvalidInput(_))
        ));

        let r = UserRequest {
            email: Some("not-an-email".into()),
            ..req()
        };
        assert!(matches!(
            reconcile(&old, &r, UpdateMode::Patch, &creds),
            Err(UserError::InvalidInput(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn empty_password_never_touches_hash_identity_or_creation_date(
            replace in any::<bool>(),
            first_name in proptest::option::of(".{0,10}"),
            last_name in proptest::option::of(".{0,10}"),
            email in proptest::option::of("[a-zA-Z]{1,6}@[a-z]{1,6}\\.org"),
            password in prop_oneof![Just(None), Just(Some(String::new()))],
        ) {
            let creds = Credentials::fast();
            let old = old(&creds);
            let mode = if replace { UpdateMode::Replace } else { UpdateMode::Patch };
            let r = UserRequest {
                first_name,
                last_name,
                email: email.clone(),
                password,
                ..req()
            };
            let out = reconcile(&old, &r, mode, &creds).unwrap();
            prop_assert_eq!(&out.password_hash, &old.password_hash);
            prop_assert_eq!(out.id, old.id);
            prop_assert_eq!(&out.date_created, &old.date_created);
            let want = email.map_or_else(|| old.email.clone(), |e| e.to_lowercase());
            prop_assert_eq!(out.email, want);
        }
    }
}
