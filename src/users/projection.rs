use axum::http::HeaderMap;

use crate::users::{
    dto::{PrivateUser, PublicUser, UserView, Visibility},
    repo_types::User,
};

pub const PUBLIC_HEADER: &str = "x-public";

impl Visibility {
    /// `x-public: true` asks for the public view; anything else is private.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        match headers.get(PUBLIC_HEADER).and_then(|v| v.to_str().ok()) {
            Some(v) if v.trim().eq_ignore_ascii_case("true") => Self::Public,
            _ => Self::Private,
        }
    }
}

pub fn project(user: &User, visibility: Visibility) -> UserView {
    match visibility {
        Visibility::Public => UserView::Public(PublicUser {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }),
        Visibility::Private => UserView::Private(PrivateUser {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            date_created: user.date_created.clone(),
            status: user.status,
        }),
    }
}

pub fn project_all(users: &[User], visibility: Visibility) -> Vec<UserView> {
    users.iter().map(|u| project(u, visibility)).collect()
}
