use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    error::{UserError, UserResult},
    state::AppState,
    users::{
        dto::{DeletedResponse, LoginRequest, SearchQuery, UserRequest, UserView, Visibility},
        projection::{project, project_all},
        reconcile::UpdateMode,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/login", post(login))
        .route(
            "/users/:user_id",
            get(get_user)
                .put(replace_user)
                .patch(patch_user)
                .delete(delete_user),
        )
        .route("/internal/users/search", get(search_users))
}

fn parse_user_id(raw: &str) -> UserResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| UserError::invalid("invalid user id"))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> UserResult<T> {
    payload.map(|Json(v)| v).map_err(|e| {
        warn!(error = %e, "rejected request body");
        UserError::invalid("invalid json body")
    })
}

/// Write responses always carry the public view; `x-public` only steers reads.
#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<UserRequest>, JsonRejection>,
) -> UserResult<Json<UserView>> {
    let user = state.users.create(body(payload)?).await?;
    Ok(Json(project(&user, Visibility::Public)))
}

#[instrument(skip(state, headers))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> UserResult<Json<UserView>> {
    let user = state.users.fetch(parse_user_id(&user_id)?).await?;
    Ok(Json(project(&user, Visibility::from_headers(&headers))))
}

#[instrument(skip(state, headers))]
pub async fn search_users(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
    headers: HeaderMap,
) -> UserResult<Json<Vec<UserView>>> {
    let users = state.users.search(q.status.trim()).await?;
    Ok(Json(project_all(&users, Visibility::from_headers(&headers))))
}

#[instrument(skip(state, payload))]
pub async fn replace_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<UserRequest>, JsonRejection>,
) -> UserResult<Json<UserView>> {
    update(state, UpdateMode::Replace, &user_id, payload).await
}

#[instrument(skip(state, payload))]
pub async fn patch_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<UserRequest>, JsonRejection>,
) -> UserResult<Json<UserView>> {
    update(state, UpdateMode::Patch, &user_id, payload).await
}

async fn update(
    state: AppState,
    mode: UpdateMode,
    user_id: &str,
    payload: Result<Json<UserRequest>, JsonRejection>,
) -> UserResult<Json<UserView>> {
    let id = parse_user_id(user_id)?;
    let user = state.users.update(mode, id, body(payload)?).await?;
    Ok(Json(project(&user, Visibility::Public)))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> UserResult<Json<DeletedResponse>> {
    state.users.delete(parse_user_id(&user_id)?).await?;
    Ok(Json(DeletedResponse { status: "deleted" }))
}

#[instrument(skip(state, headers, payload))]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> UserResult<Json<UserView>> {
    let req = body(payload)?;
    let user = state.users.authenticate(&req.email, &req.password).await?;
    Ok(Json(project(&user, Visibility::from_headers(&headers))))
}
