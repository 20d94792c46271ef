use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use rusqlite::params;
use serde::Deserialize;

use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::store::StoreItemView;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UpdateBioRequest {
    pub bio: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/{id}", get(get_user))
        .route("/user/{id}/store-items", get(get_user_items))
        .route("/user/{id}/bio", put(update_bio))
}

/// GET /user/{id} — public profile.
async fn get_user(State(state): State<AppState>, Path(user_id): Path<i64>) -> AppResult<Json<User>> {
    let conn = state.db.get()?;
    let user = User::fetch(&conn, user_id)?.ok_or(AppError::NotFound)?;
    Ok(Json(user))
}

/// GET /user/{id}/store-items — everything a user has listed, sold items
/// included (this is their profile page, not the browse set).
async fn get_user_items(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<Vec<StoreItemView>>> {
    let conn = state.db.get()?;

    User::fetch(&conn, user_id)?.ok_or(AppError::NotFound)?;

    let items = crate::routes::store::query_items(
        &conn,
        None,
        "WHERE i.user_id = ?2 ORDER BY i.created_at DESC, i.id DESC",
        &[&user_id as &dyn rusqlite::ToSql],
    )?;
    Ok(Json(items))
}

/// PUT /user/{id}/bio — users edit their own profile only.
async fn update_bio(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(user_id): Path<i64>,
    Json(req): Json<UpdateBioRequest>,
) -> AppResult<Json<User>> {
    if user.id != user_id {
        return Err(AppError::Forbidden);
    }

    let bio = req
        .bio
        .ok_or_else(|| AppError::BadRequest("Missing bio".into()))?;

    let conn = state.db.get()?;
    conn.execute(
        "UPDATE users SET bio = ?1 WHERE id = ?2",
        params![bio, user.id],
    )?;

    let updated = User::fetch(&conn, user.id)?.ok_or(AppError::NotFound)?;
    Ok(Json(updated))
}
