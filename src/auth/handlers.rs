use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use rusqlite::params;
use serde::Deserialize;
use serde_json::json;

use crate::auth::google::VerifiedIdentity;
use crate::auth::token::{self, Claims};
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct LoginRequest {
    pub google_token: Option<String>,
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

// -- Handlers --

/// POST /login — exchange an identity-provider token for a session cookie.
/// This is the only path that creates users outside of seed data.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Response> {
    let google_token = req
        .google_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing google_token".into()))?;

    let identity = state.google.verify(&google_token).await.map_err(|e| {
        tracing::debug!("Identity token rejected: {}", e);
        AppError::BadRequest("Invalid Google token".into())
    })?;

    let user = {
        let conn = state.db.get()?;
        find_or_create_user(&conn, &identity)?
    };

    let claims = Claims::new(
        user.id,
        &user.name,
        &user.email,
        state.config.auth.session_hours,
    );
    let session_token = token::sign(&state.keys, &claims)
        .map_err(|e| AppError::Internal(format!("Failed to sign session token: {}", e)))?;

    tracing::info!(user_id = user.id, "User logged in");

    Ok((
        StatusCode::OK,
        AppendHeaders([(
            header::SET_COOKIE,
            session_cookie(
                &state.config.auth.cookie_name,
                &session_token,
                state.config.auth.session_hours,
            ),
        )]),
        Json(json!({ "user_data": user })),
    )
        .into_response())
}

/// POST /logout — clear the session cookie. The credential itself is
/// stateless, so there is nothing to revoke server-side.
pub async fn logout(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        AppendHeaders([(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.cookie_name),
        )]),
        Json(json!({ "message": "Logged out" })),
    )
        .into_response()
}

/// GET /me — the current actor's full profile.
pub async fn me(State(state): State<AppState>, actor: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let user = User::fetch(&conn, actor.id)?.ok_or(AppError::Unauthorized)?;
    Ok(Json(json!({ "user_data": user })).into_response())
}

/// Upsert-by-email: the provider's email is the stable key; display name and
/// picture are only set on first login.
fn find_or_create_user(
    conn: &rusqlite::Connection,
    identity: &VerifiedIdentity,
) -> Result<User, AppError> {
    if let Some(user) = User::fetch_by_email(conn, &identity.email)? {
        return Ok(user);
    }

    conn.execute(
        "INSERT INTO users (name, email, profile_picture_url) VALUES (?1, ?2, ?3)",
        params![identity.name, identity.email, identity.picture],
    )?;
    let id = conn.last_insert_rowid();

    User::fetch(conn, id)?
        .ok_or_else(|| AppError::Internal("User vanished right after insert".into()))
}
