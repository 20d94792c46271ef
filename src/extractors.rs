use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use rusqlite::params;

use crate::auth::token;
use crate::error::AppError;
use crate::state::AppState;

/// The authenticated actor attached to a request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// Extractor that requires a valid session credential.
///
/// Missing cookie, bad signature, expired token, and a user id that no
/// longer resolves against the identity store all reject with 401 before
/// the handler body runs. Name/email come from the store, not the claims.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = extract_session_token(parts, &state.config.auth.cookie_name)
            .ok_or(AppError::Unauthorized)?;

        let claims = token::verify(&state.keys, raw).map_err(|_| AppError::Unauthorized)?;

        // A cryptographically valid token may still reference a deleted or
        // never-seeded account.
        let conn = state.db.get()?;
        conn.query_row(
            "SELECT id, name, email FROM users WHERE id = ?1",
            params![claims.sub],
            |row| {
                Ok(CurrentUser {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                })
            },
        )
        .map_err(|_| AppError::Unauthorized)
    }
}

fn extract_session_token<'a>(parts: &'a Parts, cookie_name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == cookie_name {
                Some(val)
            } else {
                None
            }
        })
}
