use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

// --- View structs ---

#[derive(Debug, Serialize)]
pub struct ForumPostView {
    pub id: i64,
    pub user_id: i64,
    pub author: String,
    pub title: String,
    pub content: String,
    pub photo_data: Option<String>,
    pub created_at: String,
    pub like_count: i64,
    pub comment_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ForumCommentView {
    pub id: i64,
    pub user_id: i64,
    pub author: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ForumPostDetailView {
    #[serde(flatten)]
    pub post: ForumPostView,
    pub comments: Vec<ForumCommentView>,
}

// --- Forms ---

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub content: Option<String>,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/forum/posts", get(list_posts).post(create_post))
        .route("/forum/posts/{id}", get(get_post))
        .route("/forum/posts/{id}/comments", post(create_comment))
        .route("/forum/posts/{id}/like", post(toggle_like))
}

// --- Handlers ---

/// GET /forum/posts — public, newest first.
async fn list_posts(State(state): State<AppState>) -> AppResult<Json<Vec<ForumPostView>>> {
    let conn = state.db.get()?;
    let posts = query_posts(&conn)?;
    Ok(Json(posts))
}

/// POST /forum/posts — multipart: title, content, optional photo.
async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut title: Option<String> = None;
    let mut content: Option<String> = None;
    let mut photo: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::BadRequest("Invalid multipart body".into()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "photo" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::BadRequest("Failed to read photo".into()))?;
                if !bytes.is_empty() {
                    photo = Some(bytes.to_vec());
                }
            }
            "title" => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|_| AppError::BadRequest("Invalid form field".into()))?,
                )
            }
            "content" => {
                content = Some(
                    field
                        .text()
                        .await
                        .map_err(|_| AppError::BadRequest("Invalid form field".into()))?,
                )
            }
            _ => {} // unknown fields are ignored
        }
    }

    let title = title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing title".into()))?;
    let content = content
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing content".into()))?;

    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO forum_posts (user_id, title, content, photo_data) VALUES (?1, ?2, ?3, ?4)",
        params![user.id, title, content, photo],
    )?;
    let id = conn.last_insert_rowid();

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))).into_response())
}

/// GET /forum/posts/{id} — public post detail with comments.
async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> AppResult<Json<ForumPostDetailView>> {
    let conn = state.db.get()?;

    let post = query_post(&conn, post_id)?.ok_or(AppError::NotFound)?;
    let comments = query_comments(&conn, post_id)?;

    Ok(Json(ForumPostDetailView { post, comments }))
}

/// POST /forum/posts/{id}/comments
async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<i64>,
    Json(req): Json<CreateCommentRequest>,
) -> AppResult<Response> {
    let content = req
        .content
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing content".into()))?;

    let conn = state.db.get()?;

    // Verify post exists
    let _: i64 = conn
        .query_row(
            "SELECT id FROM forum_posts WHERE id = ?1",
            params![post_id],
            |r| r.get(0),
        )
        .map_err(|_| AppError::NotFound)?;

    conn.execute(
        "INSERT INTO forum_comments (forum_post_id, user_id, content) VALUES (?1, ?2, ?3)",
        params![post_id, user.id, content],
    )?;
    let id = conn.last_insert_rowid();

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))).into_response())
}

/// POST /forum/posts/{id}/like — toggle.
async fn toggle_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<i64>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    let _: i64 = conn
        .query_row(
            "SELECT id FROM forum_posts WHERE id = ?1",
            params![post_id],
            |r| r.get(0),
        )
        .map_err(|_| AppError::NotFound)?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM forum_likes WHERE forum_post_id = ?1 AND user_id = ?2",
            params![post_id, user.id],
            |r| r.get(0),
        )
        .ok();

    let liked = if existing.is_some() {
        conn.execute(
            "DELETE FROM forum_likes WHERE forum_post_id = ?1 AND user_id = ?2",
            params![post_id, user.id],
        )?;
        false
    } else {
        conn.execute(
            "INSERT INTO forum_likes (forum_post_id, user_id) VALUES (?1, ?2)",
            params![post_id, user.id],
        )?;
        true
    };

    let like_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM forum_likes WHERE forum_post_id = ?1",
        params![post_id],
        |r| r.get(0),
    )?;

    Ok(Json(json!({ "liked": liked, "like_count": like_count })).into_response())
}

// --- Query helpers ---

const POST_COLUMNS: &str =
    "SELECT p.id, p.user_id, u.name, p.title, p.content, p.photo_data, p.created_at,
            COALESCE((SELECT COUNT(*) FROM forum_likes l WHERE l.forum_post_id = p.id), 0) as like_count,
            COALESCE((SELECT COUNT(*) FROM forum_comments c WHERE c.forum_post_id = p.id), 0) as comment_count
     FROM forum_posts p
     JOIN users u ON u.id = p.user_id";

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ForumPostView> {
    Ok(ForumPostView {
        id: row.get(0)?,
        user_id: row.get(1)?,
        author: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        photo_data: row
            .get::<_, Option<Vec<u8>>>(5)?
            .map(|bytes| BASE64.encode(bytes)),
        created_at: row.get(6)?,
        like_count: row.get(7)?,
        comment_count: row.get(8)?,
    })
}

fn query_posts(conn: &rusqlite::Connection) -> Result<Vec<ForumPostView>, AppError> {
    let sql = format!("{} ORDER BY p.created_at DESC, p.id DESC", POST_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;

    let posts = stmt
        .query_map([], post_from_row)?
        .filter_map(|r| r.ok())
        .collect();

    Ok(posts)
}

fn query_post(
    conn: &rusqlite::Connection,
    post_id: i64,
) -> Result<Option<ForumPostView>, AppError> {
    use rusqlite::OptionalExtension;

    let sql = format!("{} WHERE p.id = ?1", POST_COLUMNS);
    let post = conn
        .query_row(&sql, params![post_id], post_from_row)
        .optional()?;
    Ok(post)
}

fn query_comments(
    conn: &rusqlite::Connection,
    post_id: i64,
) -> Result<Vec<ForumCommentView>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.user_id, u.name, c.content, c.created_at
         FROM forum_comments c
         JOIN users u ON u.id = c.user_id
         WHERE c.forum_post_id = ?1
         ORDER BY c.created_at ASC, c.id ASC",
    )?;

    let comments = stmt
        .query_map(params![post_id], |row| {
            Ok(ForumCommentView {
                id: row.get(0)?,
                user_id: row.get(1)?,
                author: row.get(2)?,
                content: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();

    Ok(comments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_pool() -> (crate::state::DbPool, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = db::create_pool(&tmp.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        let conn = pool.get().unwrap();
        conn.execute_batch(
            "INSERT INTO users (name, email) VALUES ('a', 'a@example.edu');
             INSERT INTO forum_posts (user_id, title, content) VALUES (1, 'Hello', 'First post');",
        )
        .unwrap();
        (pool, tmp)
    }

    #[test]
    fn query_posts_includes_author_and_counts() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        conn.execute_batch(
            "INSERT INTO forum_comments (forum_post_id, user_id, content) VALUES (1, 1, 'hi');
             INSERT INTO forum_likes (forum_post_id, user_id) VALUES (1, 1);",
        )
        .unwrap();

        let posts = query_posts(&conn).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].author, "a");
        assert_eq!(posts[0].like_count, 1);
        assert_eq!(posts[0].comment_count, 1);
        assert!(posts[0].photo_data.is_none());
    }

    #[test]
    fn query_comments_ordered_oldest_first() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        conn.execute_batch(
            "INSERT INTO forum_comments (forum_post_id, user_id, content) VALUES (1, 1, 'first');
             INSERT INTO forum_comments (forum_post_id, user_id, content) VALUES (1, 1, 'second');",
        )
        .unwrap();

        let comments = query_comments(&conn, 1).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].content, "first");
        assert_eq!(comments[1].content, "second");
    }
}
