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
use crate::offers::repository::{OfferRepository, SqliteOfferRepository};
use crate::state::AppState;

// --- View structs ---

#[derive(Debug, Serialize)]
pub struct StoreItemView {
    pub id: i64,
    pub created_at: String,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub picture_data: String,
    pub category: String,
    pub gender: String,
    pub condition: String,
    pub color: String,
    pub size: String,
    pub liked: bool,
    pub like_count: i64,
    pub is_available: bool,
}

#[derive(Debug, Serialize)]
pub struct StoreItemDetailView {
    #[serde(flatten)]
    pub item: StoreItemView,
    pub user_name: String,
    pub current_user_made_offer: bool,
}

// --- Forms ---

/// Fields of the multipart upload form, gathered before validation.
#[derive(Default)]
struct UploadForm {
    user_id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    price: Option<String>,
    color: Option<String>,
    gender: Option<String>,
    size: Option<String>,
    condition: Option<String>,
    category: Option<String>,
    picture_file: Option<Vec<u8>>,
}

#[derive(Deserialize)]
pub struct CreateOfferRequest {
    pub offer_amount: Option<f64>,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/store-items", get(list_items).post(create_item))
        .route("/store-items/{id}", get(get_item).delete(delete_item))
        .route("/store-items/{id}/like", post(toggle_like))
        .route("/store-items/{id}/offer", post(create_offer))
}

// --- Handlers ---

/// GET /store-items — available listings, newest first, with the viewer's
/// like state. Items withdrawn by a completed trade never reappear here.
async fn list_items(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<StoreItemView>>> {
    let conn = state.db.get()?;
    let items = query_items(
        &conn,
        Some(user.id),
        "WHERE i.is_available = 1 ORDER BY i.created_at DESC, i.id DESC",
        &[],
    )?;
    Ok(Json(items))
}

/// GET /store-items/{id} — detail with seller name and whether the viewer
/// already has an active offer on it.
async fn get_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(item_id): Path<i64>,
) -> AppResult<Json<StoreItemDetailView>> {
    let conn = state.db.get()?;

    let mut items = query_items(
        &conn,
        Some(user.id),
        "WHERE i.id = ?2",
        &[&item_id as &dyn rusqlite::ToSql],
    )?;
    let item = items.pop().ok_or(AppError::NotFound)?;

    let user_name: String = conn
        .query_row(
            "SELECT name FROM users WHERE id = ?1",
            params![item.user_id],
            |r| r.get(0),
        )
        .map_err(|_| AppError::NotFound)?;

    // Declined/cancelled negotiations do not block a fresh offer.
    let current_user_made_offer: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM item_offers
         WHERE item_id = ?1 AND buyer_id = ?2 AND status IN ('Pending', 'Accepted', 'Completed')",
        params![item_id, user.id],
        |r| r.get(0),
    )?;

    Ok(Json(StoreItemDetailView {
        item,
        user_name,
        current_user_made_offer,
    }))
}

/// POST /store-items — multipart upload of a new listing.
async fn create_item(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::BadRequest("Invalid multipart body".into()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "picture_file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::BadRequest("Failed to read picture file".into()))?;
                form.picture_file = Some(bytes.to_vec());
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| AppError::BadRequest("Invalid form field".into()))?;
                match name.as_str() {
                    "user_id" => form.user_id = Some(value),
                    "title" => form.title = Some(value),
                    "description" => form.description = Some(value),
                    "price" => form.price = Some(value),
                    "color" => form.color = Some(value),
                    "gender" => form.gender = Some(value),
                    "size" => form.size = Some(value),
                    "condition" => form.condition = Some(value),
                    "category" => form.category = Some(value),
                    _ => {} // unknown fields are ignored
                }
            }
        }
    }

    let picture_data = form
        .picture_file
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| AppError::BadRequest("No picture file uploaded".into()))?;

    let (user_id, title, description, price, color, gender, size, condition, category) =
        match (
            form.user_id,
            form.title,
            form.description,
            form.price,
            form.color,
            form.gender,
            form.size,
            form.condition,
            form.category,
        ) {
            (
                Some(user_id),
                Some(title),
                Some(description),
                Some(price),
                Some(color),
                Some(gender),
                Some(size),
                Some(condition),
                Some(category),
            ) => (
                user_id, title, description, price, color, gender, size, condition, category,
            ),
            _ => return Err(AppError::BadRequest("Missing required fields".into())),
        };

    let form_user_id: i64 = user_id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid user_id".into()))?;

    // The listing must be created in the actor's own name.
    if form_user_id != user.id {
        return Err(AppError::Forbidden);
    }

    let price: f64 = price
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid price".into()))?;
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::BadRequest("Price must be non-negative".into()));
    }

    if title.trim().is_empty() || description.trim().is_empty() {
        return Err(AppError::BadRequest("Missing required fields".into()));
    }

    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO item_listings
           (user_id, title, description, price, color, size, gender, condition, category, picture_data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            user.id,
            title.trim(),
            description.trim(),
            price,
            color,
            size,
            gender,
            condition,
            category,
            picture_data,
        ],
    )?;
    let id = conn.last_insert_rowid();

    tracing::info!(user_id = user.id, item_id = id, "Listing created");

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))).into_response())
}

/// DELETE /store-items/{id} — owner-only. Dependent offers and likes go
/// with the row (FK cascade).
async fn delete_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(item_id): Path<i64>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    let owner_id: i64 = conn
        .query_row(
            "SELECT user_id FROM item_listings WHERE id = ?1",
            params![item_id],
            |r| r.get(0),
        )
        .map_err(|_| AppError::NotFound)?;

    if owner_id != user.id {
        return Err(AppError::Forbidden);
    }

    conn.execute(
        "DELETE FROM item_listings WHERE id = ?1",
        params![item_id],
    )?;
    Ok(Json(json!({ "deleted": true })).into_response())
}

/// POST /store-items/{id}/like — toggle the viewer's like.
async fn toggle_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(item_id): Path<i64>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    // Verify item exists
    let _: i64 = conn
        .query_row(
            "SELECT id FROM item_listings WHERE id = ?1",
            params![item_id],
            |r| r.get(0),
        )
        .map_err(|_| AppError::NotFound)?;

    // Toggle: check exists, then delete or insert
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM item_likes WHERE item_id = ?1 AND user_id = ?2",
            params![item_id, user.id],
            |r| r.get(0),
        )
        .ok();

    let liked = if existing.is_some() {
        conn.execute(
            "DELETE FROM item_likes WHERE item_id = ?1 AND user_id = ?2",
            params![item_id, user.id],
        )?;
        false
    } else {
        conn.execute(
            "INSERT INTO item_likes (item_id, user_id) VALUES (?1, ?2)",
            params![item_id, user.id],
        )?;
        true
    };

    let like_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM item_likes WHERE item_id = ?1",
        params![item_id],
        |r| r.get(0),
    )?;

    Ok(Json(json!({ "liked": liked, "like_count": like_count })).into_response())
}

/// POST /store-items/{id}/offer — open a negotiation on someone else's
/// listing.
async fn create_offer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(item_id): Path<i64>,
    Json(req): Json<CreateOfferRequest>,
) -> AppResult<Response> {
    let amount = req
        .offer_amount
        .ok_or_else(|| AppError::BadRequest("Missing offer_amount".into()))?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(AppError::BadRequest(
            "Offer amount must be non-negative".into(),
        ));
    }

    let repo = SqliteOfferRepository::new(state.db.clone());
    let offer_id = repo.create(item_id, user.id, amount).await?;

    tracing::info!(
        buyer_id = user.id,
        item_id,
        offer_id,
        "Offer created"
    );

    Ok(Json(json!({ "id": offer_id, "status": "Pending" })).into_response())
}

// --- Query helpers ---

/// Shared listing query. `extra` is appended after the fixed columns and
/// must bind its params starting at ?2 (?1 is the viewer id used for the
/// `liked` flag).
pub(crate) fn query_items(
    conn: &rusqlite::Connection,
    viewer_id: Option<i64>,
    extra: &str,
    extra_params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<StoreItemView>, AppError> {
    let sql = format!(
        "SELECT i.id, i.created_at, i.user_id, i.title, i.description, i.price,
                i.picture_data, i.category, i.gender, i.condition, i.color, i.size,
                i.is_available,
                COALESCE((SELECT COUNT(*) FROM item_likes l WHERE l.item_id = i.id), 0) as like_count,
                COALESCE((SELECT COUNT(*) > 0 FROM item_likes l WHERE l.item_id = i.id AND l.user_id = ?1), 0) as liked
         FROM item_listings i
         {}",
        extra
    );

    let viewer = viewer_id.unwrap_or(-1);
    let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&viewer];
    params_vec.extend_from_slice(extra_params);

    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(params_vec.as_slice(), |row| {
            Ok(StoreItemView {
                id: row.get(0)?,
                created_at: row.get(1)?,
                user_id: row.get(2)?,
                title: row.get(3)?,
                description: row.get(4)?,
                price: row.get(5)?,
                picture_data: BASE64.encode(row.get::<_, Vec<u8>>(6)?),
                category: row.get(7)?,
                gender: row.get(8)?,
                condition: row.get(9)?,
                color: row.get(10)?,
                size: row.get(11)?,
                is_available: row.get(12)?,
                like_count: row.get(13)?,
                liked: row.get(14)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();

    Ok(items)
}
