use axum::extract::{Path, State};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::offers::domain::Party;
use crate::offers::repository::{
    EnrichedOffer, OfferRepository, OfferUpdate, SqliteOfferRepository,
};
use crate::state::AppState;

// --- View structs ---

/// An offer as seen by the buyer who made it. The counterpart is the seller;
/// `seller_contact` is empty until the offer is Accepted.
#[derive(Debug, Serialize)]
pub struct OfferMadeView {
    pub id: i64,
    pub created_at: String,
    pub item_id: i64,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub offer_amount: f64,
    pub status: &'static str,
    pub item_title: String,
    pub item_price: f64,
    pub item_picture_data: String,
    pub seller_name: String,
    pub seller_profile_picture_url: String,
    pub seller_contact: String,
    pub buyer_completed: bool,
    pub seller_completed: bool,
}

/// An offer as seen by the seller who received it.
#[derive(Debug, Serialize)]
pub struct OfferReceivedView {
    pub id: i64,
    pub created_at: String,
    pub item_id: i64,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub offer_amount: f64,
    pub status: &'static str,
    pub item_title: String,
    pub item_price: f64,
    pub item_picture_data: String,
    pub buyer_name: String,
    pub buyer_profile_picture_url: String,
    pub buyer_contact: String,
    pub buyer_completed: bool,
    pub seller_completed: bool,
}

impl From<EnrichedOffer> for OfferMadeView {
    fn from(o: EnrichedOffer) -> Self {
        Self {
            id: o.id,
            created_at: o.created_at,
            item_id: o.item_id,
            buyer_id: o.buyer_id,
            seller_id: o.seller_id,
            offer_amount: o.offer_amount,
            status: o.status.as_str(),
            item_title: o.item_title,
            item_price: o.item_price,
            item_picture_data: BASE64.encode(&o.item_picture),
            seller_name: o.counterpart_name,
            seller_profile_picture_url: o.counterpart_picture_url.unwrap_or_default(),
            seller_contact: o.counterpart_contact.unwrap_or_default(),
            buyer_completed: o.buyer_completed,
            seller_completed: o.seller_completed,
        }
    }
}

impl From<EnrichedOffer> for OfferReceivedView {
    fn from(o: EnrichedOffer) -> Self {
        Self {
            id: o.id,
            created_at: o.created_at,
            item_id: o.item_id,
            buyer_id: o.buyer_id,
            seller_id: o.seller_id,
            offer_amount: o.offer_amount,
            status: o.status.as_str(),
            item_title: o.item_title,
            item_price: o.item_price,
            item_picture_data: BASE64.encode(&o.item_picture),
            buyer_name: o.counterpart_name,
            buyer_profile_picture_url: o.counterpart_picture_url.unwrap_or_default(),
            buyer_contact: o.counterpart_contact.unwrap_or_default(),
            buyer_completed: o.buyer_completed,
            seller_completed: o.seller_completed,
        }
    }
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/{id}/offers-made", get(offers_made))
        .route("/user/{id}/offers-received", get(offers_received))
        .route("/offers/{id}/accept", put(accept_offer))
        .route("/offers/{id}/decline", put(decline_offer))
        .route("/offers/{id}/complete-buyer", put(complete_buyer))
        .route("/offers/{id}/complete-seller", put(complete_seller))
        .route("/offers/{id}/cancel-accepted", put(cancel_accepted))
        .route("/offers/{id}/delete-pending", delete(delete_pending))
}

fn repo(state: &AppState) -> SqliteOfferRepository {
    SqliteOfferRepository::new(state.db.clone())
}

// --- Handlers ---

/// GET /user/{id}/offers-made — negotiation data is private to its owner.
async fn offers_made(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(user_id): Path<i64>,
) -> AppResult<Json<Vec<OfferMadeView>>> {
    if user.id != user_id {
        return Err(AppError::Forbidden);
    }

    let offers = repo(&state).offers_made(user.id).await?;
    Ok(Json(offers.into_iter().map(OfferMadeView::from).collect()))
}

/// GET /user/{id}/offers-received
async fn offers_received(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(user_id): Path<i64>,
) -> AppResult<Json<Vec<OfferReceivedView>>> {
    if user.id != user_id {
        return Err(AppError::Forbidden);
    }

    let offers = repo(&state).offers_received(user.id).await?;
    Ok(Json(
        offers.into_iter().map(OfferReceivedView::from).collect(),
    ))
}

/// PUT /offers/{id}/accept — seller decision. The lookup is scoped by
/// (offer, seller) so a non-seller learns nothing about the offer.
async fn accept_offer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(offer_id): Path<i64>,
) -> AppResult<Json<OfferUpdate>> {
    let update = repo(&state).accept(offer_id, user.id).await?;
    tracing::info!(offer_id, seller_id = user.id, "Offer accepted");
    Ok(Json(update))
}

/// PUT /offers/{id}/decline — seller decision.
async fn decline_offer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(offer_id): Path<i64>,
) -> AppResult<Json<OfferUpdate>> {
    let update = repo(&state).decline(offer_id, user.id).await?;
    tracing::info!(offer_id, seller_id = user.id, "Offer declined");
    Ok(Json(update))
}

/// PUT /offers/{id}/complete-buyer — buyer's half of the mutual completion.
async fn complete_buyer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(offer_id): Path<i64>,
) -> AppResult<Json<OfferUpdate>> {
    let update = repo(&state)
        .mark_complete(offer_id, user.id, Party::Buyer)
        .await?;
    tracing::info!(offer_id, buyer_id = user.id, status = %update.status, "Buyer marked complete");
    Ok(Json(update))
}

/// PUT /offers/{id}/complete-seller — seller's half.
async fn complete_seller(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(offer_id): Path<i64>,
) -> AppResult<Json<OfferUpdate>> {
    let update = repo(&state)
        .mark_complete(offer_id, user.id, Party::Seller)
        .await?;
    tracing::info!(offer_id, seller_id = user.id, status = %update.status, "Seller marked complete");
    Ok(Json(update))
}

/// PUT /offers/{id}/cancel-accepted — either party backs out of an accepted
/// trade.
async fn cancel_accepted(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(offer_id): Path<i64>,
) -> AppResult<Json<OfferUpdate>> {
    let update = repo(&state).cancel_accepted(offer_id, user.id).await?;
    tracing::info!(offer_id, user_id = user.id, "Accepted offer cancelled");
    Ok(Json(update))
}

/// DELETE /offers/{id}/delete-pending — buyer withdraws before the seller
/// has decided; the offer row is removed entirely.
async fn delete_pending(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(offer_id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    repo(&state).withdraw_pending(offer_id, user.id).await?;
    tracing::info!(offer_id, buyer_id = user.id, "Pending offer withdrawn");
    Ok(Json(serde_json::json!({ "deleted": true })))
}
