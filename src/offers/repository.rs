// Repository pattern - isolates all database side effects. Every mutation is
// a read-modify-write under one IMMEDIATE transaction so racing buyer/seller
// requests serialize on the offer row.
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde::Serialize;
use thiserror::Error;

use crate::offers::domain::{OfferState, OfferStatus, Party, TransitionError};
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum OfferError {
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// Joint lookup missed: either the offer does not exist or the actor
    /// holds the wrong role. Indistinguishable on purpose.
    #[error("Offer not found")]
    NotFound,

    #[error("Item not found")]
    ItemNotFound,

    #[error("Cannot offer on your own listing")]
    SelfOffer,

    /// The finalizing completion found the item already sold through
    /// another offer. At most one offer per item ever completes.
    #[error("Item is no longer available")]
    ItemUnavailable,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Corrupt offer state: {0}")]
    Corrupt(String),
}

impl From<OfferError> for crate::error::AppError {
    fn from(e: OfferError) -> Self {
        use crate::error::AppError;
        match e {
            // Joint-lookup misses collapse authorization into 404.
            OfferError::NotFound | OfferError::ItemNotFound => AppError::NotFound,
            OfferError::SelfOffer => AppError::Forbidden,
            OfferError::ItemUnavailable => {
                AppError::BadRequest("Item is no longer available".into())
            }
            OfferError::Transition(t) => AppError::BadRequest(t.to_string()),
            OfferError::Pool(e) => AppError::Pool(e),
            OfferError::Sql(e) => AppError::Database(e),
            OfferError::Corrupt(msg) => AppError::Internal(msg),
        }
    }
}

/// The post-mutation slice of the offer returned to callers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OfferUpdate {
    pub id: i64,
    pub status: OfferStatus,
    pub buyer_completed: bool,
    pub seller_completed: bool,
}

/// An offer row joined with its item and the counterpart user, as served to
/// the offers-made / offers-received views. `counterpart_contact` is only
/// populated while the offer is Accepted.
#[derive(Debug, Clone)]
pub struct EnrichedOffer {
    pub id: i64,
    pub item_id: i64,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub offer_amount: f64,
    pub status: OfferStatus,
    pub buyer_completed: bool,
    pub seller_completed: bool,
    pub created_at: String,
    pub item_title: String,
    pub item_price: f64,
    pub item_picture: Vec<u8>,
    pub counterpart_name: String,
    pub counterpart_picture_url: Option<String>,
    pub counterpart_contact: Option<String>,
}

/// All offer lifecycle operations. Lookups that double as authorization are
/// scoped by (offer id, role column) in one filtered query.
#[async_trait]
pub trait OfferRepository: Send + Sync {
    /// Create a Pending offer. The item's current owner is captured as
    /// seller_id; owners cannot offer on their own listings.
    async fn create(&self, item_id: i64, buyer_id: i64, amount: f64) -> Result<i64, OfferError>;

    /// Seller accepts a Pending offer.
    async fn accept(&self, offer_id: i64, seller_id: i64) -> Result<OfferUpdate, OfferError>;

    /// Seller declines a Pending offer.
    async fn decline(&self, offer_id: i64, seller_id: i64) -> Result<OfferUpdate, OfferError>;

    /// Buyer withdraws a Pending offer; the row is deleted, not marked.
    async fn withdraw_pending(&self, offer_id: i64, buyer_id: i64) -> Result<(), OfferError>;

    /// One side of an Accepted trade records completion. When both sides
    /// have confirmed, the offer completes, the item is withdrawn from
    /// sale, and every other Pending offer on the item is declined — all in
    /// the same transaction.
    async fn mark_complete(
        &self,
        offer_id: i64,
        actor_id: i64,
        party: Party,
    ) -> Result<OfferUpdate, OfferError>;

    /// Either party cancels an Accepted trade.
    async fn cancel_accepted(&self, offer_id: i64, actor_id: i64)
        -> Result<OfferUpdate, OfferError>;

    /// Offers the user has made, enriched with item and seller context.
    async fn offers_made(&self, buyer_id: i64) -> Result<Vec<EnrichedOffer>, OfferError>;

    /// Offers the user has received on their listings, enriched with item
    /// and buyer context.
    async fn offers_received(&self, seller_id: i64) -> Result<Vec<EnrichedOffer>, OfferError>;
}

/// SQLite implementation
pub struct SqliteOfferRepository {
    pool: DbPool,
}

impl SqliteOfferRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn with_tx<T>(
    conn: &Connection,
    f: impl FnOnce() -> Result<T, OfferError>,
) -> Result<T, OfferError> {
    conn.execute("BEGIN IMMEDIATE", [])?;
    match f() {
        Ok(value) => {
            conn.execute("COMMIT", [])?;
            Ok(value)
        }
        Err(e) => {
            let _ = conn.execute("ROLLBACK", []);
            Err(e)
        }
    }
}

/// Joint lookup by id + role column. Returns the state machine slice plus
/// the item id (needed by the completion side effects).
fn load_offer(
    conn: &Connection,
    offer_id: i64,
    actor_id: i64,
    role: &str,
) -> Result<(OfferState, i64), OfferError> {
    let sql = match role {
        "buyer" => {
            "SELECT status, buyer_completed, seller_completed, item_id
             FROM item_offers WHERE id = ?1 AND buyer_id = ?2"
        }
        "seller" => {
            "SELECT status, buyer_completed, seller_completed, item_id
             FROM item_offers WHERE id = ?1 AND seller_id = ?2"
        }
        _ => {
            "SELECT status, buyer_completed, seller_completed, item_id
             FROM item_offers WHERE id = ?1 AND (buyer_id = ?2 OR seller_id = ?2)"
        }
    };

    let row: Result<(String, bool, bool, i64), rusqlite::Error> =
        conn.query_row(sql, params![offer_id, actor_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        });

    match row {
        Ok((status, buyer_completed, seller_completed, item_id)) => {
            let status = status.parse::<OfferStatus>().map_err(OfferError::Corrupt)?;
            Ok((
                OfferState {
                    status,
                    buyer_completed,
                    seller_completed,
                },
                item_id,
            ))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(OfferError::NotFound),
        Err(e) => Err(e.into()),
    }
}

fn save_offer(conn: &Connection, offer_id: i64, state: OfferState) -> Result<(), OfferError> {
    conn.execute(
        "UPDATE item_offers SET status = ?1, buyer_completed = ?2, seller_completed = ?3
         WHERE id = ?4",
        params![
            state.status.as_str(),
            state.buyer_completed,
            state.seller_completed,
            offer_id
        ],
    )?;
    Ok(())
}

fn update_of(offer_id: i64, state: OfferState) -> OfferUpdate {
    OfferUpdate {
        id: offer_id,
        status: state.status,
        buyer_completed: state.buyer_completed,
        seller_completed: state.seller_completed,
    }
}

fn query_enriched(
    conn: &Connection,
    sql: &str,
    actor_id: i64,
) -> Result<Vec<EnrichedOffer>, OfferError> {
    let mut stmt = conn.prepare(sql)?;
    let rows: Vec<EnrichedOffer> = stmt
        .query_map(params![actor_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, bool>(6)?,
                row.get::<_, bool>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, f64>(10)?,
                row.get::<_, Vec<u8>>(11)?,
                row.get::<_, String>(12)?,
                row.get::<_, Option<String>>(13)?,
                row.get::<_, String>(14)?,
            ))
        })?
        .filter_map(|r| r.ok())
        .filter_map(
            |(
                id,
                item_id,
                buyer_id,
                seller_id,
                offer_amount,
                status,
                buyer_completed,
                seller_completed,
                created_at,
                item_title,
                item_price,
                item_picture,
                counterpart_name,
                counterpart_picture_url,
                counterpart_email,
            )| {
                let status = status.parse::<OfferStatus>().ok()?;
                // Contact info is withheld until the negotiation is locked in.
                let counterpart_contact = if status == OfferStatus::Accepted {
                    Some(counterpart_email)
                } else {
                    None
                };
                Some(EnrichedOffer {
                    id,
                    item_id,
                    buyer_id,
                    seller_id,
                    offer_amount,
                    status,
                    buyer_completed,
                    seller_completed,
                    created_at,
                    item_title,
                    item_price,
                    item_picture,
                    counterpart_name,
                    counterpart_picture_url,
                    counterpart_contact,
                })
            },
        )
        .collect();
    Ok(rows)
}

#[async_trait]
impl OfferRepository for SqliteOfferRepository {
    async fn create(&self, item_id: i64, buyer_id: i64, amount: f64) -> Result<i64, OfferError> {
        let conn = self.pool.get()?;

        with_tx(&conn, || {
            let owner: i64 = conn
                .query_row(
                    "SELECT user_id FROM item_listings WHERE id = ?1",
                    params![item_id],
                    |row| row.get(0),
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => OfferError::ItemNotFound,
                    other => other.into(),
                })?;

            if owner == buyer_id {
                return Err(OfferError::SelfOffer);
            }

            // seller_id is a snapshot of the owner at creation time.
            conn.execute(
                "INSERT INTO item_offers (item_id, buyer_id, seller_id, offer_amount, status)
                 VALUES (?1, ?2, ?3, ?4, 'Pending')",
                params![item_id, buyer_id, owner, amount],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    async fn accept(&self, offer_id: i64, seller_id: i64) -> Result<OfferUpdate, OfferError> {
        let conn = self.pool.get()?;

        with_tx(&conn, || {
            let (state, _) = load_offer(&conn, offer_id, seller_id, "seller")?;
            let next = state.accept()?;
            save_offer(&conn, offer_id, next)?;
            Ok(update_of(offer_id, next))
        })
    }

    async fn decline(&self, offer_id: i64, seller_id: i64) -> Result<OfferUpdate, OfferError> {
        let conn = self.pool.get()?;

        with_tx(&conn, || {
            let (state, _) = load_offer(&conn, offer_id, seller_id, "seller")?;
            let next = state.decline()?;
            save_offer(&conn, offer_id, next)?;
            Ok(update_of(offer_id, next))
        })
    }

    async fn withdraw_pending(&self, offer_id: i64, buyer_id: i64) -> Result<(), OfferError> {
        let conn = self.pool.get()?;

        with_tx(&conn, || {
            let (state, _) = load_offer(&conn, offer_id, buyer_id, "buyer")?;
            state.check_withdraw()?;
            conn.execute("DELETE FROM item_offers WHERE id = ?1", params![offer_id])?;
            Ok(())
        })
    }

    async fn mark_complete(
        &self,
        offer_id: i64,
        actor_id: i64,
        party: Party,
    ) -> Result<OfferUpdate, OfferError> {
        let conn = self.pool.get()?;
        let role = match party {
            Party::Buyer => "buyer",
            Party::Seller => "seller",
        };

        with_tx(&conn, || {
            let (state, item_id) = load_offer(&conn, offer_id, actor_id, role)?;
            let (next, finalized) = state.mark_complete(party)?;
            save_offer(&conn, offer_id, next)?;

            if finalized {
                // Guarded withdraw: if another offer already sold the item,
                // this trade cannot be the one that completes it.
                let withdrawn = conn.execute(
                    "UPDATE item_listings SET is_available = 0
                     WHERE id = ?1 AND is_available = 1",
                    params![item_id],
                )?;
                if withdrawn == 0 {
                    return Err(OfferError::ItemUnavailable);
                }
                // Single-buyer semantics: the item is sold, so every other
                // still-pending offer on it is declined. The completing
                // offer is excluded by id.
                conn.execute(
                    "UPDATE item_offers SET status = 'Declined'
                     WHERE item_id = ?1 AND status = 'Pending' AND id != ?2",
                    params![item_id, offer_id],
                )?;
            }

            Ok(update_of(offer_id, next))
        })
    }

    async fn cancel_accepted(
        &self,
        offer_id: i64,
        actor_id: i64,
    ) -> Result<OfferUpdate, OfferError> {
        let conn = self.pool.get()?;

        with_tx(&conn, || {
            let (state, _) = load_offer(&conn, offer_id, actor_id, "either")?;
            let next = state.cancel_accepted()?;
            save_offer(&conn, offer_id, next)?;
            Ok(update_of(offer_id, next))
        })
    }

    async fn offers_made(&self, buyer_id: i64) -> Result<Vec<EnrichedOffer>, OfferError> {
        let conn = self.pool.get()?;
        query_enriched(
            &conn,
            "SELECT o.id, o.item_id, o.buyer_id, o.seller_id, o.offer_amount, o.status,
                    o.buyer_completed, o.seller_completed, o.created_at,
                    i.title, i.price, i.picture_data,
                    u.name, u.profile_picture_url, u.email
             FROM item_offers o
             JOIN item_listings i ON i.id = o.item_id
             JOIN users u ON u.id = o.seller_id
             WHERE o.buyer_id = ?1
             ORDER BY o.created_at DESC, o.id DESC",
            buyer_id,
        )
    }

    async fn offers_received(&self, seller_id: i64) -> Result<Vec<EnrichedOffer>, OfferError> {
        let conn = self.pool.get()?;
        query_enriched(
            &conn,
            "SELECT o.id, o.item_id, o.buyer_id, o.seller_id, o.offer_amount, o.status,
                    o.buyer_completed, o.seller_completed, o.created_at,
                    i.title, i.price, i.picture_data,
                    u.name, u.profile_picture_url, u.email
             FROM item_offers o
             JOIN item_listings i ON i.id = o.item_id
             JOIN users u ON u.id = o.buyer_id
             WHERE o.seller_id = ?1
             ORDER BY o.created_at DESC, o.id DESC",
            seller_id,
        )
    }
}
