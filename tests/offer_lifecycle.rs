//! Offer negotiation lifecycle tests against a real (temporary) database.
//!
//! Covers the transition table end to end: acceptance/decline, mutual
//! completion in both orders, the auto-decline of competing pending offers,
//! cancellation paths, and the joint-lookup authorization behavior.

use rusqlite::params;
use tempfile::TempDir;

use thriftswap::db;
use thriftswap::offers::domain::{OfferStatus, Party, TransitionError};
use thriftswap::offers::repository::{OfferError, OfferRepository, SqliteOfferRepository};
use thriftswap::state::DbPool;

const SELLER: i64 = 1;
const BUYER: i64 = 2;
const OTHER_BUYER: i64 = 3;
const ITEM: i64 = 1;

fn setup() -> (SqliteOfferRepository, DbPool, TempDir) {
    let tmp = TempDir::new().unwrap();
    let pool = db::create_pool(&tmp.path().join("test.db")).expect("Failed to create test db");
    db::run_migrations(&pool).expect("Failed to run migrations");

    let conn = pool.get().unwrap();
    conn.execute_batch(
        "INSERT INTO users (name, email) VALUES ('seller', 'seller@example.edu');
         INSERT INTO users (name, email) VALUES ('buyer', 'buyer@example.edu');
         INSERT INTO users (name, email) VALUES ('other', 'other@example.edu');
         INSERT INTO item_listings
           (user_id, title, description, price, color, size, gender, condition, category, picture_data)
         VALUES (1, 'Denim Jacket', 'Rugged', 50.0, 'Blue', 'M', 'Unisex', 'Good', 'Jackets', x'ff');",
    )
    .unwrap();
    drop(conn);

    (SqliteOfferRepository::new(pool.clone()), pool, tmp)
}

fn raw_status(pool: &DbPool, offer_id: i64) -> String {
    let conn = pool.get().unwrap();
    conn.query_row(
        "SELECT status FROM item_offers WHERE id = ?1",
        params![offer_id],
        |r| r.get(0),
    )
    .unwrap()
}

fn raw_flags(pool: &DbPool, offer_id: i64) -> (bool, bool) {
    let conn = pool.get().unwrap();
    conn.query_row(
        "SELECT buyer_completed, seller_completed FROM item_offers WHERE id = ?1",
        params![offer_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .unwrap()
}

fn item_available(pool: &DbPool, item_id: i64) -> bool {
    let conn = pool.get().unwrap();
    conn.query_row(
        "SELECT is_available FROM item_listings WHERE id = ?1",
        params![item_id],
        |r| r.get(0),
    )
    .unwrap()
}

#[tokio::test]
async fn full_negotiation_scenario() {
    // User A owns listing L (price 50). User B offers 40. A accepts. Both
    // mark complete. A competing pending offer from C is auto-declined.
    let (repo, pool, _tmp) = setup();

    let offer = repo.create(ITEM, BUYER, 40.0).await.unwrap();
    let competing = repo.create(ITEM, OTHER_BUYER, 30.0).await.unwrap();
    assert_eq!(raw_status(&pool, offer), "Pending");
    assert_eq!(raw_status(&pool, competing), "Pending");

    let update = repo.accept(offer, SELLER).await.unwrap();
    assert_eq!(update.status, OfferStatus::Accepted);

    // Buyer confirms first: the trade must not finalize yet.
    let update = repo.mark_complete(offer, BUYER, Party::Buyer).await.unwrap();
    assert_eq!(update.status, OfferStatus::Accepted);
    assert!(update.buyer_completed);
    assert!(!update.seller_completed);
    assert!(item_available(&pool, ITEM));

    // Seller confirms second: now the trade completes and the listing is
    // withdrawn from sale.
    let update = repo
        .mark_complete(offer, SELLER, Party::Seller)
        .await
        .unwrap();
    assert_eq!(update.status, OfferStatus::Completed);
    assert!(!item_available(&pool, ITEM));

    // The competing pending offer was declined in the same stroke.
    assert_eq!(raw_status(&pool, competing), "Declined");
    // The completing offer itself was not touched by the bulk decline.
    assert_eq!(raw_status(&pool, offer), "Completed");
}

#[tokio::test]
async fn completion_works_in_either_order() {
    let (repo, pool, _tmp) = setup();

    let offer = repo.create(ITEM, BUYER, 45.0).await.unwrap();
    repo.accept(offer, SELLER).await.unwrap();

    let update = repo
        .mark_complete(offer, SELLER, Party::Seller)
        .await
        .unwrap();
    assert_eq!(update.status, OfferStatus::Accepted);
    assert!(item_available(&pool, ITEM));

    let update = repo.mark_complete(offer, BUYER, Party::Buyer).await.unwrap();
    assert_eq!(update.status, OfferStatus::Completed);
    assert!(!item_available(&pool, ITEM));
}

#[tokio::test]
async fn marking_the_same_side_twice_is_rejected() {
    let (repo, pool, _tmp) = setup();

    let offer = repo.create(ITEM, BUYER, 45.0).await.unwrap();
    repo.accept(offer, SELLER).await.unwrap();
    repo.mark_complete(offer, BUYER, Party::Buyer).await.unwrap();

    let result = repo.mark_complete(offer, BUYER, Party::Buyer).await;
    assert!(matches!(
        result,
        Err(OfferError::Transition(TransitionError::AlreadyCompleted))
    ));

    // The rejection must not have mutated anything.
    assert_eq!(raw_status(&pool, offer), "Accepted");
    assert_eq!(raw_flags(&pool, offer), (true, false));
    assert!(item_available(&pool, ITEM));
}

#[tokio::test]
async fn completion_marks_require_accepted_status() {
    let (repo, pool, _tmp) = setup();

    let offer = repo.create(ITEM, BUYER, 45.0).await.unwrap();

    let result = repo.mark_complete(offer, BUYER, Party::Buyer).await;
    assert!(matches!(
        result,
        Err(OfferError::Transition(TransitionError::NotAccepted))
    ));
    assert_eq!(raw_status(&pool, offer), "Pending");
}

#[tokio::test]
async fn cancel_accepted_resets_flags_and_is_terminal() {
    let (repo, pool, _tmp) = setup();

    let offer = repo.create(ITEM, BUYER, 45.0).await.unwrap();
    repo.accept(offer, SELLER).await.unwrap();
    repo.mark_complete(offer, BUYER, Party::Buyer).await.unwrap();

    let update = repo.cancel_accepted(offer, BUYER).await.unwrap();
    assert_eq!(update.status, OfferStatus::Cancelled);
    assert_eq!(raw_flags(&pool, offer), (false, false));

    // Terminal: nothing else is accepted from here.
    assert!(repo.accept(offer, SELLER).await.is_err());
    assert!(repo.decline(offer, SELLER).await.is_err());
    assert!(repo
        .mark_complete(offer, SELLER, Party::Seller)
        .await
        .is_err());
    assert!(repo.cancel_accepted(offer, SELLER).await.is_err());
    assert_eq!(raw_status(&pool, offer), "Cancelled");
}

#[tokio::test]
async fn declined_offer_is_terminal() {
    let (repo, pool, _tmp) = setup();

    let offer = repo.create(ITEM, BUYER, 45.0).await.unwrap();
    let update = repo.decline(offer, SELLER).await.unwrap();
    assert_eq!(update.status, OfferStatus::Declined);

    assert!(repo.accept(offer, SELLER).await.is_err());
    assert!(repo
        .mark_complete(offer, BUYER, Party::Buyer)
        .await
        .is_err());
    assert!(repo.withdraw_pending(offer, BUYER).await.is_err());
    assert_eq!(raw_status(&pool, offer), "Declined");
}

#[tokio::test]
async fn self_offer_rejected_regardless_of_amount() {
    let (repo, _pool, _tmp) = setup();

    for amount in [0.0, 50.0, 1_000_000.0] {
        let result = repo.create(ITEM, SELLER, amount).await;
        assert!(matches!(result, Err(OfferError::SelfOffer)));
    }
}

#[tokio::test]
async fn seller_id_snapshots_the_item_owner() {
    let (repo, _pool, _tmp) = setup();

    let offer = repo.create(ITEM, BUYER, 40.0).await.unwrap();
    let made = repo.offers_made(BUYER).await.unwrap();
    assert_eq!(made[0].id, offer);
    assert_eq!(made[0].seller_id, SELLER);
    assert_eq!(made[0].buyer_id, BUYER);
}

#[tokio::test]
async fn joint_lookup_hides_offers_from_wrong_roles() {
    let (repo, pool, _tmp) = setup();

    let offer = repo.create(ITEM, BUYER, 40.0).await.unwrap();

    // The buyer cannot act as seller, a third party cannot act at all, and
    // every miss reads identically to a nonexistent offer.
    assert!(matches!(
        repo.accept(offer, BUYER).await,
        Err(OfferError::NotFound)
    ));
    assert!(matches!(
        repo.decline(offer, OTHER_BUYER).await,
        Err(OfferError::NotFound)
    ));
    assert!(matches!(
        repo.withdraw_pending(offer, SELLER).await,
        Err(OfferError::NotFound)
    ));
    assert!(matches!(
        repo.accept(9999, SELLER).await,
        Err(OfferError::NotFound)
    ));

    assert_eq!(raw_status(&pool, offer), "Pending");
}

#[tokio::test]
async fn withdraw_deletes_the_row_entirely() {
    let (repo, pool, _tmp) = setup();

    let offer = repo.create(ITEM, BUYER, 40.0).await.unwrap();
    repo.withdraw_pending(offer, BUYER).await.unwrap();

    let conn = pool.get().unwrap();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM item_offers WHERE id = ?1",
            params![offer],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn enrichment_withholds_contact_until_accepted() {
    let (repo, _pool, _tmp) = setup();

    let offer = repo.create(ITEM, BUYER, 40.0).await.unwrap();

    let made = repo.offers_made(BUYER).await.unwrap();
    assert_eq!(made[0].counterpart_name, "seller");
    assert!(made[0].counterpart_contact.is_none());

    let received = repo.offers_received(SELLER).await.unwrap();
    assert_eq!(received[0].counterpart_name, "buyer");
    assert!(received[0].counterpart_contact.is_none());

    repo.accept(offer, SELLER).await.unwrap();

    let made = repo.offers_made(BUYER).await.unwrap();
    assert_eq!(
        made[0].counterpart_contact.as_deref(),
        Some("seller@example.edu")
    );
    let received = repo.offers_received(SELLER).await.unwrap();
    assert_eq!(
        received[0].counterpart_contact.as_deref(),
        Some("buyer@example.edu")
    );
}

#[tokio::test]
async fn completed_item_disappears_from_the_browse_set() {
    let (repo, pool, _tmp) = setup();

    let offer = repo.create(ITEM, BUYER, 40.0).await.unwrap();
    repo.accept(offer, SELLER).await.unwrap();
    repo.mark_complete(offer, BUYER, Party::Buyer).await.unwrap();
    repo.mark_complete(offer, SELLER, Party::Seller)
        .await
        .unwrap();

    let conn = pool.get().unwrap();
    let visible: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM item_listings WHERE is_available = 1",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(visible, 0);
}

#[tokio::test]
async fn only_one_offer_per_item_ever_completes() {
    let (repo, pool, _tmp) = setup();

    let first = repo.create(ITEM, BUYER, 40.0).await.unwrap();
    let second = repo.create(ITEM, OTHER_BUYER, 48.0).await.unwrap();

    // Seller accepts both (nothing forbids parallel accepted negotiations).
    repo.accept(first, SELLER).await.unwrap();
    repo.accept(second, SELLER).await.unwrap();

    // First trade completes.
    repo.mark_complete(first, BUYER, Party::Buyer).await.unwrap();
    repo.mark_complete(first, SELLER, Party::Seller)
        .await
        .unwrap();

    // The second accepted offer survives as Accepted (it was not Pending),
    // but the item is sold: its finalizing completion must fail, and the
    // failed transaction must leave no partial writes behind.
    assert_eq!(raw_status(&pool, second), "Accepted");
    repo.mark_complete(second, OTHER_BUYER, Party::Buyer)
        .await
        .unwrap();
    let result = repo.mark_complete(second, SELLER, Party::Seller).await;
    assert!(matches!(result, Err(OfferError::ItemUnavailable)));
    assert_eq!(raw_status(&pool, second), "Accepted");
    assert_eq!(raw_flags(&pool, second), (true, false));

    let conn = pool.get().unwrap();
    let completed: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM item_offers WHERE status = 'Completed'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(completed, 1);
    assert!(!item_available(&pool, ITEM));
}
