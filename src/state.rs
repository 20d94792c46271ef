use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::google::GoogleVerifier;
use crate::auth::token::TokenKeys;
use crate::config::Config;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub keys: TokenKeys,
    pub google: GoogleVerifier,
}
