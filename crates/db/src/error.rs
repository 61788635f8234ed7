//! Database error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("rating cooldown active for this URL and user")]
    Cooldown,

    #[error("Invalid data: {0}")]
    InvalidData(String),
}
