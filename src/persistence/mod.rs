//! Persistence Layer
//!
//! SQLite-backed durable store for the ledger and its caches, with async
//! access via sqlx.
//!
//! # Database Schema
//!
//! ## Accounts Table
//! The minimal principal surface the engines consult: status, kind,
//! referral code and the one-time referral-usage flag.
//!
//! ## Balances Table
//! One row per user, created lazily on the first monetary operation.
//! Mutated only through the balance manager inside a transaction.
//!
//! ## Positions Table
//! One row per (user, symbol), removed when quantity reaches zero.
//!
//! ## Transactions Table
//! Append-only ledger. Database triggers reject every UPDATE and DELETE,
//! so the audit trail cannot be rewritten even by buggy application code.
//!
//! ## Referral Bonuses Table
//! One row per successful referral; the UNIQUE constraint on `referee_id`
//! enforces at-most-one bonus per referee at the storage level.
//!
//! ## Stocks Table
//! Reference cache of traded instruments and their last-seen price.
//!
//! Monetary values are stored as TEXT and parsed into `rust_decimal`
//! values at the record boundary; sqlx's sqlite driver has no decimal
//! codec and REAL columns would reintroduce float drift.

pub mod models;
pub mod repository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database access error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    /// The storage engine could not take the write lock; the whole
    /// operation should be retried by the caller.
    #[error("Database busy: {0}")]
    Busy(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = e {
            let msg = db.message().to_string();
            if msg.contains("database is locked") || msg.contains("database table is locked") {
                return DatabaseError::Busy(msg);
            }
        }
        DatabaseError::ConnectionError(e.to_string())
    }
}

/// Initialize the database connection pool and run migrations.
///
/// # Arguments
/// - `database_url`: Path to SQLite database file (e.g., "sqlite://data/bolsa.db")
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", database_url);

    // Ensure data directory exists
    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(DatabaseError::from)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5))
        .log_statements(tracing::log::LevelFilter::Debug);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(DatabaseError::from)?;

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");

    Ok(pool)
}

/// Run database migrations
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL DEFAULT 'standard' CHECK(kind IN ('standard', 'admin', 'vip')),
            status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending', 'active', 'suspended')),
            referral_code TEXT UNIQUE,
            has_used_referral BOOLEAN NOT NULL DEFAULT 0,
            activation_notified BOOLEAN NOT NULL DEFAULT 0,
            api_token TEXT UNIQUE,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create accounts table: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS balances (
            user_id TEXT PRIMARY KEY,
            balance TEXT NOT NULL DEFAULT '0',
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create balances table: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS positions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK(quantity >= 0),
            average_price TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            UNIQUE(user_id, symbol)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create positions table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            tx_type TEXT NOT NULL CHECK(tx_type IN ('BUY', 'SELL', 'DEPOSIT', 'WITHDRAWAL', 'REFERRAL')),
            symbol TEXT,
            quantity INTEGER NOT NULL DEFAULT 0,
            price TEXT NOT NULL DEFAULT '0',
            amount TEXT NOT NULL,
            fee TEXT NOT NULL DEFAULT '0',
            reference TEXT,
            source_ip TEXT,
            created_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create transactions table: {}", e))
    })?;

    // The ledger is append-only: reject rewrites at the storage level too.
    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS transactions_no_update
        BEFORE UPDATE ON transactions
        BEGIN
            SELECT RAISE(ABORT, 'transactions are append-only');
        END
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create trigger: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS transactions_no_delete
        BEFORE DELETE ON transactions
        BEGIN
            SELECT RAISE(ABORT, 'transactions are append-only');
        END
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create trigger: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS referral_bonuses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            referrer_id TEXT NOT NULL,
            referee_id TEXT NOT NULL UNIQUE,
            referrer_bonus TEXT NOT NULL,
            referee_bonus TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('pending', 'completed', 'failed')),
            referrer_transaction_id TEXT,
            referee_transaction_id TEXT,
            created_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create referral_bonuses table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stocks (
            symbol TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            currency TEXT NOT NULL DEFAULT 'USD',
            exchange TEXT NOT NULL DEFAULT 'NASDAQ',
            sector TEXT,
            market_cap INTEGER,
            current_price TEXT NOT NULL DEFAULT '0',
            is_active BOOLEAN NOT NULL DEFAULT 1,
            last_updated DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create stocks table: {}", e)))?;

    // Indexes for the common query paths
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_created_at ON transactions(created_at)",
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_positions_user ON positions(user_id)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_referrals_referrer ON referral_bonuses(referrer_id)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    info!("✓ Database migrations completed successfully");

    Ok(())
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/bolsa.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/bolsa.db".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data/bolsa.db".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Self {
            url,
            max_connections,
        }
    }
}
