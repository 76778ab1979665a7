//! BalanceManager - atomic credit/debit against the balance cache
//!
//! Every mutation runs on the caller's open connection so it joins the
//! enclosing unit of work and serializes behind the storage engine's write
//! lock. The balance row is created lazily at zero on a user's first
//! monetary operation and never deleted.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::domain::errors::{EngineError, ValidationError};
use crate::persistence::models::BalanceRecord;

pub struct BalanceManager;

impl BalanceManager {
    /// Read the current balance, creating the row at zero on first touch.
    pub async fn fetch_or_create(
        conn: &mut SqliteConnection,
        user_id: &str,
    ) -> Result<Decimal, EngineError> {
        sqlx::query(
            "INSERT INTO balances (user_id, balance, updated_at) VALUES (?1, '0', ?2) \
             ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        let record =
            sqlx::query_as::<_, BalanceRecord>("SELECT * FROM balances WHERE user_id = ?1")
                .bind(user_id)
                .fetch_one(&mut *conn)
                .await?;

        record.amount().map_err(EngineError::from)
    }

    /// Increase the balance by `amount` (> 0). Returns the new balance.
    pub async fn credit(
        conn: &mut SqliteConnection,
        user_id: &str,
        amount: Decimal,
    ) -> Result<Decimal, EngineError> {
        if amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidAmount.into());
        }

        let current = Self::fetch_or_create(&mut *conn, user_id).await?;
        let new_balance = current + amount;
        Self::store(&mut *conn, user_id, new_balance).await?;

        debug!("Credited {} to {}: balance {}", amount, user_id, new_balance);
        Ok(new_balance)
    }

    /// Decrease the balance by `amount` (> 0), failing with
    /// `InsufficientFunds` when the balance does not cover it. This check is
    /// the source of truth: it runs on the same connection as the write, so
    /// no concurrent debit can interleave between check and store.
    pub async fn debit(
        conn: &mut SqliteConnection,
        user_id: &str,
        amount: Decimal,
    ) -> Result<Decimal, EngineError> {
        if amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidAmount.into());
        }

        let current = Self::fetch_or_create(&mut *conn, user_id).await?;
        if current < amount {
            return Err(EngineError::InsufficientFunds);
        }

        let new_balance = current - amount;
        Self::store(&mut *conn, user_id, new_balance).await?;

        debug!("Debited {} from {}: balance {}", amount, user_id, new_balance);
        Ok(new_balance)
    }

    async fn store(
        conn: &mut SqliteConnection,
        user_id: &str,
        value: Decimal,
    ) -> Result<(), EngineError> {
        sqlx::query("UPDATE balances SET balance = ?1, updated_at = ?2 WHERE user_id = ?3")
            .bind(value.to_string())
            .bind(Utc::now())
            .bind(user_id)
            .execute(conn)
            .await?;
        Ok(())
    }
}
