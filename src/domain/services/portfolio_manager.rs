//! PortfolioManager - weighted-average position tracking
//!
//! Mutations run on the caller's open connection, inside the same unit of
//! work as the balance change and ledger append. A position row only exists
//! while quantity is positive: the first buy creates it, a sell that drains
//! it deletes it.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::domain::entities::portfolio::{Position, SellOutcome};
use crate::domain::errors::EngineError;
use crate::persistence::models::PositionRecord;

pub struct PortfolioManager;

impl PortfolioManager {
    /// Fetch a single position, if held.
    pub async fn position(
        conn: &mut SqliteConnection,
        user_id: &str,
        symbol: &str,
    ) -> Result<Option<Position>, EngineError> {
        let record = sqlx::query_as::<_, PositionRecord>(
            "SELECT * FROM positions WHERE user_id = ?1 AND symbol = ?2",
        )
        .bind(user_id)
        .bind(symbol)
        .fetch_optional(conn)
        .await?;

        record
            .map(PositionRecord::into_entity)
            .transpose()
            .map_err(EngineError::from)
    }

    /// All of a user's open positions, ordered by symbol.
    pub async fn positions(
        conn: &mut SqliteConnection,
        user_id: &str,
    ) -> Result<Vec<Position>, EngineError> {
        let records = sqlx::query_as::<_, PositionRecord>(
            "SELECT * FROM positions WHERE user_id = ?1 ORDER BY symbol ASC",
        )
        .bind(user_id)
        .fetch_all(conn)
        .await?;

        records
            .into_iter()
            .map(|r| r.into_entity().map_err(EngineError::from))
            .collect()
    }

    /// Apply a buy: create the position at the execution price, or fold the
    /// purchase into the existing weighted-average cost basis.
    pub async fn apply_buy(
        conn: &mut SqliteConnection,
        user_id: &str,
        symbol: &str,
        quantity: i64,
        price: Decimal,
    ) -> Result<Position, EngineError> {
        match Self::position(&mut *conn, user_id, symbol).await? {
            None => {
                let now = Utc::now();
                let record = sqlx::query_as::<_, PositionRecord>(
                    r#"
                    INSERT INTO positions (user_id, symbol, quantity, average_price, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                    RETURNING *
                    "#,
                )
                .bind(user_id)
                .bind(symbol)
                .bind(quantity)
                .bind(price.to_string())
                .bind(now)
                .fetch_one(&mut *conn)
                .await?;

                debug!("Opened position {} x{} for {}", symbol, quantity, user_id);
                record.into_entity().map_err(EngineError::from)
            }
            Some(mut position) => {
                position.apply_buy(quantity, price);
                Self::store(&mut *conn, &position).await?;

                debug!(
                    "Increased position {} to x{} (avg {}) for {}",
                    symbol, position.quantity, position.average_price, user_id
                );
                Ok(position)
            }
        }
    }

    /// Apply a sell: decrement the held quantity, deleting the row when it
    /// reaches zero. The average price is never recomputed here. This check
    /// runs on the transaction's own connection and is the source of truth
    /// for share coverage.
    pub async fn apply_sell(
        conn: &mut SqliteConnection,
        user_id: &str,
        symbol: &str,
        quantity: i64,
    ) -> Result<(Position, SellOutcome), EngineError> {
        let mut position = Self::position(&mut *conn, user_id, symbol)
            .await?
            .ok_or(EngineError::PositionNotFound)?;

        let outcome = position.apply_sell(quantity)?;

        match outcome {
            SellOutcome::Closed => {
                sqlx::query("DELETE FROM positions WHERE user_id = ?1 AND symbol = ?2")
                    .bind(user_id)
                    .bind(symbol)
                    .execute(&mut *conn)
                    .await?;
                debug!("Closed position {} for {}", symbol, user_id);
            }
            SellOutcome::Reduced(remaining) => {
                Self::store(&mut *conn, &position).await?;
                debug!(
                    "Reduced position {} to x{} for {}",
                    symbol, remaining, user_id
                );
            }
        }

        Ok((position, outcome))
    }

    async fn store(conn: &mut SqliteConnection, position: &Position) -> Result<(), EngineError> {
        sqlx::query(
            "UPDATE positions SET quantity = ?1, average_price = ?2, updated_at = ?3 \
             WHERE user_id = ?4 AND symbol = ?5",
        )
        .bind(position.quantity)
        .bind(position.average_price.to_string())
        .bind(Utc::now())
        .bind(&position.user_id)
        .bind(&position.symbol)
        .execute(conn)
        .await?;
        Ok(())
    }
}
