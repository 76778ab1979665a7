//! Database Repository
//!
//! Data access layer for accounts, stocks, the transaction ledger and
//! referral bonuses. Read paths go through the pool; mutations that must be
//! part of an atomic unit of work are associated functions taking the
//! caller's open connection, so the engine controls the transaction
//! boundary.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tracing::{debug, error};
use uuid::Uuid;

use super::models::*;
use super::{DatabaseError, DbPool};
use crate::domain::entities::account::{Account, AccountStatus};
use crate::domain::entities::referral::{BonusStatus, ReferralBonus};
use crate::domain::entities::stock::Stock;
use crate::domain::entities::transaction::{NewTransaction, Transaction};
use crate::domain::repositories::quote_provider::StockProfile;

/// Account repository
pub struct AccountRepository {
    pool: DbPool,
}

impl AccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a new account with a freshly generated referral code.
    pub async fn create(&self, account: NewAccount) -> Result<Account, DatabaseError> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let referral_code = generate_referral_code();

        let record = sqlx::query_as::<_, AccountRecord>(
            r#"
            INSERT INTO accounts (
                id, username, email, kind, status, referral_code,
                has_used_referral, activation_notified, api_token, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, 'pending', ?5, 0, 0, ?6, ?7, ?7)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&account.username)
        .bind(&account.email)
        .bind(account.kind.as_str())
        .bind(&referral_code)
        .bind(&account.api_token)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create account: {}", e);
            DatabaseError::QueryError(format!("Failed to create account: {}", e))
        })?;

        debug!("Created account: {} ({})", record.username, record.id);
        record.into_entity()
    }

    /// Get account by ID
    pub async fn get(&self, id: &str) -> Result<Option<Account>, DatabaseError> {
        let record = sqlx::query_as::<_, AccountRecord>("SELECT * FROM accounts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)?;

        record.map(AccountRecord::into_entity).transpose()
    }

    /// Look up the principal behind an API token.
    pub async fn get_by_token(&self, token: &str) -> Result<Option<Account>, DatabaseError> {
        let record =
            sqlx::query_as::<_, AccountRecord>("SELECT * FROM accounts WHERE api_token = ?1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from)?;

        record.map(AccountRecord::into_entity).transpose()
    }

    /// Find the active owner of a referral code.
    pub async fn get_active_by_referral_code(
        &self,
        code: &str,
    ) -> Result<Option<Account>, DatabaseError> {
        let record = sqlx::query_as::<_, AccountRecord>(
            "SELECT * FROM accounts WHERE referral_code = ?1 AND status = 'active'",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        record.map(AccountRecord::into_entity).transpose()
    }

    /// Persist a status change decided by the admin use case.
    pub async fn update_status(
        &self,
        id: &str,
        status: AccountStatus,
        mark_activation_notified: bool,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now();
        let rows_affected = sqlx::query(
            r#"
            UPDATE accounts
            SET status = ?1,
                activation_notified = CASE WHEN ?2 THEN 1 ELSE activation_notified END,
                updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(status.as_str())
        .bind(mark_activation_notified)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?
        .rows_affected();

        if rows_affected == 0 {
            return Err(DatabaseError::QueryError(format!("Account not found: {}", id)));
        }

        debug!("Updated account {} status to {}", id, status.as_str());
        Ok(())
    }

    /// Flip the one-time referral flag inside the caller's transaction.
    ///
    /// Guarded: returns false when the flag was already set, which callers
    /// must treat as a lost race and roll back.
    pub async fn mark_referral_used(
        conn: &mut SqliteConnection,
        referee_id: &str,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now();
        let rows_affected = sqlx::query(
            "UPDATE accounts SET has_used_referral = 1, updated_at = ?1 \
             WHERE id = ?2 AND has_used_referral = 0",
        )
        .bind(now)
        .bind(referee_id)
        .execute(conn)
        .await
        .map_err(DatabaseError::from)?
        .rows_affected();

        Ok(rows_affected == 1)
    }
}

/// Generate an 8-character referral code (uppercase letters and digits).
fn generate_referral_code() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Stock reference repository
pub struct StockRepository {
    pool: DbPool,
}

impl StockRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get stock by symbol
    pub async fn get(&self, symbol: &str) -> Result<Option<Stock>, DatabaseError> {
        let record = sqlx::query_as::<_, StockRecord>("SELECT * FROM stocks WHERE symbol = ?1")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)?;

        record.map(StockRecord::into_entity).transpose()
    }

    /// Upsert the reference row for a traded symbol inside the caller's
    /// transaction: insert with profile metadata on first sight, refresh the
    /// cached price on every subsequent trade.
    pub async fn upsert_traded(
        conn: &mut SqliteConnection,
        symbol: &str,
        price: Decimal,
        profile: Option<&StockProfile>,
    ) -> Result<Stock, DatabaseError> {
        let now = Utc::now();
        let name = profile
            .map(|p| p.name.clone())
            .unwrap_or_else(|| Stock::default_name(symbol));
        let exchange = profile
            .map(|p| p.exchange.clone())
            .unwrap_or_else(|| "NASDAQ".to_string());
        let currency = profile
            .map(|p| p.currency.clone())
            .unwrap_or_else(|| "USD".to_string());
        let sector = profile.and_then(|p| p.sector.clone());
        let market_cap = profile.and_then(|p| p.market_cap);

        let record = sqlx::query_as::<_, StockRecord>(
            r#"
            INSERT INTO stocks (symbol, name, currency, exchange, sector, market_cap,
                                current_price, is_active, last_updated)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)
            ON CONFLICT(symbol) DO UPDATE SET
                current_price = excluded.current_price,
                last_updated = excluded.last_updated
            RETURNING *
            "#,
        )
        .bind(symbol)
        .bind(&name)
        .bind(&currency)
        .bind(&exchange)
        .bind(&sector)
        .bind(market_cap)
        .bind(price.to_string())
        .bind(now)
        .fetch_one(conn)
        .await
        .map_err(|e| {
            error!("Failed to upsert stock {}: {}", symbol, e);
            DatabaseError::QueryError(format!("Failed to upsert stock: {}", e))
        })?;

        record.into_entity()
    }
}

/// Transaction ledger repository. Entries are append-only; there is no
/// update or delete path, by policy and by database trigger.
pub struct TransactionRepository {
    pool: DbPool,
}

impl TransactionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append a ledger entry inside the caller's transaction.
    pub async fn append(
        conn: &mut SqliteConnection,
        entry: NewTransaction,
    ) -> Result<Transaction, DatabaseError> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let record = sqlx::query_as::<_, TransactionRecord>(
            r#"
            INSERT INTO transactions (
                id, user_id, tx_type, symbol, quantity, price,
                amount, fee, reference, source_ip, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&entry.user_id)
        .bind(entry.tx_type.as_str())
        .bind(&entry.symbol)
        .bind(entry.quantity)
        .bind(entry.price.to_string())
        .bind(entry.amount.to_string())
        .bind(entry.fee.to_string())
        .bind(&entry.reference)
        .bind(&entry.source_ip)
        .bind(now)
        .fetch_one(conn)
        .await
        .map_err(|e| {
            error!("Failed to append transaction: {}", e);
            DatabaseError::QueryError(format!("Failed to append transaction: {}", e))
        })?;

        debug!(
            "Appended {} transaction {} for {}",
            record.tx_type, record.id, record.user_id
        );
        record.into_entity()
    }

    /// A user's transaction history, newest first.
    pub async fn history(&self, user_id: &str) -> Result<Vec<Transaction>, DatabaseError> {
        let records = sqlx::query_as::<_, TransactionRecord>(
            "SELECT * FROM transactions WHERE user_id = ?1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        records
            .into_iter()
            .map(TransactionRecord::into_entity)
            .collect()
    }

    /// A user's transactions in an optional date range, oldest first, as
    /// consumed by the report aggregator.
    pub async fn in_range(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        let records = sqlx::query_as::<_, TransactionRecord>(
            r#"
            SELECT * FROM transactions
            WHERE user_id = ?1
              AND (?2 IS NULL OR created_at >= ?2)
              AND (?3 IS NULL OR created_at <= ?3)
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        records
            .into_iter()
            .map(TransactionRecord::into_entity)
            .collect()
    }
}

/// Referral bonus repository
pub struct ReferralRepository {
    pool: DbPool,
}

impl ReferralRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Record a completed referral inside the caller's transaction. The
    /// UNIQUE constraint on `referee_id` makes a second bonus for the same
    /// referee a hard storage error.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_completed(
        conn: &mut SqliteConnection,
        referrer_id: &str,
        referee_id: &str,
        referrer_bonus: Decimal,
        referee_bonus: Decimal,
        referrer_transaction_id: &str,
        referee_transaction_id: &str,
    ) -> Result<ReferralBonus, DatabaseError> {
        let now = Utc::now();

        let record = sqlx::query_as::<_, ReferralBonusRecord>(
            r#"
            INSERT INTO referral_bonuses (
                referrer_id, referee_id, referrer_bonus, referee_bonus,
                status, referrer_transaction_id, referee_transaction_id, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING *
            "#,
        )
        .bind(referrer_id)
        .bind(referee_id)
        .bind(referrer_bonus.to_string())
        .bind(referee_bonus.to_string())
        .bind(BonusStatus::Completed.as_str())
        .bind(referrer_transaction_id)
        .bind(referee_transaction_id)
        .bind(now)
        .fetch_one(conn)
        .await
        .map_err(|e| {
            error!("Failed to create referral bonus: {}", e);
            DatabaseError::QueryError(format!("Failed to create referral bonus: {}", e))
        })?;

        record.into_entity()
    }

    /// Bonuses a user has earned as referrer, newest first.
    pub async fn history_for_referrer(
        &self,
        referrer_id: &str,
    ) -> Result<Vec<ReferralBonus>, DatabaseError> {
        let records = sqlx::query_as::<_, ReferralBonusRecord>(
            "SELECT * FROM referral_bonuses WHERE referrer_id = ?1 ORDER BY created_at DESC",
        )
        .bind(referrer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        records
            .into_iter()
            .map(ReferralBonusRecord::into_entity)
            .collect()
    }

    /// Whether a referee has already been paid a bonus.
    pub async fn exists_for_referee(&self, referee_id: &str) -> Result<bool, DatabaseError> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM referral_bonuses WHERE referee_id = ?1")
                .bind(referee_id)
                .fetch_one(&self.pool)
                .await
                .map_err(DatabaseError::from)?;

        Ok(row.0 > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::account::AccountKind;
    use crate::domain::entities::transaction::TransactionType;
    use crate::persistence::init_database;
    use rust_decimal_macros::dec;

    async fn test_pool() -> DbPool {
        init_database("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_account_create_and_lookup() {
        let pool = test_pool().await;
        let repo = AccountRepository::new(pool);

        let created = repo
            .create(NewAccount {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                kind: AccountKind::Standard,
                api_token: Some("token-alice".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(created.status, AccountStatus::Pending);
        assert_eq!(created.referral_code.as_ref().unwrap().len(), 8);
        assert!(!created.has_used_referral);

        let by_token = repo.get_by_token("token-alice").await.unwrap().unwrap();
        assert_eq!(by_token.id, created.id);

        let missing = repo.get_by_token("no-such-token").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_referral_code_lookup_requires_active_status() {
        let pool = test_pool().await;
        let repo = AccountRepository::new(pool);

        let created = repo
            .create(NewAccount {
                username: "bob".to_string(),
                email: "bob@example.com".to_string(),
                kind: AccountKind::Standard,
                api_token: None,
            })
            .await
            .unwrap();
        let code = created.referral_code.clone().unwrap();

        // Pending accounts do not resolve
        assert!(repo
            .get_active_by_referral_code(&code)
            .await
            .unwrap()
            .is_none());

        repo.update_status(&created.id, AccountStatus::Active, false)
            .await
            .unwrap();
        let found = repo.get_active_by_referral_code(&code).await.unwrap();
        assert_eq!(found.unwrap().id, created.id);
    }

    #[tokio::test]
    async fn test_mark_referral_used_is_one_shot() {
        let pool = test_pool().await;
        let repo = AccountRepository::new(pool.clone());

        let account = repo
            .create(NewAccount {
                username: "carol".to_string(),
                email: "carol@example.com".to_string(),
                kind: AccountKind::Standard,
                api_token: None,
            })
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        assert!(AccountRepository::mark_referral_used(&mut conn, &account.id)
            .await
            .unwrap());
        assert!(!AccountRepository::mark_referral_used(&mut conn, &account.id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_transaction_append_and_history() {
        let pool = test_pool().await;
        let repo = TransactionRepository::new(pool.clone());

        let mut conn = pool.acquire().await.unwrap();
        let tx = TransactionRepository::append(
            &mut conn,
            NewTransaction::cash(
                "user-1",
                TransactionType::Deposit,
                dec!(99.00),
                dec!(1.00),
                Some("wire-1".to_string()),
                None,
            ),
        )
        .await
        .unwrap();
        drop(conn);

        assert_eq!(tx.amount, dec!(99.00));
        assert_eq!(tx.fee, dec!(1.00));

        let history = repo.history("user-1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, tx.id);

        assert!(repo.history("user-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stock_upsert_refreshes_price_keeps_profile() {
        let pool = test_pool().await;
        let repo = StockRepository::new(pool.clone());

        let profile = StockProfile {
            name: "Apple Inc".to_string(),
            exchange: "NASDAQ".to_string(),
            currency: "USD".to_string(),
            sector: Some("Technology".to_string()),
            market_cap: Some(3_000_000),
        };

        let mut conn = pool.acquire().await.unwrap();
        let created =
            StockRepository::upsert_traded(&mut conn, "AAPL", dec!(150.00), Some(&profile))
                .await
                .unwrap();
        assert_eq!(created.name, "Apple Inc");
        assert_eq!(created.current_price, dec!(150.00));

        // Second trade refreshes the price without touching the profile
        let updated = StockRepository::upsert_traded(&mut conn, "AAPL", dec!(151.25), None)
            .await
            .unwrap();
        drop(conn);

        assert_eq!(updated.name, "Apple Inc");
        assert_eq!(updated.current_price, dec!(151.25));

        let fetched = repo.get("AAPL").await.unwrap().unwrap();
        assert_eq!(fetched.sector.as_deref(), Some("Technology"));
    }

    #[tokio::test]
    async fn test_referral_unique_per_referee() {
        let pool = test_pool().await;
        let repo = ReferralRepository::new(pool.clone());

        let mut conn = pool.acquire().await.unwrap();
        ReferralRepository::create_completed(
            &mut conn,
            "referrer-1",
            "referee-1",
            dec!(8.00),
            dec!(5.00),
            "tx-a",
            "tx-b",
        )
        .await
        .unwrap();

        let duplicate = ReferralRepository::create_completed(
            &mut conn,
            "referrer-2",
            "referee-1",
            dec!(8.00),
            dec!(5.00),
            "tx-c",
            "tx-d",
        )
        .await;
        drop(conn);

        assert!(duplicate.is_err());
        assert!(repo.exists_for_referee("referee-1").await.unwrap());
        assert!(!repo.exists_for_referee("referee-2").await.unwrap());
    }
}
