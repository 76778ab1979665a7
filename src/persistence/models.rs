//! Database Models
//!
//! Persistent record structures and their conversions into domain entities.
//! Monetary columns are TEXT in SQLite; records carry them as strings and
//! parse them into `Decimal` at the conversion boundary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

use super::DatabaseError;
use crate::domain::entities::account::{Account, AccountKind, AccountStatus};
use crate::domain::entities::portfolio::Position;
use crate::domain::entities::referral::{BonusStatus, ReferralBonus};
use crate::domain::entities::stock::Stock;
use crate::domain::entities::transaction::{Transaction, TransactionType};

/// Parse a TEXT money column into a `Decimal`.
pub fn parse_decimal(raw: &str) -> Result<Decimal, DatabaseError> {
    Decimal::from_str(raw)
        .map_err(|e| DatabaseError::QueryError(format!("Invalid decimal '{}': {}", raw, e)))
}

/// Account record in database
#[derive(Debug, Clone, FromRow)]
pub struct AccountRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    pub kind: String,
    pub status: String,
    pub referral_code: Option<String>,
    pub has_used_referral: bool,
    pub activation_notified: bool,
    pub api_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountRecord {
    pub fn into_entity(self) -> Result<Account, DatabaseError> {
        let kind = AccountKind::parse(&self.kind)
            .ok_or_else(|| DatabaseError::QueryError(format!("Unknown account kind: {}", self.kind)))?;
        let status = AccountStatus::parse(&self.status).ok_or_else(|| {
            DatabaseError::QueryError(format!("Unknown account status: {}", self.status))
        })?;

        Ok(Account {
            id: self.id,
            username: self.username,
            email: self.email,
            kind,
            status,
            referral_code: self.referral_code,
            has_used_referral: self.has_used_referral,
            activation_notified: self.activation_notified,
            created_at: self.created_at,
        })
    }
}

/// Create account input
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub kind: AccountKind,
    #[serde(default)]
    pub api_token: Option<String>,
}

/// Balance record in database
#[derive(Debug, Clone, FromRow)]
pub struct BalanceRecord {
    pub user_id: String,
    pub balance: String,
    pub updated_at: DateTime<Utc>,
}

impl BalanceRecord {
    pub fn amount(&self) -> Result<Decimal, DatabaseError> {
        parse_decimal(&self.balance)
    }
}

/// Position record in database
#[derive(Debug, Clone, FromRow)]
pub struct PositionRecord {
    pub id: i64,
    pub user_id: String,
    pub symbol: String,
    pub quantity: i64,
    pub average_price: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PositionRecord {
    pub fn into_entity(self) -> Result<Position, DatabaseError> {
        let average_price = parse_decimal(&self.average_price)?;
        Ok(Position {
            user_id: self.user_id,
            symbol: self.symbol,
            quantity: self.quantity,
            average_price,
            updated_at: self.updated_at,
        })
    }
}

/// Transaction record in database
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TransactionRecord {
    pub id: String,
    pub user_id: String,
    pub tx_type: String,
    pub symbol: Option<String>,
    pub quantity: i64,
    pub price: String,
    pub amount: String,
    pub fee: String,
    pub reference: Option<String>,
    pub source_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn into_entity(self) -> Result<Transaction, DatabaseError> {
        let tx_type = TransactionType::parse(&self.tx_type).ok_or_else(|| {
            DatabaseError::QueryError(format!("Unknown transaction type: {}", self.tx_type))
        })?;

        Ok(Transaction {
            id: self.id,
            user_id: self.user_id,
            tx_type,
            symbol: self.symbol,
            quantity: self.quantity,
            price: parse_decimal(&self.price)?,
            amount: parse_decimal(&self.amount)?,
            fee: parse_decimal(&self.fee)?,
            reference: self.reference,
            source_ip: self.source_ip,
            created_at: self.created_at,
        })
    }
}

/// Referral bonus record in database
#[derive(Debug, Clone, FromRow)]
pub struct ReferralBonusRecord {
    pub id: i64,
    pub referrer_id: String,
    pub referee_id: String,
    pub referrer_bonus: String,
    pub referee_bonus: String,
    pub status: String,
    pub referrer_transaction_id: Option<String>,
    pub referee_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ReferralBonusRecord {
    pub fn into_entity(self) -> Result<ReferralBonus, DatabaseError> {
        let status = BonusStatus::parse(&self.status).ok_or_else(|| {
            DatabaseError::QueryError(format!("Unknown bonus status: {}", self.status))
        })?;

        Ok(ReferralBonus {
            id: self.id,
            referrer_id: self.referrer_id,
            referee_id: self.referee_id,
            referrer_bonus: parse_decimal(&self.referrer_bonus)?,
            referee_bonus: parse_decimal(&self.referee_bonus)?,
            status,
            referrer_transaction_id: self.referrer_transaction_id,
            referee_transaction_id: self.referee_transaction_id,
            created_at: self.created_at,
        })
    }
}

/// Stock record in database
#[derive(Debug, Clone, FromRow)]
pub struct StockRecord {
    pub symbol: String,
    pub name: String,
    pub currency: String,
    pub exchange: String,
    pub sector: Option<String>,
    pub market_cap: Option<i64>,
    pub current_price: String,
    pub is_active: bool,
    pub last_updated: DateTime<Utc>,
}

impl StockRecord {
    pub fn into_entity(self) -> Result<Stock, DatabaseError> {
        let current_price = parse_decimal(&self.current_price)?;
        Ok(Stock {
            symbol: self.symbol,
            name: self.name,
            currency: self.currency,
            exchange: self.exchange,
            sector: self.sector,
            market_cap: self.market_cap,
            current_price,
            is_active: self.is_active,
            last_updated: self.last_updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_decimal_valid() {
        assert_eq!(parse_decimal("53.33").unwrap(), dec!(53.33));
        assert_eq!(parse_decimal("-500").unwrap(), dec!(-500));
        assert_eq!(parse_decimal("0").unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_parse_decimal_invalid() {
        assert!(parse_decimal("not-a-number").is_err());
        assert!(parse_decimal("").is_err());
    }

    #[test]
    fn test_transaction_record_conversion() {
        let record = TransactionRecord {
            id: "tx-1".to_string(),
            user_id: "user-1".to_string(),
            tx_type: "BUY".to_string(),
            symbol: Some("AAPL".to_string()),
            quantity: 10,
            price: "50.00".to_string(),
            amount: "-500.00".to_string(),
            fee: "0".to_string(),
            reference: None,
            source_ip: Some("127.0.0.1".to_string()),
            created_at: Utc::now(),
        };

        let tx = record.into_entity().unwrap();
        assert_eq!(tx.tx_type, TransactionType::Buy);
        assert_eq!(tx.amount, dec!(-500.00));
        assert_eq!(tx.price, dec!(50.00));
    }

    #[test]
    fn test_transaction_record_unknown_type() {
        let record = TransactionRecord {
            id: "tx-1".to_string(),
            user_id: "user-1".to_string(),
            tx_type: "TRANSFER".to_string(),
            symbol: None,
            quantity: 0,
            price: "0".to_string(),
            amount: "1.00".to_string(),
            fee: "0".to_string(),
            reference: None,
            source_ip: None,
            created_at: Utc::now(),
        };

        assert!(record.into_entity().is_err());
    }
}
