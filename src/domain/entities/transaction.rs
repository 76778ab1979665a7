use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ledger entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "DEPOSIT")]
    Deposit,
    #[serde(rename = "WITHDRAWAL")]
    Withdrawal,
    #[serde(rename = "REFERRAL")]
    Referral,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Buy => "BUY",
            TransactionType::Sell => "SELL",
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::Referral => "REFERRAL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "BUY" => Some(TransactionType::Buy),
            "SELL" => Some(TransactionType::Sell),
            "DEPOSIT" => Some(TransactionType::Deposit),
            "WITHDRAWAL" => Some(TransactionType::Withdrawal),
            "REFERRAL" => Some(TransactionType::Referral),
            _ => None,
        }
    }
}

/// An immutable, append-only ledger entry.
///
/// `amount` is signed: negative for cash outflows (buys, withdrawals),
/// positive for inflows (sells, deposits, referral bonuses). `fee` is
/// informational and already reflected in `amount` where applicable.
/// Balance and portfolio state are caches derivable from replaying these
/// rows; nothing in the crate updates or deletes a written entry.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub tx_type: TransactionType,
    pub symbol: Option<String>,
    pub quantity: i64,
    pub price: Decimal,
    pub amount: Decimal,
    pub fee: Decimal,
    pub reference: Option<String>,
    pub source_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for appending a new ledger entry. The id and timestamp are
/// assigned at append time.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: String,
    pub tx_type: TransactionType,
    pub symbol: Option<String>,
    pub quantity: i64,
    pub price: Decimal,
    pub amount: Decimal,
    pub fee: Decimal,
    pub reference: Option<String>,
    pub source_ip: Option<String>,
}

impl NewTransaction {
    /// A cash-only entry: no symbol, no shares, no execution price.
    pub fn cash(
        user_id: &str,
        tx_type: TransactionType,
        amount: Decimal,
        fee: Decimal,
        reference: Option<String>,
        source_ip: Option<String>,
    ) -> Self {
        NewTransaction {
            user_id: user_id.to_string(),
            tx_type,
            symbol: None,
            quantity: 0,
            price: Decimal::ZERO,
            amount,
            fee,
            reference,
            source_ip,
        }
    }
}
