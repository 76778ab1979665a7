use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BonusStatus {
    Pending,
    Completed,
    Failed,
}

impl BonusStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BonusStatus::Pending => "pending",
            BonusStatus::Completed => "completed",
            BonusStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(BonusStatus::Pending),
            "completed" => Some(BonusStatus::Completed),
            "failed" => Some(BonusStatus::Failed),
            _ => None,
        }
    }
}

/// Record of a referral bonus paid out between two accounts. A user can be
/// the referee at most once, ever; both bonus transactions are linked for
/// the audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct ReferralBonus {
    pub id: i64,
    pub referrer_id: String,
    pub referee_id: String,
    pub referrer_bonus: Decimal,
    pub referee_bonus: Decimal,
    pub status: BonusStatus,
    pub referrer_transaction_id: Option<String>,
    pub referee_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
