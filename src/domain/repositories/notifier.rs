//! Notifier Trait
//!
//! Fire-and-forget delivery of user-facing notifications for completed
//! operations. Delivery happens outside every atomic scope: a failure is
//! logged by the caller and never rolls back a committed operation.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::entities::account::Account;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),
}

/// The notification kinds emitted by the engines, with the payload each
/// template needs.
#[derive(Debug, Clone)]
pub enum Notification {
    BuyConfirmed {
        symbol: String,
        stock_name: String,
        quantity: i64,
        price: Decimal,
        total_cost: Decimal,
    },
    SellConfirmed {
        symbol: String,
        stock_name: String,
        quantity: i64,
        price: Decimal,
        total_revenue: Decimal,
    },
    DepositConfirmed {
        net_amount: Decimal,
        fee: Decimal,
        new_balance: Decimal,
    },
    WithdrawalConfirmed {
        amount: Decimal,
        fee: Decimal,
        new_balance: Decimal,
    },
    /// `is_referrer` selects the copy: the sharer of the code and the user
    /// of the code receive different templates and amounts.
    ReferralBonus {
        is_referrer: bool,
        bonus_amount: Decimal,
        other_party: String,
    },
    AccountActivated,
    AccountSuspended,
    AccountReactivated,
}

impl Notification {
    /// Template identifier, used for logging and delivery routing.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::BuyConfirmed { .. } => "buy_confirmed",
            Notification::SellConfirmed { .. } => "sell_confirmed",
            Notification::DepositConfirmed { .. } => "deposit_confirmed",
            Notification::WithdrawalConfirmed { .. } => "withdrawal_confirmed",
            Notification::ReferralBonus { .. } => "referral_bonus",
            Notification::AccountActivated => "account_activated",
            Notification::AccountSuspended => "account_suspended",
            Notification::AccountReactivated => "account_reactivated",
        }
    }
}

/// External notification sink (email in the reference deployment).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &Account, notification: Notification)
        -> Result<(), NotifyError>;
}
