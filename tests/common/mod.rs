//! Shared fixtures for the end-to-end tests: a fixed-price quote provider,
//! a silent notifier, pinned market clocks and account provisioning.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::US::Eastern;
use rust_decimal::Decimal;
use std::sync::Arc;

use bolsa::domain::entities::account::{Account, AccountKind, AccountStatus};
use bolsa::domain::repositories::notifier::{Notification, Notifier, NotifyError};
use bolsa::domain::repositories::quote_provider::{
    Quote, QuoteError, QuoteProvider, QuoteResult, StockProfile,
};
use bolsa::domain::services::trading_engine::Clock;
use bolsa::persistence::models::NewAccount;
use bolsa::persistence::repository::AccountRepository;
use bolsa::persistence::DbPool;

/// Quote provider answering every symbol with one fixed price.
pub struct FixedQuotes {
    pub price: Decimal,
    pub fail: bool,
}

impl FixedQuotes {
    pub fn priced(price: Decimal) -> Self {
        Self { price, fail: false }
    }
}

#[async_trait]
impl QuoteProvider for FixedQuotes {
    async fn get_quote(&self, _symbol: &str) -> QuoteResult<Quote> {
        if self.fail {
            return Err(QuoteError::Transport("provider offline".to_string()));
        }
        Ok(Quote {
            current_price: self.price,
            change: 0.0,
            percent_change: 0.0,
            high: 1.0,
            low: 1.0,
            open: 1.0,
            previous_close: 1.0,
        })
    }

    async fn validate_symbol(&self, _symbol: &str) -> QuoteResult<()> {
        if self.fail {
            return Err(QuoteError::Transport("provider offline".to_string()));
        }
        Ok(())
    }

    async fn get_profile(&self, _symbol: &str) -> QuoteResult<Option<StockProfile>> {
        Ok(None)
    }
}

/// Notifier that swallows everything.
pub struct SilentNotifier;

#[async_trait]
impl Notifier for SilentNotifier {
    async fn notify(
        &self,
        _recipient: &Account,
        _notification: Notification,
    ) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Wednesday 2024-03-13 at noon Eastern: market open.
pub fn open_market_clock() -> Clock {
    Arc::new(|| {
        Eastern
            .with_ymd_and_hms(2024, 3, 13, 12, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    })
}

/// Saturday 2024-03-16 at noon Eastern: market closed.
#[allow(dead_code)]
pub fn closed_market_clock() -> Clock {
    Arc::new(|| {
        Eastern
            .with_ymd_and_hms(2024, 3, 16, 12, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    })
}

#[allow(dead_code)]
pub fn pinned(instant: DateTime<Utc>) -> Clock {
    Arc::new(move || instant)
}

/// Provision an approved standard account.
pub async fn active_account(pool: &DbPool, username: &str) -> Account {
    let repo = AccountRepository::new(pool.clone());
    let account = repo
        .create(NewAccount {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            kind: AccountKind::Standard,
            api_token: Some(format!("token-{}", username)),
        })
        .await
        .expect("create account");
    repo.update_status(&account.id, AccountStatus::Active, false)
        .await
        .expect("activate account");
    repo.get(&account.id).await.expect("reload").expect("account exists")
}
