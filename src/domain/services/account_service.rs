//! AccountService - admin-driven account lifecycle
//!
//! Status changes go through an explicit transition function rather than
//! save hooks, so only a real pending→active / active→suspended /
//! suspended→active change can emit a notification, and the activation
//! notice fires at most once per account.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::entities::account::{
    status_transition, Account, AccountStatus, StatusEvent,
};
use crate::domain::errors::EngineError;
use crate::domain::repositories::notifier::{Notification, Notifier};
use crate::persistence::models::NewAccount;
use crate::persistence::repository::AccountRepository;
use crate::persistence::DbPool;

pub struct AccountService {
    accounts: AccountRepository,
    notifier: Arc<dyn Notifier>,
}

impl AccountService {
    pub fn new(pool: DbPool, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            accounts: AccountRepository::new(pool),
            notifier,
        }
    }

    /// Provision a new account (pending approval).
    pub async fn create(&self, new_account: NewAccount) -> Result<Account, EngineError> {
        self.accounts
            .create(new_account)
            .await
            .map_err(EngineError::from)
    }

    /// Apply an admin-decided status change, emitting the matching
    /// lifecycle notification when the transition warrants one.
    pub async fn set_status(
        &self,
        user_id: &str,
        new_status: AccountStatus,
    ) -> Result<Account, EngineError> {
        let account = self
            .accounts
            .get(user_id)
            .await?
            .ok_or(EngineError::AccountNotFound)?;

        if account.status == new_status {
            return Ok(account);
        }

        let event = status_transition(account.status, new_status);

        // The activation notice goes out at most once, even if the account
        // bounces back through pending.
        let event = match event {
            Some(StatusEvent::Activated) if account.activation_notified => None,
            other => other,
        };

        self.accounts
            .update_status(user_id, new_status, matches!(event, Some(StatusEvent::Activated)))
            .await?;

        info!(
            "Account {} status: {} -> {}",
            account.username,
            account.status.as_str(),
            new_status.as_str()
        );

        if let Some(event) = event {
            let notification = match event {
                StatusEvent::Activated => Notification::AccountActivated,
                StatusEvent::Suspended => Notification::AccountSuspended,
                StatusEvent::Reactivated => Notification::AccountReactivated,
            };
            if let Err(e) = self.notifier.notify(&account, notification).await {
                warn!(
                    "Status notification failed for {}: {}",
                    account.username, e
                );
            }
        }

        self.accounts
            .get(user_id)
            .await?
            .ok_or(EngineError::AccountNotFound)
    }
}
