//! Log-backed notification adapter
//!
//! Stands in for the external email service: every notification is recorded
//! in the structured log with its kind and recipient. Real delivery happens
//! in a downstream system consuming these events.

use async_trait::async_trait;
use tracing::info;

use crate::domain::entities::account::Account;
use crate::domain::repositories::notifier::{Notification, Notifier, NotifyError};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(
        &self,
        recipient: &Account,
        notification: Notification,
    ) -> Result<(), NotifyError> {
        info!(
            kind = notification.kind(),
            recipient = %recipient.email,
            "notification dispatched"
        );
        Ok(())
    }
}
