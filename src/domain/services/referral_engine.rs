//! ReferralEngine - one-time bonus issuance between two accounts
//!
//! The sharer of a code earns the referrer bonus, the user of the code the
//! referee bonus. A user can redeem a code once, ever: the account flag is
//! re-checked inside the unit of work with a guarded update, and the
//! referral table's UNIQUE constraint on the referee is the storage-level
//! backstop. Both credits, both ledger appends, the bonus record and the
//! flag flip commit together; the two notifications go out independently
//! afterwards.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::entities::account::Account;
use crate::domain::entities::referral::ReferralBonus;
use crate::domain::entities::transaction::{NewTransaction, TransactionType};
use crate::domain::errors::EngineError;
use crate::domain::repositories::notifier::{Notification, Notifier};
use crate::domain::services::balance_manager::BalanceManager;
use crate::persistence::repository::{
    AccountRepository, ReferralRepository, TransactionRepository,
};
use crate::persistence::DbPool;

/// Outcome of a committed referral, from the referee's perspective.
#[derive(Debug, Clone)]
pub struct ReferralOutcome {
    pub referrer_username: String,
    pub bonus_received: Decimal,
    pub new_balance: Decimal,
}

/// Referral statistics for a user acting as referrer.
#[derive(Debug, Clone)]
pub struct ReferralStats {
    pub referral_code: Option<String>,
    pub successful_referrals: usize,
    pub total_earnings: Decimal,
    pub has_used_referral: bool,
}

pub struct ReferralEngine {
    pool: DbPool,
    accounts: AccountRepository,
    referrals: ReferralRepository,
    transactions: TransactionRepository,
    notifier: Arc<dyn Notifier>,
    referrer_bonus: Decimal,
    referee_bonus: Decimal,
}

impl ReferralEngine {
    pub fn new(
        pool: DbPool,
        notifier: Arc<dyn Notifier>,
        referrer_bonus: Decimal,
        referee_bonus: Decimal,
    ) -> Self {
        Self {
            accounts: AccountRepository::new(pool.clone()),
            referrals: ReferralRepository::new(pool.clone()),
            transactions: TransactionRepository::new(pool.clone()),
            pool,
            notifier,
            referrer_bonus,
            referee_bonus,
        }
    }

    /// Redeem a referral code for `referee`, paying out both parties.
    pub async fn use_code(
        &self,
        referee: &Account,
        code: &str,
        source_ip: Option<String>,
    ) -> Result<ReferralOutcome, EngineError> {
        let code = code.trim().to_uppercase();
        if code.is_empty() {
            return Err(EngineError::InvalidReferralCode);
        }

        if referee.has_used_referral {
            return Err(EngineError::ReferralAlreadyUsed);
        }

        if referee.referral_code.as_deref() == Some(code.as_str()) {
            return Err(EngineError::SelfReferral);
        }

        let referrer = self
            .accounts
            .get_active_by_referral_code(&code)
            .await?
            .ok_or(EngineError::InvalidReferralCode)?;

        if referrer.id == referee.id {
            return Err(EngineError::SelfReferral);
        }

        let mut tx = self.pool.begin().await?;

        // Re-check the one-time flag under the write lock before paying
        // anything out; losing this race rolls the whole redemption back.
        if !AccountRepository::mark_referral_used(&mut tx, &referee.id).await? {
            return Err(EngineError::ReferralAlreadyUsed);
        }

        let _referrer_balance =
            BalanceManager::credit(&mut tx, &referrer.id, self.referrer_bonus).await?;
        let referrer_entry = TransactionRepository::append(
            &mut tx,
            NewTransaction::cash(
                &referrer.id,
                TransactionType::Referral,
                self.referrer_bonus,
                Decimal::ZERO,
                Some(format!("Referral bonus from {}", referee.username)),
                source_ip.clone(),
            ),
        )
        .await?;

        let referee_balance =
            BalanceManager::credit(&mut tx, &referee.id, self.referee_bonus).await?;
        let referee_entry = TransactionRepository::append(
            &mut tx,
            NewTransaction::cash(
                &referee.id,
                TransactionType::Referral,
                self.referee_bonus,
                Decimal::ZERO,
                Some(format!(
                    "Referral bonus from using {}'s code",
                    referrer.username
                )),
                source_ip,
            ),
        )
        .await?;

        ReferralRepository::create_completed(
            &mut tx,
            &referrer.id,
            &referee.id,
            self.referrer_bonus,
            self.referee_bonus,
            &referrer_entry.id,
            &referee_entry.id,
        )
        .await?;

        tx.commit().await?;

        info!(
            "Referral committed: {} referred {} ({} / {})",
            referrer.username, referee.username, self.referrer_bonus, self.referee_bonus
        );

        // Each party is notified independently; one failure must not block
        // the other or the committed bonus.
        let to_referrer = Notification::ReferralBonus {
            is_referrer: true,
            bonus_amount: self.referrer_bonus,
            other_party: referee.username.clone(),
        };
        if let Err(e) = self.notifier.notify(&referrer, to_referrer).await {
            warn!(
                "Referral notification failed for referrer {}: {}",
                referrer.username, e
            );
        }

        let to_referee = Notification::ReferralBonus {
            is_referrer: false,
            bonus_amount: self.referee_bonus,
            other_party: referrer.username.clone(),
        };
        if let Err(e) = self.notifier.notify(referee, to_referee).await {
            warn!(
                "Referral notification failed for referee {}: {}",
                referee.username, e
            );
        }

        Ok(ReferralOutcome {
            referrer_username: referrer.username,
            bonus_received: self.referee_bonus,
            new_balance: referee_balance,
        })
    }

    /// Total amount a user has earned through referral transactions.
    pub async fn earnings(&self, user_id: &str) -> Result<Decimal, EngineError> {
        let transactions = self.transactions.in_range(user_id, None, None).await?;
        Ok(transactions
            .iter()
            .filter(|t| t.tx_type == TransactionType::Referral)
            .map(|t| t.amount)
            .sum())
    }

    /// Referral history for a user acting as referrer, newest first.
    pub async fn history(&self, referrer_id: &str) -> Result<Vec<ReferralBonus>, EngineError> {
        self.referrals
            .history_for_referrer(referrer_id)
            .await
            .map_err(EngineError::from)
    }

    /// Statistics shown on the referral dashboard.
    pub async fn stats(&self, account: &Account) -> Result<ReferralStats, EngineError> {
        let history = self.history(&account.id).await?;
        let total_earnings = self.earnings(&account.id).await?;

        Ok(ReferralStats {
            referral_code: account.referral_code.clone(),
            successful_referrals: history.len(),
            total_earnings,
            has_used_referral: account.has_used_referral,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::account::{AccountKind, AccountStatus};
    use crate::domain::services::trading_engine::tests::RecordingNotifier;
    use crate::persistence::init_database;
    use crate::persistence::models::NewAccount;
    use rust_decimal_macros::dec;

    async fn active_account(pool: &DbPool, username: &str) -> Account {
        let repo = AccountRepository::new(pool.clone());
        let account = repo
            .create(NewAccount {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                kind: AccountKind::Standard,
                api_token: None,
            })
            .await
            .unwrap();
        repo.update_status(&account.id, AccountStatus::Active, false)
            .await
            .unwrap();
        repo.get(&account.id).await.unwrap().unwrap()
    }

    fn engine(pool: DbPool) -> (ReferralEngine, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        (
            ReferralEngine::new(pool, notifier.clone(), dec!(8.00), dec!(5.00)),
            notifier,
        )
    }

    #[tokio::test]
    async fn test_referral_pays_both_parties_once() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let (referral, notifier) = engine(pool.clone());
        let referrer = active_account(&pool, "alice").await;
        let referee = active_account(&pool, "bob").await;
        let code = referrer.referral_code.clone().unwrap();

        let outcome = referral.use_code(&referee, &code, None).await.unwrap();
        assert_eq!(outcome.bonus_received, dec!(5.00));
        assert_eq!(outcome.new_balance, dec!(5.00));
        assert_eq!(outcome.referrer_username, "alice");

        // Two ledger rows, one per party
        let transactions = TransactionRepository::new(pool.clone());
        let referrer_history = transactions.history(&referrer.id).await.unwrap();
        assert_eq!(referrer_history.len(), 1);
        assert_eq!(referrer_history[0].amount, dec!(8.00));
        assert_eq!(
            referrer_history[0].reference.as_deref(),
            Some("Referral bonus from bob")
        );

        let referee_history = transactions.history(&referee.id).await.unwrap();
        assert_eq!(referee_history.len(), 1);
        assert_eq!(referee_history[0].amount, dec!(5.00));
        assert_eq!(
            referee_history[0].reference.as_deref(),
            Some("Referral bonus from using alice's code")
        );

        // One bonus record linking both transactions
        let bonuses = referral.history(&referrer.id).await.unwrap();
        assert_eq!(bonuses.len(), 1);
        assert_eq!(
            bonuses[0].referrer_transaction_id.as_deref(),
            Some(referrer_history[0].id.as_str())
        );
        assert_eq!(
            bonuses[0].referee_transaction_id.as_deref(),
            Some(referee_history[0].id.as_str())
        );

        // Both parties notified
        assert_eq!(
            *notifier.delivered.lock().unwrap(),
            vec!["referral_bonus", "referral_bonus"]
        );
    }

    #[tokio::test]
    async fn test_second_attempt_is_rejected_with_no_duplicate_rows() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let (referral, _) = engine(pool.clone());
        let referrer = active_account(&pool, "alice").await;
        let referee = active_account(&pool, "bob").await;
        let code = referrer.referral_code.clone().unwrap();

        referral.use_code(&referee, &code, None).await.unwrap();

        // Reload the referee so the account carries the flipped flag
        let accounts = AccountRepository::new(pool.clone());
        let referee = accounts.get(&referee.id).await.unwrap().unwrap();
        assert!(referee.has_used_referral);

        let second = referral.use_code(&referee, &code, None).await;
        assert!(matches!(second, Err(EngineError::ReferralAlreadyUsed)));

        let transactions = TransactionRepository::new(pool.clone());
        assert_eq!(transactions.history(&referrer.id).await.unwrap().len(), 1);
        assert_eq!(transactions.history(&referee.id).await.unwrap().len(), 1);
        assert_eq!(referral.history(&referrer.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_principal_cannot_double_redeem() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let (referral, _) = engine(pool.clone());
        let referrer = active_account(&pool, "alice").await;
        // `referee` still shows has_used_referral == false after the first
        // redemption: the in-transaction guard must catch the replay.
        let referee = active_account(&pool, "bob").await;
        let code = referrer.referral_code.clone().unwrap();

        referral.use_code(&referee, &code, None).await.unwrap();
        let replay = referral.use_code(&referee, &code, None).await;
        assert!(matches!(replay, Err(EngineError::ReferralAlreadyUsed)));

        // The rolled-back replay left no extra money behind
        let mut conn = pool.acquire().await.unwrap();
        let balance = BalanceManager::fetch_or_create(&mut conn, &referee.id)
            .await
            .unwrap();
        assert_eq!(balance, dec!(5.00));
    }

    #[tokio::test]
    async fn test_own_code_is_rejected() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let (referral, _) = engine(pool.clone());
        let user = active_account(&pool, "alice").await;
        let code = user.referral_code.clone().unwrap();

        let result = referral.use_code(&user, &code, None).await;
        assert!(matches!(result, Err(EngineError::SelfReferral)));
    }

    #[tokio::test]
    async fn test_unknown_or_inactive_code_is_rejected() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let (referral, _) = engine(pool.clone());
        let referee = active_account(&pool, "bob").await;

        let unknown = referral.use_code(&referee, "NOPE1234", None).await;
        assert!(matches!(unknown, Err(EngineError::InvalidReferralCode)));

        // A pending referrer's code does not resolve
        let accounts = AccountRepository::new(pool.clone());
        let pending = accounts
            .create(NewAccount {
                username: "carol".to_string(),
                email: "carol@example.com".to_string(),
                kind: AccountKind::Standard,
                api_token: None,
            })
            .await
            .unwrap();
        let code = pending.referral_code.unwrap();

        let inactive = referral.use_code(&referee, &code, None).await;
        assert!(matches!(inactive, Err(EngineError::InvalidReferralCode)));
    }

    #[tokio::test]
    async fn test_code_is_normalized_before_lookup() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let (referral, _) = engine(pool.clone());
        let referrer = active_account(&pool, "alice").await;
        let referee = active_account(&pool, "bob").await;
        let code = referrer.referral_code.clone().unwrap();

        let outcome = referral
            .use_code(&referee, &format!("  {}  ", code.to_lowercase()), None)
            .await
            .unwrap();
        assert_eq!(outcome.bonus_received, dec!(5.00));
    }

    #[tokio::test]
    async fn test_stats_reflect_earnings_and_usage() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let (referral, _) = engine(pool.clone());
        let referrer = active_account(&pool, "alice").await;
        let referee = active_account(&pool, "bob").await;
        let code = referrer.referral_code.clone().unwrap();

        referral.use_code(&referee, &code, None).await.unwrap();

        let stats = referral.stats(&referrer).await.unwrap();
        assert_eq!(stats.successful_referrals, 1);
        assert_eq!(stats.total_earnings, dec!(8.00));
        assert!(!stats.has_used_referral);

        let accounts = AccountRepository::new(pool.clone());
        let referee = accounts.get(&referee.id).await.unwrap().unwrap();
        let referee_stats = referral.stats(&referee).await.unwrap();
        assert_eq!(referee_stats.successful_referrals, 0);
        assert_eq!(referee_stats.total_earnings, dec!(5.00));
        assert!(referee_stats.has_used_referral);
    }
}
