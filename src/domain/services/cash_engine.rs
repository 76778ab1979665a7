//! CashEngine - simulated bank deposits and withdrawals
//!
//! Both operations charge a configurable fee rate. Deposits credit the net
//! amount; withdrawals debit the requested amount plus fee. The balance
//! change and the ledger append share one atomic unit of work; confirmation
//! notifications go out after commit.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::entities::account::Account;
use crate::domain::entities::portfolio::round_money;
use crate::domain::entities::transaction::{NewTransaction, TransactionType};
use crate::domain::errors::{EngineError, ValidationError};
use crate::domain::repositories::notifier::{Notification, Notifier};
use crate::domain::services::balance_manager::BalanceManager;
use crate::persistence::repository::TransactionRepository;
use crate::persistence::DbPool;

/// Outcome of a committed cash movement.
#[derive(Debug, Clone)]
pub struct CashMovement {
    pub transaction_id: String,
    /// Net amount credited for deposits; requested amount for withdrawals.
    pub amount: Decimal,
    pub fee: Decimal,
    pub new_balance: Decimal,
}

pub struct CashEngine {
    pool: DbPool,
    notifier: Arc<dyn Notifier>,
    fee_rate: Decimal,
}

impl CashEngine {
    pub fn new(pool: DbPool, notifier: Arc<dyn Notifier>, fee_rate: Decimal) -> Self {
        Self {
            pool,
            notifier,
            fee_rate,
        }
    }

    /// Deposit `amount`; the fee is taken out of it and the remainder is
    /// credited.
    pub async fn deposit(
        &self,
        account: &Account,
        amount: Decimal,
        reference: Option<String>,
        source_ip: Option<String>,
    ) -> Result<CashMovement, EngineError> {
        let amount = round_money(amount);
        if amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidAmount.into());
        }

        let fee = round_money(amount * self.fee_rate);
        let net_amount = amount - fee;

        let mut tx = self.pool.begin().await?;
        let new_balance = BalanceManager::credit(&mut tx, &account.id, net_amount).await?;
        let ledger_entry = TransactionRepository::append(
            &mut tx,
            NewTransaction::cash(
                &account.id,
                TransactionType::Deposit,
                net_amount,
                fee,
                reference,
                source_ip,
            ),
        )
        .await?;
        tx.commit().await?;

        info!(
            "Deposit committed for {}: net {} (fee {}), balance {}",
            account.username, net_amount, fee, new_balance
        );

        let notification = Notification::DepositConfirmed {
            net_amount,
            fee,
            new_balance,
        };
        if let Err(e) = self.notifier.notify(account, notification).await {
            warn!(
                "Deposit confirmation notification failed for {}: {}",
                account.username, e
            );
        }

        Ok(CashMovement {
            transaction_id: ledger_entry.id,
            amount: net_amount,
            fee,
            new_balance,
        })
    }

    /// Withdraw `amount`; the fee is charged on top, so the balance must
    /// cover `amount + fee`.
    pub async fn withdraw(
        &self,
        account: &Account,
        amount: Decimal,
        reference: Option<String>,
        source_ip: Option<String>,
    ) -> Result<CashMovement, EngineError> {
        let amount = round_money(amount);
        if amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidAmount.into());
        }

        let fee = round_money(amount * self.fee_rate);
        let total_debit = amount + fee;

        let mut tx = self.pool.begin().await?;
        let new_balance = BalanceManager::debit(&mut tx, &account.id, total_debit).await?;
        let ledger_entry = TransactionRepository::append(
            &mut tx,
            NewTransaction::cash(
                &account.id,
                TransactionType::Withdrawal,
                -amount,
                fee,
                reference,
                source_ip,
            ),
        )
        .await?;
        tx.commit().await?;

        info!(
            "Withdrawal committed for {}: {} (fee {}), balance {}",
            account.username, amount, fee, new_balance
        );

        let notification = Notification::WithdrawalConfirmed {
            amount,
            fee,
            new_balance,
        };
        if let Err(e) = self.notifier.notify(account, notification).await {
            warn!(
                "Withdrawal confirmation notification failed for {}: {}",
                account.username, e
            );
        }

        Ok(CashMovement {
            transaction_id: ledger_entry.id,
            amount,
            fee,
            new_balance,
        })
    }
}
