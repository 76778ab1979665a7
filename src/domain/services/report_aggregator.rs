//! ReportAggregator - cash-flow and valuation summaries over the ledger
//!
//! The cash-flow summary is a pure single pass over a user's transaction
//! list. The valuation walks the open positions against live quotes,
//! falling back to the cached stock price when the provider fails; the
//! aggregation never blocks on a provider outage. Rendering (PDF/CSV page
//! layout) is a presentation concern that lives elsewhere.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::domain::entities::portfolio::round_money;
use crate::domain::entities::transaction::{Transaction, TransactionType};
use crate::domain::errors::EngineError;
use crate::domain::repositories::quote_provider::QuoteProvider;
use crate::domain::services::portfolio_manager::PortfolioManager;
use crate::persistence::repository::{StockRepository, TransactionRepository};
use crate::persistence::DbPool;

/// Per-type cash totals over a transaction list. Outflow types are
/// sign-normalized to positive values; `net_cash_flow` restores the signs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashFlowSummary {
    pub total_deposits: Decimal,
    pub total_withdrawals: Decimal,
    pub total_buys: Decimal,
    pub total_sells: Decimal,
    pub total_fees: Decimal,
    pub total_referrals: Decimal,
    pub net_cash_flow: Decimal,
}

/// Valuation of a single open position.
#[derive(Debug, Clone, Serialize)]
pub struct ValuationRow {
    pub symbol: String,
    pub name: String,
    pub quantity: i64,
    pub average_price: Decimal,
    pub current_price: Decimal,
    pub current_value: Decimal,
    pub invested_value: Decimal,
    pub profit: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValuationSummary {
    pub total_cost: Decimal,
    pub total_value: Decimal,
    pub total_profit: Decimal,
    pub total_profit_pct: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioValuation {
    pub rows: Vec<ValuationRow>,
    pub summary: ValuationSummary,
}

/// The full report payload: transactions in range, their cash-flow summary,
/// and optionally the current portfolio valuation.
#[derive(Debug, Clone, Serialize)]
pub struct AccountReport {
    pub transactions: Vec<Transaction>,
    pub cash_flow: CashFlowSummary,
    pub valuation: Option<PortfolioValuation>,
}

/// Single pass over a transaction list, accumulating totals by type.
pub fn cash_flow_summary(transactions: &[Transaction]) -> CashFlowSummary {
    let mut total_deposits = Decimal::ZERO;
    let mut total_withdrawals = Decimal::ZERO;
    let mut total_buys = Decimal::ZERO;
    let mut total_sells = Decimal::ZERO;
    let mut total_fees = Decimal::ZERO;
    let mut total_referrals = Decimal::ZERO;

    for tx in transactions {
        total_fees += tx.fee;

        match tx.tx_type {
            TransactionType::Deposit => total_deposits += tx.amount,
            TransactionType::Withdrawal => total_withdrawals += tx.amount.abs(),
            TransactionType::Buy => total_buys += tx.amount.abs(),
            TransactionType::Sell => total_sells += tx.amount,
            TransactionType::Referral => total_referrals += tx.amount,
        }
    }

    let net_cash_flow = total_deposits + total_referrals + total_sells
        - total_withdrawals
        - total_buys
        - total_fees;

    CashFlowSummary {
        total_deposits,
        total_withdrawals,
        total_buys,
        total_sells,
        total_fees,
        total_referrals,
        net_cash_flow,
    }
}

pub struct ReportAggregator {
    pool: DbPool,
    transactions: TransactionRepository,
    stocks: StockRepository,
    quotes: Arc<dyn QuoteProvider>,
}

impl ReportAggregator {
    pub fn new(pool: DbPool, quotes: Arc<dyn QuoteProvider>) -> Self {
        Self {
            transactions: TransactionRepository::new(pool.clone()),
            stocks: StockRepository::new(pool.clone()),
            pool,
            quotes,
        }
    }

    /// Cash-flow summary over an optionally date-bounded slice of a user's
    /// ledger.
    pub async fn cash_flow(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<CashFlowSummary, EngineError> {
        let transactions = self.transactions.in_range(user_id, from, to).await?;
        Ok(cash_flow_summary(&transactions))
    }

    /// Mark-to-market valuation of every open position.
    pub async fn current_valuation(&self, user_id: &str) -> Result<PortfolioValuation, EngineError> {
        let positions = {
            let mut conn = self.pool.acquire().await?;
            PortfolioManager::positions(&mut conn, user_id).await?
        };

        let mut rows = Vec::with_capacity(positions.len());
        let mut total_value = Decimal::ZERO;
        let mut total_cost = Decimal::ZERO;

        for position in positions {
            let (name, current_price) = self.price_with_fallback(&position.symbol).await?;

            let current_value = current_price * Decimal::from(position.quantity);
            let invested_value = position.invested_value();
            let profit = current_value - invested_value;

            total_value += current_value;
            total_cost += invested_value;

            rows.push(ValuationRow {
                symbol: position.symbol,
                name,
                quantity: position.quantity,
                average_price: position.average_price,
                current_price,
                current_value,
                invested_value,
                profit,
            });
        }

        let total_profit = total_value - total_cost;
        let total_profit_pct = if total_cost > Decimal::ZERO {
            round_money(total_profit / total_cost * Decimal::ONE_HUNDRED)
        } else {
            Decimal::ZERO
        };

        Ok(PortfolioValuation {
            rows,
            summary: ValuationSummary {
                total_cost,
                total_value,
                total_profit,
                total_profit_pct,
            },
        })
    }

    /// The full report payload for a user.
    pub async fn statement(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        include_valuation: bool,
    ) -> Result<AccountReport, EngineError> {
        let transactions = self.transactions.in_range(user_id, from, to).await?;
        let cash_flow = cash_flow_summary(&transactions);
        let valuation = if include_valuation {
            Some(self.current_valuation(user_id).await?)
        } else {
            None
        };

        Ok(AccountReport {
            transactions,
            cash_flow,
            valuation,
        })
    }

    /// Live price for a symbol, degrading to the cached stock price (and
    /// finally zero) when the provider is unavailable.
    async fn price_with_fallback(&self, symbol: &str) -> Result<(String, Decimal), EngineError> {
        let cached = self.stocks.get(symbol).await?;
        let name = cached
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_else(|| crate::domain::entities::stock::Stock::default_name(symbol));

        match self.quotes.get_quote(symbol).await {
            Ok(quote) => Ok((name, round_money(quote.current_price))),
            Err(e) => {
                warn!(
                    "Quote unavailable for {} during valuation, using cached price: {}",
                    symbol, e
                );
                let fallback = cached.map(|s| s.current_price).unwrap_or(Decimal::ZERO);
                Ok((name, fallback))
            }
        }
    }
}
