//! TradingEngine - buy/sell orchestration over the ledger
//!
//! Each operation validates input, consults the trading calendar, resolves
//! the instrument and price through the quote provider, then runs a single
//! atomic unit of work over {stock upsert, portfolio change, balance change,
//! ledger append}. Lock order inside the unit of work is fixed across all
//! operations (stock, then portfolio, then balance) so concurrent trades
//! cannot deadlock. Notifications go out after commit and never affect the
//! result.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::entities::account::Account;
use crate::domain::entities::portfolio::round_money;
use crate::domain::entities::transaction::{NewTransaction, TransactionType};
use crate::domain::errors::EngineError;
use crate::domain::repositories::notifier::{Notification, Notifier};
use crate::domain::repositories::quote_provider::{QuoteError, QuoteProvider, StockProfile};
use crate::domain::services::balance_manager::BalanceManager;
use crate::domain::services::market_hours::MarketCalendar;
use crate::domain::services::portfolio_manager::PortfolioManager;
use crate::domain::value_objects::quantity::Quantity;
use crate::domain::value_objects::symbol::Symbol;
use crate::persistence::repository::{StockRepository, TransactionRepository};
use crate::persistence::DbPool;

/// Per-operation market-hours policy. Buys are always gated; whether sells
/// are is a deployment decision.
#[derive(Debug, Clone, Copy)]
pub struct TradingPolicy {
    pub sell_requires_open_market: bool,
}

impl Default for TradingPolicy {
    fn default() -> Self {
        Self {
            sell_requires_open_market: true,
        }
    }
}

/// Outcome of a committed trade.
#[derive(Debug, Clone)]
pub struct TradeExecution {
    pub transaction_id: String,
    pub symbol: String,
    pub stock_name: String,
    pub quantity: i64,
    pub price: Decimal,
    /// Total cost for buys, total revenue for sells. Always positive.
    pub total: Decimal,
    pub new_balance: Decimal,
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct TradingEngine {
    pool: DbPool,
    stocks: StockRepository,
    quotes: Arc<dyn QuoteProvider>,
    notifier: Arc<dyn Notifier>,
    policy: TradingPolicy,
    clock: Clock,
}

impl TradingEngine {
    pub fn new(
        pool: DbPool,
        quotes: Arc<dyn QuoteProvider>,
        notifier: Arc<dyn Notifier>,
        policy: TradingPolicy,
    ) -> Self {
        Self {
            stocks: StockRepository::new(pool.clone()),
            pool,
            quotes,
            notifier,
            policy,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock, pinning the trading calendar in tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Buy `quantity` shares of `symbol` at the current quote.
    pub async fn buy(
        &self,
        account: &Account,
        symbol: &str,
        quantity: i64,
        source_ip: Option<String>,
    ) -> Result<TradeExecution, EngineError> {
        let symbol = Symbol::parse(symbol)?;
        let quantity = Quantity::new(quantity)?;

        MarketCalendar::ensure_open((self.clock)())?;

        let price = self.resolve_price(&symbol).await?;
        let total_cost = price * Decimal::from(quantity.value());

        // Cheap early rejection only; the atomic debit below re-validates.
        {
            let mut conn = self.pool.acquire().await?;
            let balance = BalanceManager::fetch_or_create(&mut conn, &account.id).await?;
            if balance < total_cost {
                return Err(EngineError::InsufficientFunds);
            }
        }

        // First sight of a symbol pulls the company profile. Doing it here
        // keeps every network call outside the atomic scope.
        let profile = self.profile_if_unseen(&symbol).await?;

        let mut tx = self.pool.begin().await?;
        let stock = StockRepository::upsert_traded(
            &mut tx,
            symbol.as_str(),
            price,
            profile.as_ref(),
        )
        .await?;
        let position = PortfolioManager::apply_buy(
            &mut tx,
            &account.id,
            symbol.as_str(),
            quantity.value(),
            price,
        )
        .await?;
        let new_balance = BalanceManager::debit(&mut tx, &account.id, total_cost).await?;
        let ledger_entry = TransactionRepository::append(
            &mut tx,
            NewTransaction {
                user_id: account.id.clone(),
                tx_type: TransactionType::Buy,
                symbol: Some(symbol.as_str().to_string()),
                quantity: quantity.value(),
                price,
                amount: -total_cost,
                fee: Decimal::ZERO,
                reference: None,
                source_ip,
            },
        )
        .await?;
        tx.commit().await?;

        info!(
            "Buy committed: {} x{} @ {} for {} (position x{}, balance {})",
            symbol,
            quantity,
            price,
            account.username,
            position.quantity,
            new_balance
        );

        let notification = Notification::BuyConfirmed {
            symbol: symbol.as_str().to_string(),
            stock_name: stock.name.clone(),
            quantity: quantity.value(),
            price,
            total_cost,
        };
        if let Err(e) = self.notifier.notify(account, notification).await {
            warn!("Buy confirmation notification failed for {}: {}", account.username, e);
        }

        Ok(TradeExecution {
            transaction_id: ledger_entry.id,
            symbol: symbol.as_str().to_string(),
            stock_name: stock.name,
            quantity: quantity.value(),
            price,
            total: total_cost,
            new_balance,
        })
    }

    /// Sell `quantity` shares of `symbol` at the current quote.
    pub async fn sell(
        &self,
        account: &Account,
        symbol: &str,
        quantity: i64,
        source_ip: Option<String>,
    ) -> Result<TradeExecution, EngineError> {
        let symbol = Symbol::parse(symbol)?;
        let quantity = Quantity::new(quantity)?;

        if self.policy.sell_requires_open_market {
            MarketCalendar::ensure_open((self.clock)())?;
        }

        // Cheap early rejection; apply_sell inside the transaction is the
        // source of truth for share coverage.
        {
            let mut conn = self.pool.acquire().await?;
            let held = PortfolioManager::position(&mut conn, &account.id, symbol.as_str())
                .await?
                .ok_or(EngineError::PositionNotFound)?;
            if held.quantity < quantity.value() {
                return Err(EngineError::InsufficientShares);
            }
        }

        let price = self.resolve_price(&symbol).await?;
        let total_revenue = price * Decimal::from(quantity.value());

        let mut tx = self.pool.begin().await?;
        let stock =
            StockRepository::upsert_traded(&mut tx, symbol.as_str(), price, None).await?;
        let (position, _outcome) = PortfolioManager::apply_sell(
            &mut tx,
            &account.id,
            symbol.as_str(),
            quantity.value(),
        )
        .await?;
        let new_balance = BalanceManager::credit(&mut tx, &account.id, total_revenue).await?;
        let ledger_entry = TransactionRepository::append(
            &mut tx,
            NewTransaction {
                user_id: account.id.clone(),
                tx_type: TransactionType::Sell,
                symbol: Some(symbol.as_str().to_string()),
                quantity: quantity.value(),
                price,
                amount: total_revenue,
                fee: Decimal::ZERO,
                reference: None,
                source_ip,
            },
        )
        .await?;
        tx.commit().await?;

        info!(
            "Sell committed: {} x{} @ {} for {} (position x{}, balance {})",
            symbol,
            quantity,
            price,
            account.username,
            position.quantity,
            new_balance
        );

        let notification = Notification::SellConfirmed {
            symbol: symbol.as_str().to_string(),
            stock_name: stock.name.clone(),
            quantity: quantity.value(),
            price,
            total_revenue,
        };
        if let Err(e) = self.notifier.notify(account, notification).await {
            warn!("Sell confirmation notification failed for {}: {}", account.username, e);
        }

        Ok(TradeExecution {
            transaction_id: ledger_entry.id,
            symbol: symbol.as_str().to_string(),
            stock_name: stock.name,
            quantity: quantity.value(),
            price,
            total: total_revenue,
            new_balance,
        })
    }

    /// Validate the instrument and fetch its execution price, rounded to
    /// currency precision.
    async fn resolve_price(&self, symbol: &Symbol) -> Result<Decimal, EngineError> {
        self.quotes
            .validate_symbol(symbol.as_str())
            .await
            .map_err(map_quote_error)?;

        let quote = self
            .quotes
            .get_quote(symbol.as_str())
            .await
            .map_err(map_quote_error)?;

        let price = round_money(quote.current_price);
        if price <= Decimal::ZERO {
            return Err(EngineError::InvalidPrice);
        }
        Ok(price)
    }

    /// Company profile for a symbol we have not traded before; `None` when
    /// the stock row already exists or the provider has nothing. Profile
    /// failures degrade to the placeholder name rather than blocking the
    /// trade.
    async fn profile_if_unseen(
        &self,
        symbol: &Symbol,
    ) -> Result<Option<StockProfile>, EngineError> {
        if self.stocks.get(symbol.as_str()).await?.is_some() {
            return Ok(None);
        }

        match self.quotes.get_profile(symbol.as_str()).await {
            Ok(profile) => Ok(profile),
            Err(e) => {
                warn!("Profile fetch failed for {}: {}", symbol, e);
                Ok(None)
            }
        }
    }
}

fn map_quote_error(e: QuoteError) -> EngineError {
    match e {
        QuoteError::SymbolNotFound(reason) => EngineError::SymbolNotFound(reason),
        QuoteError::InvalidPrice => EngineError::InvalidPrice,
        QuoteError::RateLimited | QuoteError::Timeout | QuoteError::Transport(_) => {
            EngineError::QuoteUnavailable(e.to_string())
        }
    }
}
