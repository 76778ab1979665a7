//! Quote Provider Trait
//!
//! Common interface for market-data sources. The engines depend on this
//! abstraction only, which keeps trading logic independent of the concrete
//! provider and enables mocking in tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

pub type QuoteResult<T> = Result<T, QuoteError>;

/// Errors that can occur while fetching market data.
#[derive(Debug, Error, Clone)]
pub enum QuoteError {
    /// The symbol does not exist or is not tradable.
    #[error("Symbol not found or invalid: {0}")]
    SymbolNotFound(String),

    /// The provider answered but the price is unusable.
    #[error("Invalid price returned by provider")]
    InvalidPrice,

    /// Provider-side rate limit; safe to retry later.
    #[error("Quote provider rate limit exceeded")]
    RateLimited,

    /// The request did not complete within the configured timeout.
    #[error("Quote request timed out")]
    Timeout,

    /// Transport or protocol failure, treated as transient.
    #[error("Quote provider error: {0}")]
    Transport(String),
}

/// A point-in-time quote for an instrument. The execution price used by the
/// engines is `current_price`; the remaining fields are informational.
#[derive(Debug, Clone)]
pub struct Quote {
    pub current_price: Decimal,
    pub change: f64,
    pub percent_change: f64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub previous_close: f64,
}

/// Company profile metadata, used to enrich the stock reference row the
/// first time a symbol is traded.
#[derive(Debug, Clone)]
pub struct StockProfile {
    pub name: String,
    pub exchange: String,
    pub currency: String,
    pub sector: Option<String>,
    pub market_cap: Option<i64>,
}

/// External market-data source.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Fetch the current quote for a symbol. A nonexistent symbol is an
    /// error, never an all-zero quote.
    async fn get_quote(&self, symbol: &str) -> QuoteResult<Quote>;

    /// Check that a symbol exists and is actively traded.
    async fn validate_symbol(&self, symbol: &str) -> QuoteResult<()>;

    /// Fetch company profile metadata. `None` when the provider has no
    /// profile for an otherwise valid symbol.
    async fn get_profile(&self, symbol: &str) -> QuoteResult<Option<StockProfile>>;
}
