use thiserror::Error;

/// Input-shape validation failures, rejected before any lookup.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Stock symbol is required")]
    MissingSymbol,

    #[error("Invalid stock symbol format")]
    InvalidSymbol,

    #[error("Quantity must be greater than 0")]
    InvalidQuantity,

    #[error("Valid amount required")]
    InvalidAmount,

    #[error("Invalid date, expected YYYY-MM-DD")]
    InvalidDate,

    #[error("Invalid account status")]
    InvalidStatus,
}

/// Errors produced by the ledger and portfolio mutation engines.
///
/// Validation and business-rule failures are clean rejections with a stable
/// kind; only `Storage` represents an unexpected infrastructure failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Trading not allowed at this time: {0}")]
    MarketClosed(String),

    #[error("Invalid stock symbol: {0}")]
    SymbolNotFound(String),

    #[error("Could not get valid stock price: {0}")]
    QuoteUnavailable(String),

    #[error("Invalid stock price")]
    InvalidPrice,

    #[error("Insufficient balance")]
    InsufficientFunds,

    #[error("Insufficient shares")]
    InsufficientShares,

    #[error("You do not own this stock")]
    PositionNotFound,

    #[error("You have already used a referral code")]
    ReferralAlreadyUsed,

    #[error("You cannot use your own referral code")]
    SelfReferral,

    #[error("Invalid or inactive referral code")]
    InvalidReferralCode,

    #[error("Account not found")]
    AccountNotFound,

    #[error("Operation conflicted with a concurrent update, retry")]
    Concurrency(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl EngineError {
    /// Stable machine-readable code returned alongside the reason string.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::MarketClosed(_) => "market_closed",
            EngineError::SymbolNotFound(_) => "symbol_not_found",
            EngineError::QuoteUnavailable(_) => "quote_unavailable",
            EngineError::InvalidPrice => "invalid_price",
            EngineError::InsufficientFunds => "insufficient_funds",
            EngineError::InsufficientShares => "insufficient_shares",
            EngineError::PositionNotFound => "position_not_found",
            EngineError::ReferralAlreadyUsed => "referral_already_used",
            EngineError::SelfReferral => "self_referral",
            EngineError::InvalidReferralCode => "invalid_referral_code",
            EngineError::AccountNotFound => "account_not_found",
            EngineError::Concurrency(_) => "concurrency_conflict",
            EngineError::Storage(_) => "storage_failure",
        }
    }

    /// True for rejections the caller can fix or retry, false for
    /// infrastructure failures that should surface as a generic 500.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, EngineError::Storage(_))
    }
}

impl From<crate::persistence::DatabaseError> for EngineError {
    fn from(e: crate::persistence::DatabaseError) -> Self {
        match e {
            crate::persistence::DatabaseError::Busy(msg) => EngineError::Concurrency(msg),
            other => EngineError::Storage(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        EngineError::from(crate::persistence::DatabaseError::from(e))
    }
}
