use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Reference entity for a traded instrument. Upserted lazily the first time
/// a symbol is traded; `current_price` is a cache of the last quote seen and
/// serves as the valuation fallback when the provider is unavailable.
#[derive(Debug, Clone, Serialize)]
pub struct Stock {
    pub symbol: String,
    pub name: String,
    pub currency: String,
    pub exchange: String,
    pub sector: Option<String>,
    pub market_cap: Option<i64>,
    pub current_price: Decimal,
    pub is_active: bool,
    pub last_updated: DateTime<Utc>,
}

impl Stock {
    /// Placeholder name used until a company profile is available.
    pub fn default_name(symbol: &str) -> String {
        format!("{} Corporation", symbol)
    }
}
