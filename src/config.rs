use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::persistence::DatabaseConfig;

/// Application configuration. Fee rate and bonus amounts are explicit
/// values handed to the engines at construction, never free-floating
/// constants, so tests and deployments can vary them.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database: DatabaseConfig,
    pub finnhub_api_key: String,
    pub finnhub_base_url: String,
    pub quote_timeout_secs: u64,
    pub fee_rate: Decimal,
    pub referrer_bonus: Decimal,
    pub referee_bonus: Decimal,
    pub sell_requires_open_market: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database: DatabaseConfig::default(),
            finnhub_api_key: String::new(),
            finnhub_base_url: "https://finnhub.io/api/v1".to_string(),
            quote_timeout_secs: 10,
            fee_rate: Decimal::new(1, 2),        // 1%
            referrer_bonus: Decimal::new(800, 2), // $8.00
            referee_bonus: Decimal::new(500, 2),  // $5.00
            sell_requires_open_market: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or out of range.
    pub fn from_env() -> AppConfig {
        let mut config = AppConfig::default();

        config.database = DatabaseConfig::from_env();

        if let Ok(addr) = std::env::var("BIND_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(value) => config.bind_addr = value,
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse BIND_ADDR '{}': {}, using default: {}",
                        addr,
                        e,
                        config.bind_addr
                    );
                }
            }
        }

        if let Ok(key) = std::env::var("FINNHUB_API_KEY") {
            config.finnhub_api_key = key;
        }

        if let Ok(url) = std::env::var("FINNHUB_BASE_URL") {
            if !url.is_empty() {
                config.finnhub_base_url = url;
            }
        }

        if let Ok(timeout) = std::env::var("QUOTE_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(value) if (1..=60).contains(&value) => {
                    config.quote_timeout_secs = value;
                }
                Ok(value) => {
                    tracing::warn!(
                        "Invalid QUOTE_TIMEOUT_SECS value: {} (must be between 1 and 60), using default: {}",
                        value, config.quote_timeout_secs
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse QUOTE_TIMEOUT_SECS '{}': {}, using default: {}",
                        timeout,
                        e,
                        config.quote_timeout_secs
                    );
                }
            }
        }

        if let Ok(rate) = std::env::var("TRANSACTION_FEE_RATE") {
            match Decimal::from_str(&rate) {
                Ok(value) if value >= Decimal::ZERO && value < Decimal::ONE => {
                    config.fee_rate = value;
                }
                Ok(value) => {
                    tracing::warn!(
                        "Invalid TRANSACTION_FEE_RATE value: {} (must be in [0, 1)), using default: {}",
                        value, config.fee_rate
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse TRANSACTION_FEE_RATE '{}': {}, using default: {}",
                        rate,
                        e,
                        config.fee_rate
                    );
                }
            }
        }

        if let Ok(bonus) = std::env::var("REFERRER_BONUS") {
            if let Ok(value) = Decimal::from_str(&bonus) {
                if value > Decimal::ZERO {
                    config.referrer_bonus = value;
                }
            }
        }

        if let Ok(bonus) = std::env::var("REFEREE_BONUS") {
            if let Ok(value) = Decimal::from_str(&bonus) {
                if value > Decimal::ZERO {
                    config.referee_bonus = value;
                }
            }
        }

        if let Ok(gated) = std::env::var("SELL_REQUIRES_OPEN_MARKET") {
            config.sell_requires_open_market = gated.to_lowercase() == "true" || gated == "1";
        }

        config
    }
}
