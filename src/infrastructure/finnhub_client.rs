//! Finnhub market-data client
//!
//! Implements the `QuoteProvider` port against the Finnhub REST API. All
//! requests carry a bounded timeout; a timeout or transport failure is a
//! transient error, HTTP 429 is a rate limit, and an all-zero quote body is
//! the provider's way of saying the symbol does not exist.

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::domain::repositories::quote_provider::{
    Quote, QuoteError, QuoteProvider, QuoteResult, StockProfile,
};

pub struct FinnhubClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct QuoteBody {
    #[serde(default)]
    c: f64,
    #[serde(default)]
    d: f64,
    #[serde(default)]
    dp: f64,
    #[serde(default)]
    h: f64,
    #[serde(default)]
    l: f64,
    #[serde(default)]
    o: f64,
    #[serde(default)]
    pc: f64,
}

#[derive(Debug, Deserialize)]
struct ProfileBody {
    name: Option<String>,
    exchange: Option<String>,
    currency: Option<String>,
    #[serde(rename = "finnhubIndustry")]
    finnhub_industry: Option<String>,
    #[serde(rename = "marketCapitalization")]
    market_capitalization: Option<f64>,
}

impl FinnhubClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, QuoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QuoteError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        symbol: &str,
    ) -> QuoteResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let symbol = symbol.to_uppercase();
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol.as_str()), ("token", self.api_key.as_str())])
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(QuoteError::RateLimited),
            status if !status.is_success() => {
                Err(QuoteError::Transport(format!("HTTP {} from {}", status, path)))
            }
            _ => response
                .json::<T>()
                .await
                .map_err(|e| QuoteError::Transport(format!("Invalid response body: {}", e))),
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> QuoteError {
    if e.is_timeout() {
        QuoteError::Timeout
    } else {
        QuoteError::Transport(e.to_string())
    }
}

#[async_trait]
impl QuoteProvider for FinnhubClient {
    async fn get_quote(&self, symbol: &str) -> QuoteResult<Quote> {
        let body: QuoteBody = self.get_json("/quote", symbol).await?;

        // A zero or negative price means the symbol probably does not exist
        if body.c <= 0.0 {
            warn!("Invalid price for symbol {}: {}", symbol, body.c);
            return Err(QuoteError::SymbolNotFound(
                "Symbol not found or invalid".to_string(),
            ));
        }

        // All-zero context fields indicate an invalid symbol as well
        if body.h == 0.0 && body.l == 0.0 && body.o == 0.0 && body.pc == 0.0 {
            warn!("Suspicious data for symbol {}: all zero values", symbol);
            return Err(QuoteError::SymbolNotFound(
                "Symbol not found or invalid".to_string(),
            ));
        }

        let current_price =
            Decimal::try_from(body.c).map_err(|_| QuoteError::InvalidPrice)?;

        Ok(Quote {
            current_price,
            change: body.d,
            percent_change: body.dp,
            high: body.h,
            low: body.l,
            open: body.o,
            previous_close: body.pc,
        })
    }

    async fn validate_symbol(&self, symbol: &str) -> QuoteResult<()> {
        // The quote endpoint is the existence check
        self.get_quote(symbol).await?;

        // The profile distinguishes listed-but-untraded instruments; a
        // missing profile alone does not invalidate the symbol
        match self.get_profile(symbol).await? {
            None => Ok(()),
            Some(profile) => {
                if profile.market_cap.unwrap_or(0) == 0 {
                    Err(QuoteError::SymbolNotFound(
                        "Stock may not be actively traded".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    async fn get_profile(&self, symbol: &str) -> QuoteResult<Option<StockProfile>> {
        let body: ProfileBody = self.get_json("/stock/profile2", symbol).await?;

        let name = match body.name {
            Some(name) if !name.is_empty() => name,
            _ => return Ok(None),
        };

        Ok(Some(StockProfile {
            name,
            exchange: body.exchange.unwrap_or_else(|| "NASDAQ".to_string()),
            currency: body.currency.unwrap_or_else(|| "USD".to_string()),
            sector: body.finnhub_industry.filter(|s| !s.is_empty()),
            market_cap: body.market_capitalization.map(|c| c as i64),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> FinnhubClient {
        FinnhubClient::new(&server.uri(), "test-key", Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_get_quote_happy_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .and(query_param("symbol", "AAPL"))
            .and(query_param("token", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "c": 150.25, "d": 1.5, "dp": 1.0,
                "h": 151.0, "l": 149.0, "o": 149.5, "pc": 148.75
            })))
            .mount(&server)
            .await;

        let quote = client_for(&server).await.get_quote("aapl").await.unwrap();
        assert_eq!(quote.current_price, dec!(150.25));
        assert_eq!(quote.previous_close, 148.75);
    }

    #[tokio::test]
    async fn test_zero_price_is_symbol_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "c": 0.0, "h": 151.0, "l": 149.0, "o": 149.5, "pc": 148.75
            })))
            .mount(&server)
            .await;

        let result = client_for(&server).await.get_quote("ZZZZ").await;
        assert!(matches!(result, Err(QuoteError::SymbolNotFound(_))));
    }

    #[tokio::test]
    async fn test_all_zero_body_is_symbol_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "c": 1.0, "h": 0.0, "l": 0.0, "o": 0.0, "pc": 0.0
            })))
            .mount(&server)
            .await;

        let result = client_for(&server).await.get_quote("ZZZZ").await;
        assert!(matches!(result, Err(QuoteError::SymbolNotFound(_))));
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let result = client_for(&server).await.get_quote("AAPL").await;
        assert!(matches!(result, Err(QuoteError::RateLimited)));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let result = client_for(&server).await.get_quote("AAPL").await;
        assert!(matches!(result, Err(QuoteError::Transport(_))));
    }

    #[tokio::test]
    async fn test_profile_without_name_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stock/profile2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let profile = client_for(&server).await.get_profile("AAPL").await.unwrap();
        assert!(profile.is_none());
    }

    #[tokio::test]
    async fn test_validate_rejects_zero_market_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "c": 5.0, "h": 5.1, "l": 4.9, "o": 5.0, "pc": 5.0
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/stock/profile2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Thinly Traded Corp", "marketCapitalization": 0.0
            })))
            .mount(&server)
            .await;

        let result = client_for(&server).await.validate_symbol("THIN").await;
        assert!(matches!(result, Err(QuoteError::SymbolNotFound(_))));
    }

    #[tokio::test]
    async fn test_validate_accepts_symbol_with_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "c": 150.25, "h": 151.0, "l": 149.0, "o": 149.5, "pc": 148.75
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/stock/profile2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Apple Inc", "exchange": "NASDAQ", "currency": "USD",
                "finnhubIndustry": "Technology", "marketCapitalization": 3000000.0
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(client.validate_symbol("AAPL").await.is_ok());

        let profile = client.get_profile("AAPL").await.unwrap().unwrap();
        assert_eq!(profile.name, "Apple Inc");
        assert_eq!(profile.sector.as_deref(), Some("Technology"));
        assert_eq!(profile.market_cap, Some(3_000_000));
    }
}
