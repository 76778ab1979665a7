//! HTTP surface
//!
//! Thin routing over the engines: request DTOs in, operation contracts out.
//! Business and validation rejections map to structured 400-class responses
//! with a stable error kind; only unexpected storage failures surface as a
//! generic 500.

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::config::AppConfig;
use crate::domain::entities::account::{Account, AccountStatus};
use crate::domain::entities::portfolio::Position;
use crate::domain::entities::transaction::Transaction;
use crate::domain::errors::{EngineError, ValidationError};
use crate::domain::repositories::notifier::Notifier;
use crate::domain::repositories::quote_provider::QuoteProvider;
use crate::domain::services::account_service::AccountService;
use crate::domain::services::balance_manager::BalanceManager;
use crate::domain::services::cash_engine::CashEngine;
use crate::domain::services::portfolio_manager::PortfolioManager;
use crate::domain::services::referral_engine::ReferralEngine;
use crate::domain::services::report_aggregator::{AccountReport, ReportAggregator};
use crate::domain::services::trading_engine::{TradingEngine, TradingPolicy};
use crate::persistence::models::NewAccount;
use crate::persistence::repository::{AccountRepository, TransactionRepository};
use crate::persistence::DbPool;

/// Shared application state: the engines plus the repositories the thin
/// read endpoints consult directly.
pub struct AppState {
    pub pool: DbPool,
    pub accounts: AccountRepository,
    pub transactions: TransactionRepository,
    pub trading: TradingEngine,
    pub cash: CashEngine,
    pub referral: ReferralEngine,
    pub reports: ReportAggregator,
    pub account_service: AccountService,
}

impl AppState {
    pub fn new(
        pool: DbPool,
        config: &AppConfig,
        quotes: Arc<dyn QuoteProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let policy = TradingPolicy {
            sell_requires_open_market: config.sell_requires_open_market,
        };

        Self {
            accounts: AccountRepository::new(pool.clone()),
            transactions: TransactionRepository::new(pool.clone()),
            trading: TradingEngine::new(
                pool.clone(),
                quotes.clone(),
                notifier.clone(),
                policy,
            ),
            cash: CashEngine::new(pool.clone(), notifier.clone(), config.fee_rate),
            referral: ReferralEngine::new(
                pool.clone(),
                notifier.clone(),
                config.referrer_bonus,
                config.referee_bonus,
            ),
            reports: ReportAggregator::new(pool.clone(), quotes),
            account_service: AccountService::new(pool.clone(), notifier),
            pool,
        }
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/trade/buy", post(buy_stock))
        .route("/trade/sell", post(sell_stock))
        .route("/cash/deposit", post(deposit_money))
        .route("/cash/withdraw", post(withdraw_money))
        .route("/referral/use-code", post(use_referral_code))
        .route("/referral/stats", get(get_referral_stats))
        .route("/transactions", get(get_transaction_history))
        .route("/balance", get(get_balance))
        .route("/portfolio", get(get_portfolio))
        .route("/reports/summary", get(get_report_summary))
        .route("/admin/accounts", post(create_account))
        .route("/admin/accounts/:id/status", post(set_account_status))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_account,
        ));

    Router::new()
        .route("/", get(|| async { "BOLSA brokerage simulation is running!" }))
        .route("/health", get(health_check))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .with_state(state)
}

/// Error wrapper mapping engine rejections to HTTP responses.
pub enum ApiError {
    Engine(EngineError),
    Forbidden,
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let engine_error = match self {
            ApiError::Forbidden => {
                return (
                    StatusCode::FORBIDDEN,
                    Json(serde_json::json!({
                        "error": "Admin privileges required",
                        "kind": "forbidden",
                    })),
                )
                    .into_response();
            }
            ApiError::Engine(e) => e,
        };

        let (status, message) = match &engine_error {
            EngineError::Storage(detail) => {
                error!("Storage failure surfaced to API: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            EngineError::Concurrency(_) => (StatusCode::CONFLICT, engine_error.to_string()),
            EngineError::AccountNotFound => (StatusCode::NOT_FOUND, engine_error.to_string()),
            other => (StatusCode::BAD_REQUEST, other.to_string()),
        };

        (
            status,
            Json(serde_json::json!({
                "error": message,
                "kind": engine_error.kind(),
            })),
        )
            .into_response()
    }
}

/// Client address for the ledger's non-repudiation column: first hop of
/// X-Forwarded-For when present, else the peer address.
fn client_ip(headers: &HeaderMap, addr: &SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| addr.ip().to_string())
}

#[derive(Debug, Deserialize)]
pub struct TradeRequest {
    pub symbol: String,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct BuyResponse {
    pub message: String,
    pub total_cost: Decimal,
    pub new_balance: Decimal,
    pub stock_name: String,
    pub market_open: bool,
}

async fn buy_stock(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<Account>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<TradeRequest>,
) -> Result<Json<BuyResponse>, ApiError> {
    let ip = client_ip(&headers, &addr);
    let execution = state
        .trading
        .buy(&account, &request.symbol, request.quantity, Some(ip))
        .await?;

    Ok(Json(BuyResponse {
        message: format!(
            "Successfully bought {} shares of {}",
            execution.quantity, execution.symbol
        ),
        total_cost: execution.total,
        new_balance: execution.new_balance,
        stock_name: execution.stock_name,
        market_open: true,
    }))
}

#[derive(Debug, Serialize)]
pub struct SellResponse {
    pub message: String,
    pub total_revenue: Decimal,
    pub new_balance: Decimal,
    pub market_open: bool,
}

async fn sell_stock(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<Account>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<TradeRequest>,
) -> Result<Json<SellResponse>, ApiError> {
    let ip = client_ip(&headers, &addr);
    let execution = state
        .trading
        .sell(&account, &request.symbol, request.quantity, Some(ip))
        .await?;

    Ok(Json(SellResponse {
        message: format!(
            "Successfully sold {} shares of {}",
            execution.quantity, execution.symbol
        ),
        total_revenue: execution.total,
        new_balance: execution.new_balance,
        market_open: true,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CashRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub transfer_reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DepositResponse {
    pub message: String,
    pub net_amount: Decimal,
    pub fee: Decimal,
    pub new_balance: Decimal,
}

async fn deposit_money(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<Account>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<CashRequest>,
) -> Result<Json<DepositResponse>, ApiError> {
    let ip = client_ip(&headers, &addr);
    let movement = state
        .cash
        .deposit(&account, request.amount, request.transfer_reference, Some(ip))
        .await?;

    Ok(Json(DepositResponse {
        message: format!(
            "Successfully deposited ${} (fee: ${})",
            movement.amount, movement.fee
        ),
        net_amount: movement.amount,
        fee: movement.fee,
        new_balance: movement.new_balance,
    }))
}

#[derive(Debug, Serialize)]
pub struct WithdrawResponse {
    pub message: String,
    pub amount: Decimal,
    pub fee: Decimal,
    pub new_balance: Decimal,
}

async fn withdraw_money(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<Account>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<CashRequest>,
) -> Result<Json<WithdrawResponse>, ApiError> {
    let ip = client_ip(&headers, &addr);
    let movement = state
        .cash
        .withdraw(&account, request.amount, request.transfer_reference, Some(ip))
        .await?;

    Ok(Json(WithdrawResponse {
        message: format!(
            "Successfully withdrew ${} (fee: ${})",
            movement.amount, movement.fee
        ),
        amount: movement.amount,
        fee: movement.fee,
        new_balance: movement.new_balance,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UseReferralRequest {
    pub referral_code: String,
}

#[derive(Debug, Serialize)]
pub struct UseReferralResponse {
    pub message: String,
    pub bonus_received: Decimal,
    pub new_balance: Decimal,
}

async fn use_referral_code(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<Account>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<UseReferralRequest>,
) -> Result<Json<UseReferralResponse>, ApiError> {
    let ip = client_ip(&headers, &addr);
    let outcome = state
        .referral
        .use_code(&account, &request.referral_code, Some(ip))
        .await?;

    Ok(Json(UseReferralResponse {
        message: "Referral code applied successfully".to_string(),
        bonus_received: outcome.bonus_received,
        new_balance: outcome.new_balance,
    }))
}

#[derive(Debug, Serialize)]
pub struct ReferralStatsResponse {
    pub referral_code: Option<String>,
    pub successful_referrals: usize,
    pub total_earnings: Decimal,
    pub has_used_referral: bool,
}

async fn get_referral_stats(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<Account>,
) -> Result<Json<ReferralStatsResponse>, ApiError> {
    let stats = state.referral.stats(&account).await?;

    Ok(Json(ReferralStatsResponse {
        referral_code: stats.referral_code,
        successful_referrals: stats.successful_referrals,
        total_earnings: stats.total_earnings,
        has_used_referral: stats.has_used_referral,
    }))
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<Transaction>,
}

async fn get_transaction_history(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<Account>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let transactions = state
        .transactions
        .history(&account.id)
        .await
        .map_err(EngineError::from)?;

    Ok(Json(TransactionsResponse { transactions }))
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: Decimal,
}

async fn get_balance(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<Account>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let mut conn = state.pool.acquire().await.map_err(EngineError::from)?;
    let balance = BalanceManager::fetch_or_create(&mut conn, &account.id).await?;

    Ok(Json(BalanceResponse { balance }))
}

#[derive(Debug, Serialize)]
pub struct PortfolioResponse {
    pub positions: Vec<Position>,
}

async fn get_portfolio(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<Account>,
) -> Result<Json<PortfolioResponse>, ApiError> {
    let mut conn = state.pool.acquire().await.map_err(EngineError::from)?;
    let positions = PortfolioManager::positions(&mut conn, &account.id).await?;

    Ok(Json(PortfolioResponse { positions }))
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    #[serde(default)]
    pub include_valuation: bool,
}

async fn get_report_summary(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<Account>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<AccountReport>, ApiError> {
    let from = parse_date_bound(query.date_from.as_deref(), NaiveTime::MIN)?;
    let to = parse_date_bound(
        query.date_to.as_deref(),
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap(),
    )?;

    let report = state
        .reports
        .statement(&account.id, from, to, query.include_valuation)
        .await?;

    Ok(Json(report))
}

fn parse_date_bound(
    raw: Option<&str>,
    edge: NaiveTime,
) -> Result<Option<DateTime<Utc>>, ApiError> {
    match raw {
        None => Ok(None),
        Some(raw) => {
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| EngineError::Validation(ValidationError::InvalidDate))?;
            Ok(Some(date.and_time(edge).and_utc()))
        }
    }
}

async fn create_account(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Account>,
    Json(request): Json<NewAccount>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    require_admin(&principal)?;
    let account = state.account_service.create(request).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

async fn set_account_status(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Account>,
    Path(user_id): Path<String>,
    Json(request): Json<SetStatusRequest>,
) -> Result<Json<Account>, ApiError> {
    require_admin(&principal)?;
    let status = AccountStatus::parse(&request.status)
        .ok_or(EngineError::Validation(ValidationError::InvalidStatus))?;

    let account = state.account_service.set_status(&user_id, status).await?;
    Ok(Json(account))
}

fn require_admin(principal: &Account) -> Result<(), ApiError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let database_ok = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();

    Json(serde_json::json!({
        "status": "running",
        "database": database_ok,
    }))
}
