pub mod account_service;
pub mod balance_manager;
pub mod cash_engine;
pub mod market_hours;
pub mod portfolio_manager;
pub mod referral_engine;
pub mod report_aggregator;
pub mod trading_engine;
