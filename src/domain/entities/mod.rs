pub mod account;
pub mod portfolio;
pub mod referral;
pub mod stock;
pub mod transaction;
