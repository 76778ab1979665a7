//! BOLSA Brokerage Simulation Library
//!
//! This library provides the core components for the BOLSA simulated
//! brokerage backend: the transactional ledger and portfolio mutation
//! engine, and the HTTP surface around them.

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
