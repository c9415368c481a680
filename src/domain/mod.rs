//! Core domain types and logic.

pub mod allocation;
pub mod config_validation;
pub mod error;
pub mod execution;
pub mod ledger;
pub mod market_data;
pub mod metrics;
pub mod portfolio;
pub mod position;
pub mod position_book;
pub mod signal;
pub mod simulation;
pub mod universe;
pub mod volatility;
