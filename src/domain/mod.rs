//! Core domain types and logic.

pub mod candle;
pub mod timeframe;
pub mod security;
pub mod param;
pub mod indicator;
pub mod order;
pub mod position;
pub mod portfolio;
pub mod protection;
pub mod execution;
pub mod strategy;
pub mod backtest;
pub mod metrics;
pub mod optimize;
pub mod universe;
pub mod config_validation;
pub mod error;
