//! stratbook: a catalogue of candle-driven trading strategies and the
//! backtest host they run on.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], and the strategy catalogue in
//! [`strategies`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod strategies;
pub mod cli;
