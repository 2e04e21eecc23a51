//! Strategy catalogue and registry.
//!
//! Each strategy lives in its own module and depends only on the
//! `Strategy` trait, the `TradingPort` host, parameters and indicators.

pub mod bollinger_rsi;
pub mod donchian_breakout;
pub mod ichimoku_filter;
pub mod intraday_combo;
pub mod ma_crossover;
pub mod macd_stochastic;
pub mod money_rain;
pub mod opening_range_breakout;
pub mod very_blondie;
pub mod zone_recovery;

use tracing::debug;

use crate::domain::error::StratError;
use crate::domain::protection::{Protection, Unit};
use crate::domain::strategy::Strategy;
use crate::ports::config_port::ConfigPort;
use crate::ports::trading_port::TradingPort;

type Factory = fn() -> Box<dyn Strategy>;

fn boxed<S: Strategy + Default + 'static>() -> Box<dyn Strategy> {
    Box::new(S::default())
}

const CATALOGUE: [(&str, &str, Factory); 10] = [
    ("ma_crossover", "Moving average crossover", boxed::<ma_crossover::MaCrossover>),
    ("macd_stochastic", "MACD + Stochastic", boxed::<macd_stochastic::MacdStochastic>),
    ("ichimoku_filter", "Ichimoku cloud filter", boxed::<ichimoku_filter::IchimokuFilter>),
    ("bollinger_rsi", "Bollinger + RSI mean reversion", boxed::<bollinger_rsi::BollingerRsi>),
    ("donchian_breakout", "Donchian channel breakout", boxed::<donchian_breakout::DonchianBreakout>),
    (
        "opening_range_breakout",
        "Opening range breakout",
        boxed::<opening_range_breakout::OpeningRangeBreakout>,
    ),
    ("zone_recovery", "Zone recovery", boxed::<zone_recovery::ZoneRecovery>),
    ("money_rain", "Money rain recovery", boxed::<money_rain::MoneyRain>),
    ("very_blondie", "Very Blondie grid", boxed::<very_blondie::VeryBlondie>),
    ("intraday_combo", "Intraday indicator combo", boxed::<intraday_combo::IntradayCombo>),
];

/// `(id, title)` of every registered strategy.
pub fn available() -> Vec<(&'static str, &'static str)> {
    CATALOGUE.iter().map(|(id, title, _)| (*id, *title)).collect()
}

/// A strategy with default parameters.
pub fn create(id: &str) -> Result<Box<dyn Strategy>, StratError> {
    let id = id.trim().to_lowercase();
    CATALOGUE
        .iter()
        .find(|(name, _, _)| *name == id)
        .map(|(_, _, factory)| factory())
        .ok_or(StratError::UnknownStrategy(id))
}

/// Set parameters from the `[strategy]` section. Keys that name no
/// parameter are ignored.
pub fn configure(strategy: &mut dyn Strategy, config: &dyn ConfigPort) -> Result<(), StratError> {
    for (key, value) in config.section_entries("strategy") {
        if key == "name" {
            continue;
        }
        let mut params = strategy.params_mut();
        match params.iter_mut().find(|p| p.name() == key) {
            Some(param) => param.set_from_str(&value)?,
            None => debug!(%key, "ignoring unknown strategy key"),
        }
    }
    strategy.validate_params()
}

/// Start protection with pip distances when either is set.
pub(crate) fn protect_pips(host: &mut dyn TradingPort, take_profit: f64, stop_loss: f64) {
    let protection = Protection::new(Unit::Pips(take_profit), Unit::Pips(stop_loss));
    if !protection.is_empty() {
        host.start_protection(protection);
    }
}

/// `a` crossed from at-or-below `b` to above it.
pub(crate) fn crossed_above(prev_a: f64, prev_b: f64, a: f64, b: f64) -> bool {
    prev_a <= prev_b && a > b
}

pub(crate) fn crossed_below(prev_a: f64, prev_b: f64, a: f64, b: f64) -> bool {
    prev_a >= prev_b && a < b
}
