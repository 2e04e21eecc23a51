//! Backtest engine and event loop.
//!
//! Source bars drive the `Emulator`; the `CandleAggregator` turns them into
//! the strategy's candles. Per source bar: protection is checked, then pending
//! orders fill one at a time in the order the bar's path reaches them, with
//! `on_own_trade` dispatched after each fill. Then the last price moves to the
//! close, candle updates go to `on_candle` and equity is recorded.

use chrono::NaiveDateTime;
use tracing::{debug, info};

use super::candle::Candle;
use super::error::StratError;
use super::execution::{Emulator, ExecutionConfig};
use super::metrics::{combine_equity_curves, CodeResult, Metrics};
use super::portfolio::Portfolio;
use super::position::ClosedTrade;
use super::security::Security;
use super::strategy::Strategy;
use super::timeframe::{CandleAggregator, Timeframe};
use crate::ports::trading_port::TradingPort;

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
    pub risk_free_rate: f64,
    /// Timeframe of the source bars.
    pub timeframe: Timeframe,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 100_000.0,
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
            risk_free_rate: 0.0,
            timeframe: Timeframe::M1,
            start: None,
            end: None,
        }
    }
}

impl BacktestConfig {
    pub fn execution(&self) -> ExecutionConfig {
        ExecutionConfig {
            commission_per_trade: self.commission_per_trade,
            commission_pct: self.commission_pct,
            slippage_pct: self.slippage_pct,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub code: String,
    pub portfolio: Portfolio,
    pub metrics: Metrics,
}

#[derive(Debug, Clone)]
pub struct MultiCodeResult {
    pub code_results: Vec<BacktestResult>,
    pub per_code: Vec<CodeResult>,
    pub aggregate: Metrics,
}

impl MultiCodeResult {
    pub fn closed_trades(&self) -> impl Iterator<Item = &ClosedTrade> {
        self.code_results
            .iter()
            .flat_map(|r| r.portfolio.closed_trades.iter())
    }
}

/// Run one strategy over one security's source bars.
pub fn run_backtest(
    strategy: &mut dyn Strategy,
    security: &Security,
    bars: &[Candle],
    config: &BacktestConfig,
) -> Result<BacktestResult, StratError> {
    if bars.is_empty() {
        return Err(StratError::InsufficientData {
            code: security.code.clone(),
            bars: 0,
            minimum: 1,
        });
    }

    let mut aggregator = CandleAggregator::new(config.timeframe, strategy.timeframe())?;
    let mut emulator = Emulator::new(security.clone(), config.execution(), config.initial_capital);

    emulator.set_market(bars[0].open_time, bars[0].open);
    strategy.on_started(&mut emulator)?;
    info!(
        strategy = strategy.id(),
        code = %security.code,
        bars = bars.len(),
        timeframe = %aggregator.target(),
        "backtest started"
    );

    for bar in bars {
        emulator.open_bar(bar);
        dispatch_fills(strategy, &mut emulator);
        while emulator.fill_next_order(bar) {
            dispatch_fills(strategy, &mut emulator);
        }

        emulator.set_market(bar.open_time, bar.close);
        for candle in aggregator.push(bar) {
            strategy.on_candle(&candle, &mut emulator);
            dispatch_fills(strategy, &mut emulator);
        }

        emulator.record_equity();
    }

    strategy.on_stopped(&mut emulator);
    emulator.cancel_active_orders();
    if emulator.close_position().is_some() {
        debug!(code = %security.code, "closed open position at end of data");
    }
    emulator.take_fills();

    let mut portfolio = emulator.into_portfolio();
    if let (Some(last), Some(bar)) = (portfolio.equity_curve.last_mut(), bars.last()) {
        last.equity = portfolio.cash + portfolio.position.unrealized_pnl(bar.close);
    }

    let metrics = Metrics::compute(&portfolio, config.risk_free_rate);
    info!(
        strategy = strategy.id(),
        code = %security.code,
        trades = portfolio.closed_trades.len(),
        total_return = metrics.total_return,
        "backtest finished"
    );

    Ok(BacktestResult {
        code: security.code.clone(),
        portfolio,
        metrics,
    })
}

/// Run a fresh strategy instance per code and aggregate the results.
pub fn run_multi_code<F>(
    inputs: &[(Security, Vec<Candle>)],
    mut make_strategy: F,
    config: &BacktestConfig,
) -> Result<MultiCodeResult, StratError>
where
    F: FnMut() -> Result<Box<dyn Strategy>, StratError>,
{
    let mut code_results = Vec::with_capacity(inputs.len());
    for (security, bars) in inputs {
        let mut strategy = make_strategy()?;
        code_results.push(run_backtest(strategy.as_mut(), security, bars, config)?);
    }

    let curves: Vec<&[_]> = code_results
        .iter()
        .map(|r| r.portfolio.equity_curve.as_slice())
        .collect();
    let combined = combine_equity_curves(&curves);
    let trades: Vec<ClosedTrade> = code_results
        .iter()
        .flat_map(|r| r.portfolio.closed_trades.iter().cloned())
        .collect();
    let initial_capital = config.initial_capital * code_results.len() as f64;

    Ok(MultiCodeResult {
        per_code: CodeResult::compute_per_code(&trades),
        aggregate: Metrics::from_parts(&combined, &trades, initial_capital, config.risk_free_rate),
        code_results,
    })
}

fn dispatch_fills(strategy: &mut dyn Strategy, emulator: &mut Emulator) {
    loop {
        let fills = emulator.take_fills();
        if fills.is_empty() {
            break;
        }
        for trade in &fills {
            strategy.on_own_trade(trade, emulator);
        }
    }
}
