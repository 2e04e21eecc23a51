//! Performance metrics and statistics.

use std::collections::BTreeMap;

use super::portfolio::{EquityPoint, Portfolio};
use super::position::ClosedTrade;

const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// In equity-curve points.
    pub max_drawdown_duration: i64,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// In hours.
    pub avg_trade_duration: f64,
}

impl Metrics {
    pub fn compute(portfolio: &Portfolio, risk_free_rate: f64) -> Self {
        Self::from_parts(
            &portfolio.equity_curve,
            &portfolio.closed_trades,
            portfolio.initial_capital,
            risk_free_rate,
        )
    }

    pub fn from_parts(
        equity_curve: &[EquityPoint],
        trades: &[ClosedTrade],
        initial_capital: f64,
        risk_free_rate: f64,
    ) -> Self {
        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let years = elapsed_years(equity_curve);
        let annualized_return = if years > 0.0 && total_return.is_finite() && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);

        let periods = periods_per_year(equity_curve, years);
        let period_rf = risk_free_rate / periods;
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(equity_curve, period_rf, periods);

        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_duration_secs = 0i64;

        for trade in trades {
            let pnl = trade.pnl;
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                trades_breakeven += 1;
            }

            total_duration_secs += (trade.exit_time - trade.entry_time).num_seconds();
        }

        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            trades_won as f64 / total_trades as f64
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if trades_won > 0 {
            total_wins / trades_won as f64
        } else {
            0.0
        };

        let avg_loss = if trades_lost > 0 {
            total_losses / trades_lost as f64
        } else {
            0.0
        };

        let avg_trade_duration = if total_trades > 0 {
            total_duration_secs as f64 / 3600.0 / total_trades as f64
        } else {
            0.0
        };

        Metrics {
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            profit_factor,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            avg_trade_duration,
        }
    }
}

/// Per-code trade summary for multi-code runs.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeResult {
    pub code: String,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub total_pnl: f64,
    pub win_rate: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
}

impl CodeResult {
    /// Group trades by code, sorted by code.
    pub fn compute_per_code(trades: &[ClosedTrade]) -> Vec<CodeResult> {
        let mut by_code: BTreeMap<&str, Vec<&ClosedTrade>> = BTreeMap::new();
        for trade in trades {
            by_code.entry(trade.code.as_str()).or_default().push(trade);
        }

        by_code
            .into_iter()
            .map(|(code, trades)| {
                let winning_trades = trades.iter().filter(|t| t.pnl > 0.0).count();
                let losing_trades = trades.iter().filter(|t| t.pnl < 0.0).count();
                let total_pnl = trades.iter().map(|t| t.pnl).sum();
                let largest_win = trades.iter().map(|t| t.pnl).fold(0.0, f64::max);
                let largest_loss = trades.iter().map(|t| t.pnl).fold(0.0, f64::min);
                CodeResult {
                    code: code.to_string(),
                    total_trades: trades.len(),
                    winning_trades,
                    losing_trades,
                    total_pnl,
                    win_rate: winning_trades as f64 / trades.len() as f64,
                    largest_win,
                    largest_loss,
                }
            })
            .collect()
    }
}

/// Sum several equity curves onto their merged timeline. A curve
/// contributes its first value before it starts and its last value after
/// it ends.
pub fn combine_equity_curves(curves: &[&[EquityPoint]]) -> Vec<EquityPoint> {
    let mut timeline: BTreeMap<chrono::NaiveDateTime, f64> = BTreeMap::new();
    for curve in curves {
        for point in *curve {
            timeline.entry(point.time).or_insert(0.0);
        }
    }

    for curve in curves {
        let Some(first) = curve.first() else {
            continue;
        };
        let mut idx = 0;
        let mut current = first.equity;
        for (time, total) in timeline.iter_mut() {
            while idx < curve.len() && curve[idx].time <= *time {
                current = curve[idx].equity;
                idx += 1;
            }
            *total += current;
        }
    }

    timeline
        .into_iter()
        .map(|(time, equity)| EquityPoint { time, equity })
        .collect()
}

fn elapsed_years(equity_curve: &[EquityPoint]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(first), Some(last)) => (last.time - first.time).num_seconds() as f64 / SECONDS_PER_YEAR,
        _ => 0.0,
    }
}

/// Curve sampling frequency, annualised. Falls back to daily when the curve
/// spans no time.
fn periods_per_year(equity_curve: &[EquityPoint], years: f64) -> f64 {
    if years > 0.0 && equity_curve.len() > 1 {
        (equity_curve.len() - 1) as f64 / years
    } else {
        TRADING_DAYS_PER_YEAR
    }
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, i64) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
            current_dd_duration = 0;
        } else if peak > 0.0 && point.equity < peak {
            let dd = (peak - point.equity) / peak;
            max_dd = max_dd.max(dd);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(
    equity_curve: &[EquityPoint],
    period_rf: f64,
    periods_per_year: f64,
) -> (f64, f64) {
    if equity_curve.len() < 2 {
        return (0.0, 0.0);
    }

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            let curr = w[1].equity;
            if prev > 0.0 {
                (curr - prev) / prev
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;

    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let excess_return = mean - period_rf;
    let scale = periods_per_year.sqrt();

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * scale
    } else {
        0.0
    };

    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < period_rf)
        .map(|&r| (r - period_rf).powi(2))
        .sum();
    let downside_stddev = (downside / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * scale
    } else {
        0.0
    };

    (sharpe, sortino)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::Side;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn make_equity_curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                time: start() + Duration::days(i as i64),
                equity: v,
            })
            .collect()
    }

    fn make_portfolio(equity: Vec<f64>, trades: Vec<ClosedTrade>) -> Portfolio {
        let initial = equity.first().copied().unwrap_or(100_000.0);
        let mut portfolio = Portfolio::new(initial);
        for trade in trades {
            portfolio.record_trade(trade);
        }
        for point in make_equity_curve(&equity) {
            portfolio.record_equity(point.time, point.equity);
        }
        portfolio
    }

    fn make_trade(code: &str, pnl: f64, hours: i64) -> ClosedTrade {
        ClosedTrade {
            code: code.to_string(),
            side: Side::Buy,
            volume: 100.0,
            entry_price: 100.0,
            exit_price: 100.0 + pnl / 100.0,
            entry_time: start(),
            exit_time: start() + Duration::hours(hours),
            pnl,
        }
    }

    #[test]
    fn metrics_empty_portfolio() {
        let portfolio = Portfolio::new(100_000.0);
        let metrics = Metrics::compute(&portfolio, 0.05);
        assert!((metrics.total_return - 0.0).abs() < f64::EPSILON);
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.trades_won, 0);
        assert_eq!(metrics.trades_lost, 0);
        assert_eq!(metrics.trades_breakeven, 0);
    }

    #[test]
    fn metrics_total_return_positive() {
        let portfolio = make_portfolio(vec![100_000.0, 110_000.0], vec![]);
        let metrics = Metrics::compute(&portfolio, 0.05);
        assert!((metrics.total_return - 0.10).abs() < 1e-9);
    }

    #[test]
    fn metrics_total_return_negative() {
        let portfolio = make_portfolio(vec![100_000.0, 90_000.0], vec![]);
        let metrics = Metrics::compute(&portfolio, 0.05);
        assert!((metrics.total_return - (-0.10)).abs() < 1e-9);
    }

    #[test]
    fn annualized_return_uses_calendar_time() {
        let year = start() + Duration::seconds(SECONDS_PER_YEAR as i64);
        let curve = vec![
            EquityPoint {
                time: start(),
                equity: 100.0,
            },
            EquityPoint {
                time: year,
                equity: 121.0,
            },
        ];
        let metrics = Metrics::from_parts(&curve, &[], 100.0, 0.0);
        assert!((metrics.annualized_return - 0.21).abs() < 1e-9);

        let two_years = vec![
            curve[0].clone(),
            EquityPoint {
                time: start() + Duration::seconds(2 * SECONDS_PER_YEAR as i64),
                equity: 121.0,
            },
        ];
        let metrics = Metrics::from_parts(&two_years, &[], 100.0, 0.0);
        assert!((metrics.annualized_return - 0.10).abs() < 1e-9);
    }

    #[test]
    fn metrics_trade_stats_wins_and_losses() {
        let trades = vec![
            make_trade("A", 100.0, 5),
            make_trade("B", -50.0, 3),
            make_trade("C", 200.0, 10),
            make_trade("D", 0.0, 1),
        ];
        let portfolio = make_portfolio(vec![100_000.0, 100_250.0], trades);
        let metrics = Metrics::compute(&portfolio, 0.05);

        assert_eq!(metrics.total_trades, 4);
        assert_eq!(metrics.trades_won, 2);
        assert_eq!(metrics.trades_lost, 1);
        assert_eq!(metrics.trades_breakeven, 1);
        assert!((metrics.win_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn metrics_profit_factor() {
        let trades = vec![
            make_trade("A", 100.0, 5),
            make_trade("B", -50.0, 3),
            make_trade("C", 200.0, 10),
        ];
        let portfolio = make_portfolio(vec![100_000.0, 100_250.0], trades);
        let metrics = Metrics::compute(&portfolio, 0.05);

        assert!((metrics.profit_factor - 6.0).abs() < 1e-9);
    }

    #[test]
    fn metrics_avg_and_largest() {
        let trades = vec![
            make_trade("A", 100.0, 5),
            make_trade("B", -60.0, 3),
            make_trade("C", 300.0, 10),
            make_trade("D", -140.0, 2),
        ];
        let portfolio = make_portfolio(vec![100_000.0, 100_200.0], trades);
        let metrics = Metrics::compute(&portfolio, 0.05);

        assert!((metrics.avg_win - 200.0).abs() < 1e-9);
        assert!((metrics.avg_loss - 100.0).abs() < 1e-9);
        assert!((metrics.largest_win - 300.0).abs() < 1e-9);
        assert!((metrics.largest_loss - 140.0).abs() < 1e-9);
    }

    #[test]
    fn metrics_avg_trade_duration_in_hours() {
        let trades = vec![
            make_trade("A", 100.0, 5),
            make_trade("B", -50.0, 10),
            make_trade("C", 200.0, 15),
        ];
        let portfolio = make_portfolio(vec![100_000.0, 100_250.0], trades);
        let metrics = Metrics::compute(&portfolio, 0.05);

        assert!((metrics.avg_trade_duration - 10.0).abs() < 1e-9);
    }

    #[test]
    fn metrics_max_drawdown() {
        let curve = make_equity_curve(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0]);
        let (dd, _) = compute_drawdown(&curve);

        assert!((dd - (110.0 - 80.0) / 110.0).abs() < 1e-9);
    }

    #[test]
    fn metrics_max_drawdown_duration() {
        let curve = make_equity_curve(&[100.0, 110.0, 100.0, 90.0, 85.0, 95.0]);
        let (_, duration) = compute_drawdown(&curve);

        assert_eq!(duration, 4);
    }

    #[test]
    fn metrics_sharpe_ratio_positive() {
        let mut values = vec![100_000.0];
        for i in 1..253 {
            values.push(100_000.0 * (1.0 + 0.001 * (i as f64)));
        }
        let portfolio = make_portfolio(values, vec![]);
        let metrics = Metrics::compute(&portfolio, 0.0);

        assert!(metrics.sharpe_ratio > 0.0);
    }

    #[test]
    fn metrics_sortino_ratio() {
        let curve = make_equity_curve(&[100.0, 101.0, 100.5, 101.5, 100.0, 102.0]);
        let (sharpe, sortino) = compute_risk_adjusted(&curve, 0.0, 365.0);

        assert!(sharpe.is_finite());
        assert!(sortino > 0.0);
    }

    #[test]
    fn periods_per_year_follows_sampling() {
        let daily = make_equity_curve(&[1.0; 366]);
        let years = elapsed_years(&daily);
        assert!((periods_per_year(&daily, years) - 365.25).abs() < 1e-6);
        assert_eq!(periods_per_year(&daily[..1], 0.0), TRADING_DAYS_PER_YEAR);
    }

    #[test]
    fn per_code_summary() {
        let trades = vec![
            make_trade("GBPUSD", 50.0, 1),
            make_trade("EURUSD", 100.0, 1),
            make_trade("EURUSD", -30.0, 1),
        ];
        let results = CodeResult::compute_per_code(&trades);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].code, "EURUSD");
        assert_eq!(results[0].total_trades, 2);
        assert_eq!(results[0].winning_trades, 1);
        assert_eq!(results[0].losing_trades, 1);
        assert!((results[0].total_pnl - 70.0).abs() < 1e-9);
        assert!((results[0].largest_loss + 30.0).abs() < 1e-9);
        assert!((results[1].win_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn combine_curves_forward_fills() {
        let a = make_equity_curve(&[100.0, 110.0, 120.0]);
        let b: Vec<EquityPoint> = make_equity_curve(&[50.0, 40.0, 45.0])
            .into_iter()
            .skip(1)
            .collect();
        let combined = combine_equity_curves(&[a.as_slice(), b.as_slice()]);
        let values: Vec<f64> = combined.iter().map(|p| p.equity).collect();
        assert_eq!(values, vec![140.0, 150.0, 165.0]);
    }

    #[test]
    fn metrics_no_trades() {
        let portfolio = make_portfolio(vec![100_000.0, 110_000.0], vec![]);
        let metrics = Metrics::compute(&portfolio, 0.05);

        assert_eq!(metrics.trades_won, 0);
        assert!((metrics.win_rate - 0.0).abs() < f64::EPSILON);
        assert!((metrics.profit_factor - 0.0).abs() < f64::EPSILON);
        assert!((metrics.avg_trade_duration - 0.0).abs() < f64::EPSILON);
    }
}
