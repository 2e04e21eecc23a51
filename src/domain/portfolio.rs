//! Portfolio state and equity tracking for a single-security run.

use chrono::NaiveDateTime;

use super::order::Side;
use super::position::{ClosedTrade, NetPosition};

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub time: NaiveDateTime,
    pub equity: f64,
}

/// Cash here is settled equity: initial capital plus realised price PnL
/// minus every commission paid. Open exposure is valued on top of it.
///
/// Realised PnL is summed separately so small trade results keep their
/// precision next to a large capital figure.
#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub realized: f64,
    pub position: NetPosition,
    pub closed_trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
    pub commissions: f64,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            realized: 0.0,
            position: NetPosition::default(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
            commissions: 0.0,
        }
    }

    pub fn apply_fill(
        &mut self,
        code: &str,
        side: Side,
        price: f64,
        volume: f64,
        commission: f64,
        time: NaiveDateTime,
    ) {
        let (price_pnl, trade) = self
            .position
            .apply_fill(code, side, price, volume, commission, time);
        self.cash += price_pnl - commission;
        self.realized += price_pnl - commission;
        self.commissions += commission;
        if let Some(trade) = trade {
            self.record_trade(trade);
        }
    }

    pub fn record_trade(&mut self, trade: ClosedTrade) {
        self.closed_trades.push(trade);
    }

    pub fn record_equity(&mut self, time: NaiveDateTime, equity: f64) {
        self.equity_curve.push(EquityPoint { time, equity });
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized
    }

    pub fn total_equity(&self, price: f64) -> f64 {
        self.cash + self.position.unrealized_pnl(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn t(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn new_portfolio() {
        let portfolio = Portfolio::new(100000.0);
        assert!((portfolio.cash - 100000.0).abs() < f64::EPSILON);
        assert!((portfolio.initial_capital - 100000.0).abs() < f64::EPSILON);
        assert!(portfolio.position.is_flat());
        assert!(portfolio.closed_trades.is_empty());
        assert!(portfolio.equity_curve.is_empty());
    }

    #[test]
    fn commission_reduces_cash_on_entry() {
        let mut portfolio = Portfolio::new(10_000.0);
        portfolio.apply_fill("X", Side::Buy, 100.0, 10.0, 5.0, t(9));
        assert_relative_eq!(portfolio.cash, 9_995.0);
        assert_relative_eq!(portfolio.realized_pnl(), -5.0);
    }

    #[test]
    fn round_trip_records_trade_and_pnl() {
        let mut portfolio = Portfolio::new(10_000.0);
        portfolio.apply_fill("X", Side::Buy, 100.0, 10.0, 1.0, t(9));
        portfolio.apply_fill("X", Side::Sell, 110.0, 10.0, 1.0, t(10));
        assert_eq!(portfolio.closed_trades.len(), 1);
        assert_relative_eq!(portfolio.closed_trades[0].pnl, 98.0);
        assert_relative_eq!(portfolio.cash, 10_098.0);
        assert_relative_eq!(portfolio.commissions, 2.0);
    }

    #[test]
    fn small_losses_keep_precision_against_large_capital() {
        let mut portfolio = Portfolio::new(100_000.0);
        portfolio.apply_fill("X", Side::Buy, 1.25, 1.0, 0.0, t(9));
        portfolio.apply_fill("X", Side::Sell, 1.248, 1.0, 0.0, t(10));
        assert_relative_eq!(portfolio.realized_pnl(), 1.248 - 1.25, max_relative = 1e-12);
    }

    #[test]
    fn total_equity_marks_open_position() {
        let mut portfolio = Portfolio::new(10_000.0);
        portfolio.apply_fill("X", Side::Sell, 50.0, 4.0, 0.0, t(9));
        assert_relative_eq!(portfolio.total_equity(45.0), 10_020.0);
        assert_relative_eq!(portfolio.total_equity(55.0), 9_980.0);
    }

    #[test]
    fn record_equity() {
        let mut portfolio = Portfolio::new(100000.0);
        portfolio.record_equity(t(9), 105000.0);
        assert_eq!(portfolio.equity_curve.len(), 1);
        assert_eq!(portfolio.equity_curve[0].time, t(9));
        assert!((portfolio.equity_curve[0].equity - 105000.0).abs() < f64::EPSILON);
    }
}
