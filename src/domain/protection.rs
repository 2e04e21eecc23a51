//! Automatic stop-loss / take-profit attached to a strategy's position.

use super::candle::Candle;
use super::position::NetPosition;
use super::security::Security;

/// A distance from the entry price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Unit {
    Absolute(f64),
    Percent(f64),
    Pips(f64),
}

impl Unit {
    pub fn distance(&self, entry_price: f64, security: &Security) -> f64 {
        match *self {
            Unit::Absolute(d) => d,
            Unit::Percent(pct) => entry_price * pct / 100.0,
            Unit::Pips(pips) => security.pips_to_price(pips),
        }
    }

    fn is_set(&self) -> bool {
        let raw = match *self {
            Unit::Absolute(v) | Unit::Percent(v) | Unit::Pips(v) => v,
        };
        raw > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Protection {
    pub take_profit: Option<Unit>,
    pub stop_loss: Option<Unit>,
    pub trailing: bool,
}

impl Protection {
    /// Zero distances mean "not set", the same as `None`.
    pub fn new(take_profit: Unit, stop_loss: Unit) -> Self {
        Protection {
            take_profit: take_profit.is_set().then_some(take_profit),
            stop_loss: stop_loss.is_set().then_some(stop_loss),
            trailing: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.take_profit.is_none() && self.stop_loss.is_none()
    }
}

/// Which protective level closed the position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProtectionExit {
    StopLoss(f64),
    TakeProfit(f64),
}

impl ProtectionExit {
    pub fn price(&self) -> f64 {
        match *self {
            ProtectionExit::StopLoss(p) | ProtectionExit::TakeProfit(p) => p,
        }
    }
}

/// Runtime state for an active `Protection`: remembers the best price seen
/// since the position opened so a trailing stop can follow it.
#[derive(Debug, Clone)]
pub struct ProtectionTracker {
    protection: Protection,
    best_price: Option<f64>,
    long: bool,
}

impl ProtectionTracker {
    pub fn new(protection: Protection) -> Self {
        ProtectionTracker {
            protection,
            best_price: None,
            long: true,
        }
    }

    pub fn protection(&self) -> &Protection {
        &self.protection
    }

    /// Re-anchor after a fill. A fresh or flipped position starts trailing
    /// from its average price.
    pub fn on_position_change(&mut self, position: &NetPosition) {
        if position.is_flat() {
            self.best_price = None;
            return;
        }
        let long = position.is_long();
        if self.best_price.is_none() || long != self.long {
            self.best_price = Some(position.avg_price);
            self.long = long;
        }
    }

    /// Check the levels against `bar`. The stop is tested first, so a bar
    /// that spans both levels counts as a loss.
    pub fn check(
        &mut self,
        position: &NetPosition,
        bar: &Candle,
        security: &Security,
    ) -> Option<ProtectionExit> {
        if position.is_flat() {
            return None;
        }
        let entry = position.avg_price;
        let best = self.best_price.unwrap_or(entry);
        let anchor = if self.protection.trailing { best } else { entry };

        let exit = if position.is_long() {
            let stop = self
                .protection
                .stop_loss
                .map(|u| anchor - u.distance(entry, security))
                .filter(|&level| bar.low <= level)
                .map(|level| ProtectionExit::StopLoss(level.min(bar.open)));
            stop.or_else(|| {
                self.protection
                    .take_profit
                    .map(|u| entry + u.distance(entry, security))
                    .filter(|&level| bar.high >= level)
                    .map(|level| ProtectionExit::TakeProfit(level.max(bar.open)))
            })
        } else {
            let stop = self
                .protection
                .stop_loss
                .map(|u| anchor + u.distance(entry, security))
                .filter(|&level| bar.high >= level)
                .map(|level| ProtectionExit::StopLoss(level.max(bar.open)));
            stop.or_else(|| {
                self.protection
                    .take_profit
                    .map(|u| entry - u.distance(entry, security))
                    .filter(|&level| bar.low <= level)
                    .map(|level| ProtectionExit::TakeProfit(level.min(bar.open)))
            })
        };

        if exit.is_none() {
            self.best_price = Some(if position.is_long() {
                best.max(bar.high)
            } else {
                best.min(bar.low)
            });
        }
        exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::CandleState;
    use crate::domain::order::Side;
    use approx::assert_relative_eq;
    use chrono::{NaiveDate, NaiveDateTime};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn security() -> Security {
        Security {
            code: "EURUSD".into(),
            price_step: 0.00001,
            decimals: 5,
            volume_step: 0.01,
            min_volume: 0.01,
            max_volume: 100.0,
        }
    }

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: t0(),
            open,
            high,
            low,
            close,
            volume: 1.0,
            state: CandleState::Finished,
        }
    }

    fn position(side: Side, price: f64) -> NetPosition {
        let mut pos = NetPosition::default();
        pos.apply_fill("EURUSD", side, price, 1.0, 0.0, t0());
        pos
    }

    #[test]
    fn unit_distances() {
        let sec = security();
        assert_relative_eq!(Unit::Absolute(0.5).distance(100.0, &sec), 0.5);
        assert_relative_eq!(Unit::Percent(2.0).distance(100.0, &sec), 2.0);
        assert_relative_eq!(Unit::Pips(30.0).distance(1.1, &sec), 0.003);
    }

    #[test]
    fn zero_units_are_unset() {
        let p = Protection::new(Unit::Pips(0.0), Unit::Pips(0.0));
        assert!(p.is_empty());
    }

    #[test]
    fn long_take_profit_hits() {
        let pos = position(Side::Buy, 1.1000);
        let mut tracker = ProtectionTracker::new(Protection::new(Unit::Pips(20.0), Unit::Pips(20.0)));
        tracker.on_position_change(&pos);
        let exit = tracker.check(&pos, &bar(1.1010, 1.1025, 1.1005, 1.1020), &security());
        assert!(matches!(exit, Some(ProtectionExit::TakeProfit(p)) if (p - 1.1020).abs() < 1e-9));
    }

    #[test]
    fn long_stop_wins_when_bar_spans_both() {
        let pos = position(Side::Buy, 1.1000);
        let mut tracker = ProtectionTracker::new(Protection::new(Unit::Pips(20.0), Unit::Pips(20.0)));
        tracker.on_position_change(&pos);
        let exit = tracker.check(&pos, &bar(1.1000, 1.1030, 1.0970, 1.1000), &security());
        assert!(matches!(exit, Some(ProtectionExit::StopLoss(p)) if (p - 1.0980).abs() < 1e-9));
    }

    #[test]
    fn short_stop_gap_fills_at_open() {
        let pos = position(Side::Sell, 1.1000);
        let mut tracker = ProtectionTracker::new(Protection::new(Unit::Pips(0.0), Unit::Pips(10.0)));
        tracker.on_position_change(&pos);
        let exit = tracker.check(&pos, &bar(1.1050, 1.1060, 1.1040, 1.1055), &security());
        assert_eq!(exit, Some(ProtectionExit::StopLoss(1.1050)));
    }

    #[test]
    fn trailing_stop_follows_best_price() {
        let pos = position(Side::Buy, 100.0);
        let sec = Security {
            price_step: 0.01,
            decimals: 2,
            ..security()
        };
        let mut tracker = ProtectionTracker::new(Protection {
            trailing: true,
            ..Protection::new(Unit::Absolute(0.0), Unit::Absolute(2.0))
        });
        tracker.on_position_change(&pos);

        assert!(tracker.check(&pos, &bar(100.0, 105.0, 99.5, 104.0), &sec).is_none());
        // Best is 105 now, so the stop sits at 103.
        let exit = tracker.check(&pos, &bar(104.0, 104.5, 102.5, 103.0), &sec);
        assert_eq!(exit, Some(ProtectionExit::StopLoss(103.0)));
    }

    #[test]
    fn flat_position_never_exits() {
        let mut tracker = ProtectionTracker::new(Protection::new(Unit::Pips(1.0), Unit::Pips(1.0)));
        let flat = NetPosition::default();
        assert!(tracker.check(&flat, &bar(1.0, 2.0, 0.0, 1.0), &security()).is_none());
    }
}
