//! Orders, own trades and the bar-matching rules for pending orders.

use chrono::NaiveDateTime;
use std::fmt;

use super::candle::Candle;

pub type OrderId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("buy"),
            Side::Sell => f.write_str("sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Market,
    Limit,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Active,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub side: Side,
    pub kind: OrderKind,
    /// Zero for market orders.
    pub price: f64,
    pub volume: f64,
    pub state: OrderState,
    pub time: NaiveDateTime,
}

impl Order {
    pub fn is_active(&self) -> bool {
        self.state == OrderState::Active
    }

    /// Price at which a pending order fills on `bar`, if it fills at all.
    ///
    /// Limits fill at their price or better; stops fill at their price or
    /// worse. A bar that opens beyond the level fills at the open.
    pub fn match_bar(&self, bar: &Candle) -> Option<f64> {
        match (self.kind, self.side) {
            (OrderKind::Market, _) => Some(bar.open),
            (OrderKind::Limit, Side::Buy) => (bar.low <= self.price).then(|| self.price.min(bar.open)),
            (OrderKind::Limit, Side::Sell) => {
                (bar.high >= self.price).then(|| self.price.max(bar.open))
            }
            (OrderKind::Stop, Side::Buy) => (bar.high >= self.price).then(|| self.price.max(bar.open)),
            (OrderKind::Stop, Side::Sell) => (bar.low <= self.price).then(|| self.price.min(bar.open)),
        }
    }

    /// How far the price travels inside `bar` before this order triggers.
    /// The bar is walked open, nearer extreme, farther extreme; an order
    /// already through at the open sits at zero.
    pub fn path_offset(&self, bar: &Candle) -> Option<f64> {
        self.match_bar(bar)?;
        let rising = match (self.kind, self.side) {
            (OrderKind::Market, _) => return Some(0.0),
            (OrderKind::Limit, Side::Sell) | (OrderKind::Stop, Side::Buy) => true,
            (OrderKind::Limit, Side::Buy) | (OrderKind::Stop, Side::Sell) => false,
        };
        let up_first = bar.high - bar.open <= bar.open - bar.low;
        let offset = if rising {
            if self.price <= bar.open {
                0.0
            } else if up_first {
                self.price - bar.open
            } else {
                (bar.open - bar.low) + (self.price - bar.low)
            }
        } else if self.price >= bar.open {
            0.0
        } else if up_first {
            (bar.high - bar.open) + (bar.high - self.price)
        } else {
            bar.open - self.price
        };
        Some(offset)
    }
}

/// A fill of one of the strategy's own orders.
#[derive(Debug, Clone, PartialEq)]
pub struct MyTrade {
    pub order_id: OrderId,
    pub side: Side,
    pub price: f64,
    pub volume: f64,
    pub commission: f64,
    pub time: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::CandleState;
    use chrono::NaiveDate;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn order(side: Side, kind: OrderKind, price: f64) -> Order {
        Order {
            id: 1,
            side,
            kind,
            price,
            volume: 1.0,
            state: OrderState::Active,
            time: t0(),
        }
    }

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: t0(),
            open,
            high,
            low,
            close,
            volume: 100.0,
            state: CandleState::Finished,
        }
    }

    #[test]
    fn buy_limit_fills_when_low_touches() {
        let o = order(Side::Buy, OrderKind::Limit, 99.0);
        assert_eq!(o.match_bar(&bar(100.0, 101.0, 98.5, 100.0)), Some(99.0));
        assert_eq!(o.match_bar(&bar(100.0, 101.0, 99.5, 100.0)), None);
    }

    #[test]
    fn buy_limit_gap_down_fills_at_open() {
        let o = order(Side::Buy, OrderKind::Limit, 99.0);
        assert_eq!(o.match_bar(&bar(97.0, 98.0, 96.0, 97.5)), Some(97.0));
    }

    #[test]
    fn sell_limit_fills_when_high_touches() {
        let o = order(Side::Sell, OrderKind::Limit, 101.0);
        assert_eq!(o.match_bar(&bar(100.0, 101.5, 99.0, 100.0)), Some(101.0));
        assert_eq!(o.match_bar(&bar(102.0, 103.0, 101.5, 102.0)), Some(102.0));
        assert_eq!(o.match_bar(&bar(100.0, 100.5, 99.0, 100.0)), None);
    }

    #[test]
    fn buy_stop_triggers_on_high() {
        let o = order(Side::Buy, OrderKind::Stop, 101.0);
        assert_eq!(o.match_bar(&bar(100.0, 101.2, 99.0, 101.0)), Some(101.0));
        assert_eq!(o.match_bar(&bar(102.0, 103.0, 101.5, 102.0)), Some(102.0));
        assert_eq!(o.match_bar(&bar(100.0, 100.9, 99.0, 100.0)), None);
    }

    #[test]
    fn sell_stop_triggers_on_low() {
        let o = order(Side::Sell, OrderKind::Stop, 99.0);
        assert_eq!(o.match_bar(&bar(100.0, 100.5, 98.8, 99.0)), Some(99.0));
        assert_eq!(o.match_bar(&bar(97.0, 98.0, 96.0, 97.0)), Some(97.0));
        assert_eq!(o.match_bar(&bar(100.0, 100.5, 99.1, 100.0)), None);
    }

    #[test]
    fn path_offset_follows_nearer_extreme_first() {
        // Low is nearer the open: down to 99, then up to 102.
        let b = bar(100.0, 102.0, 99.0, 101.0);
        let sell_stop = order(Side::Sell, OrderKind::Stop, 99.5);
        let buy_stop = order(Side::Buy, OrderKind::Stop, 100.5);
        assert!((sell_stop.path_offset(&b).unwrap() - 0.5).abs() < 1e-12);
        assert!((buy_stop.path_offset(&b).unwrap() - 2.5).abs() < 1e-12);
        assert!(order(Side::Buy, OrderKind::Limit, 98.0).path_offset(&b).is_none());
    }

    #[test]
    fn path_offset_is_zero_through_the_open() {
        let b = bar(100.0, 101.0, 99.0, 100.0);
        let through = order(Side::Buy, OrderKind::Limit, 100.5);
        assert_eq!(through.path_offset(&b), Some(0.0));
    }

    #[test]
    fn side_helpers() {
        assert_eq!(Side::Buy.sign(), 1.0);
        assert_eq!(Side::Sell.sign(), -1.0);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.to_string(), "sell");
    }
}
