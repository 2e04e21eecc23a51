//! Simulated execution host.
//!
//! The `Emulator` is the `TradingPort` strategies talk to during a backtest.
//! Market orders fill at the last price with slippage; limit and stop orders
//! wait for a later source bar; protection exits are checked once per bar.
//! Pending orders are matched one at a time in the order the bar reaches
//! them, so a fill can cancel its sibling before the sibling is tested.

use chrono::NaiveDateTime;
use tracing::{info, warn};

use super::candle::Candle;
use super::order::{MyTrade, Order, OrderId, OrderKind, OrderState, Side};
use super::portfolio::Portfolio;
use super::protection::{Protection, ProtectionExit, ProtectionTracker};
use super::security::Security;
use crate::ports::trading_port::TradingPort;

/// Costs applied to every fill.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionConfig {
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
}

/// Calculate commission: flat_fee + (trade_value * pct / 100).
pub fn calculate_commission(trade_value: f64, config: &ExecutionConfig) -> f64 {
    config.commission_per_trade + (trade_value * config.commission_pct / 100.0)
}

/// Move a market price against the trader: buys pay more, sells get less.
pub fn apply_slippage(market_price: f64, side: Side, slippage_pct: f64) -> f64 {
    market_price * (1.0 + side.sign() * slippage_pct / 100.0)
}

pub struct Emulator {
    security: Security,
    config: ExecutionConfig,
    portfolio: Portfolio,
    orders: Vec<Order>,
    next_id: OrderId,
    last_price: f64,
    now: NaiveDateTime,
    protection: Option<ProtectionTracker>,
    fills: Vec<MyTrade>,
    matchable_below: OrderId,
}

impl Emulator {
    pub fn new(security: Security, config: ExecutionConfig, initial_capital: f64) -> Self {
        Emulator {
            security,
            config,
            portfolio: Portfolio::new(initial_capital),
            orders: Vec::new(),
            next_id: 1,
            last_price: 0.0,
            now: NaiveDateTime::default(),
            protection: None,
            fills: Vec::new(),
            matchable_below: 0,
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn into_portfolio(self) -> Portfolio {
        self.portfolio
    }

    pub fn set_market(&mut self, time: NaiveDateTime, price: f64) {
        self.now = time;
        self.last_price = price;
    }

    /// Start a new source bar: protection on the position carried into the
    /// bar is checked, and the orders pending right now become matchable
    /// against it. Orders submitted later wait for the next bar.
    pub fn open_bar(&mut self, bar: &Candle) {
        self.now = bar.open_time;
        self.matchable_below = self.next_id;

        let exit = match self.protection.as_mut() {
            Some(tracker) => tracker.check(&self.portfolio.position, bar, &self.security),
            None => None,
        };
        if let Some(exit) = exit {
            let volume = self.portfolio.position.volume;
            let side = if volume > 0.0 { Side::Sell } else { Side::Buy };
            let id = self.allocate_id();
            match exit {
                ProtectionExit::StopLoss(price) => {
                    info!(code = %self.security.code, %side, price, "protection stop-loss hit")
                }
                ProtectionExit::TakeProfit(price) => {
                    info!(code = %self.security.code, %side, price, "protection take-profit hit")
                }
            }
            self.fill(id, side, exit.price(), volume.abs());
        }
    }

    /// Fill the matchable order the bar reaches first, walking open, nearer
    /// extreme, farther extreme. Returns false once nothing else fills, so
    /// the caller can hand each fill to the strategy before the next match.
    pub fn fill_next_order(&mut self, bar: &Candle) -> bool {
        let limit = self.matchable_below;
        let first = self
            .orders
            .iter()
            .enumerate()
            .filter(|(_, order)| order.id < limit)
            .filter_map(|(i, order)| order.path_offset(bar).map(|offset| (i, offset)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        let Some((index, _)) = first else {
            return false;
        };
        let order = self.orders.remove(index);
        match order.match_bar(bar) {
            Some(price) => {
                self.fill(order.id, order.side, price, order.volume);
                true
            }
            None => false,
        }
    }

    /// Own trades produced since the last call, oldest first.
    pub fn take_fills(&mut self) -> Vec<MyTrade> {
        std::mem::take(&mut self.fills)
    }

    pub fn record_equity(&mut self) {
        let equity = self.portfolio.total_equity(self.last_price);
        self.portfolio.record_equity(self.now, equity);
    }

    fn allocate_id(&mut self) -> OrderId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn fill(&mut self, order_id: OrderId, side: Side, price: f64, volume: f64) {
        let commission = calculate_commission(price * volume, &self.config);
        self.portfolio.apply_fill(
            &self.security.code,
            side,
            price,
            volume,
            commission,
            self.now,
        );
        info!(
            code = %self.security.code,
            order_id,
            %side,
            price,
            volume,
            position = self.portfolio.position.volume,
            "fill"
        );
        if let Some(tracker) = self.protection.as_mut() {
            tracker.on_position_change(&self.portfolio.position);
        }
        self.fills.push(MyTrade {
            order_id,
            side,
            price,
            volume,
            commission,
            time: self.now,
        });
    }

    fn submit(&mut self, side: Side, kind: OrderKind, price: f64, volume: f64) -> Option<OrderId> {
        let volume = self.security.normalize_volume(volume);
        if volume <= 0.0 {
            warn!(code = %self.security.code, %side, ?kind, "order rejected: volume normalises to zero");
            return None;
        }

        if kind == OrderKind::Market {
            if self.last_price <= 0.0 {
                warn!(code = %self.security.code, %side, "market order rejected: no price yet");
                return None;
            }
            let id = self.allocate_id();
            let price = apply_slippage(self.last_price, side, self.config.slippage_pct);
            self.fill(id, side, price, volume);
            return Some(id);
        }

        if !price.is_finite() || price <= 0.0 {
            warn!(code = %self.security.code, %side, ?kind, price, "order rejected: invalid price");
            return None;
        }
        let id = self.allocate_id();
        self.orders.push(Order {
            id,
            side,
            kind,
            price: self.security.normalize_price(price),
            volume,
            state: OrderState::Active,
            time: self.now,
        });
        Some(id)
    }
}

impl TradingPort for Emulator {
    fn security(&self) -> &Security {
        &self.security
    }

    fn current_time(&self) -> NaiveDateTime {
        self.now
    }

    fn last_price(&self) -> f64 {
        self.last_price
    }

    fn position(&self) -> f64 {
        if self.portfolio.position.is_flat() {
            0.0
        } else {
            self.portfolio.position.volume
        }
    }

    fn position_price(&self) -> f64 {
        self.portfolio.position.avg_price
    }

    fn portfolio_value(&self) -> f64 {
        self.portfolio.total_equity(self.last_price)
    }

    fn realized_pnl(&self) -> f64 {
        self.portfolio.realized_pnl()
    }

    fn buy_market(&mut self, volume: f64) -> Option<OrderId> {
        self.submit(Side::Buy, OrderKind::Market, 0.0, volume)
    }

    fn sell_market(&mut self, volume: f64) -> Option<OrderId> {
        self.submit(Side::Sell, OrderKind::Market, 0.0, volume)
    }

    fn buy_limit(&mut self, price: f64, volume: f64) -> Option<OrderId> {
        self.submit(Side::Buy, OrderKind::Limit, price, volume)
    }

    fn sell_limit(&mut self, price: f64, volume: f64) -> Option<OrderId> {
        self.submit(Side::Sell, OrderKind::Limit, price, volume)
    }

    fn buy_stop(&mut self, price: f64, volume: f64) -> Option<OrderId> {
        self.submit(Side::Buy, OrderKind::Stop, price, volume)
    }

    fn sell_stop(&mut self, price: f64, volume: f64) -> Option<OrderId> {
        self.submit(Side::Sell, OrderKind::Stop, price, volume)
    }

    fn cancel_order(&mut self, id: OrderId) -> bool {
        let before = self.orders.len();
        self.orders.retain(|o| o.id != id);
        self.orders.len() != before
    }

    fn cancel_active_orders(&mut self) -> usize {
        let cancelled = self.orders.len();
        self.orders.clear();
        cancelled
    }

    fn active_orders(&self) -> Vec<Order> {
        self.orders.clone()
    }

    fn start_protection(&mut self, protection: Protection) {
        if protection.is_empty() {
            return;
        }
        let mut tracker = ProtectionTracker::new(protection);
        tracker.on_position_change(&self.portfolio.position);
        self.protection = Some(tracker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::CandleState;
    use crate::domain::protection::Unit;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn t(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn security() -> Security {
        Security {
            code: "TEST".into(),
            price_step: 0.01,
            decimals: 2,
            volume_step: 1.0,
            min_volume: 1.0,
            max_volume: 1000.0,
        }
    }

    fn make_config() -> ExecutionConfig {
        ExecutionConfig {
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
        }
    }

    fn emulator() -> Emulator {
        let mut emu = Emulator::new(security(), make_config(), 10_000.0);
        emu.set_market(t(9), 100.0);
        emu
    }

    fn bar(h: u32, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: t(h),
            open,
            high,
            low,
            close,
            volume: 1.0,
            state: CandleState::Finished,
        }
    }

    fn run_bar(emu: &mut Emulator, bar: &Candle) {
        emu.open_bar(bar);
        while emu.fill_next_order(bar) {}
    }

    #[test]
    fn calculate_commission_basic() {
        let config = ExecutionConfig {
            commission_per_trade: 10.0,
            commission_pct: 0.1,
            slippage_pct: 0.0,
        };
        assert!((calculate_commission(10000.0, &config) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn slippage_is_adverse() {
        assert_relative_eq!(apply_slippage(100.0, Side::Buy, 0.05), 100.05);
        assert_relative_eq!(apply_slippage(100.0, Side::Sell, 0.05), 99.95);
    }

    #[test]
    fn market_order_fills_at_last_price_with_slippage() {
        let mut emu = Emulator::new(
            security(),
            ExecutionConfig {
                slippage_pct: 1.0,
                ..make_config()
            },
            10_000.0,
        );
        emu.set_market(t(9), 100.0);
        let id = emu.buy_market(2.0).unwrap();
        let fills = emu.take_fills();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].order_id, id);
        assert_relative_eq!(fills[0].price, 101.0);
        assert_relative_eq!(emu.position(), 2.0);
        assert_relative_eq!(emu.position_price(), 101.0);
    }

    #[test]
    fn zero_volume_is_rejected() {
        let mut emu = emulator();
        assert!(emu.buy_market(0.4).is_none());
        assert!(emu.sell_limit(101.0, 0.0).is_none());
        assert!(emu.take_fills().is_empty());
        assert!(emu.active_orders().is_empty());
    }

    #[test]
    fn pending_orders_wait_for_next_bar() {
        let mut emu = emulator();
        let id = emu.buy_limit(99.0, 1.0).unwrap();
        assert!(emu.take_fills().is_empty());
        assert_eq!(emu.active_orders().len(), 1);

        run_bar(&mut emu, &bar(10, 100.0, 100.5, 98.0, 99.5));
        let fills = emu.take_fills();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].order_id, id);
        assert_relative_eq!(fills[0].price, 99.0);
        assert_eq!(fills[0].time, t(10));
        assert!(emu.active_orders().is_empty());
    }

    #[test]
    fn stop_orders_trigger_through_level() {
        let mut emu = emulator();
        emu.buy_stop(101.0, 1.0).unwrap();
        emu.sell_stop(99.0, 1.0).unwrap();
        run_bar(&mut emu, &bar(10, 100.0, 100.8, 99.2, 100.0));
        assert!(emu.take_fills().is_empty());

        run_bar(&mut emu, &bar(11, 100.0, 101.5, 99.5, 101.2));
        let fills = emu.take_fills();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].side, Side::Buy);
        assert_eq!(emu.active_orders().len(), 1);
    }

    #[test]
    fn nearer_stop_fills_first_and_sibling_can_be_cancelled() {
        let mut emu = emulator();
        let sell = emu.sell_stop(99.0, 1.0).unwrap();
        let buy = emu.buy_stop(101.0, 1.0).unwrap();
        // Opens closer to the high, so the buy stop is reached first.
        let wide = bar(10, 100.0, 101.5, 98.0, 100.0);
        emu.open_bar(&wide);

        assert!(emu.fill_next_order(&wide));
        let fills = emu.take_fills();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].order_id, buy);
        assert!(emu.cancel_order(sell));

        assert!(!emu.fill_next_order(&wide));
        assert!(emu.take_fills().is_empty());
        assert_relative_eq!(emu.position(), 1.0);
    }

    #[test]
    fn both_stops_fill_in_path_order_when_left_alone() {
        let mut emu = emulator();
        let buy = emu.buy_stop(101.0, 1.0).unwrap();
        let sell = emu.sell_stop(99.0, 1.0).unwrap();
        // Opens closer to the low: the sell stop comes first.
        run_bar(&mut emu, &bar(10, 100.0, 102.0, 98.8, 100.0));
        let ids: Vec<OrderId> = emu.take_fills().iter().map(|f| f.order_id).collect();
        assert_eq!(ids, vec![sell, buy]);
        assert!(emu.is_flat());
    }

    #[test]
    fn orders_placed_mid_bar_wait_for_the_next_bar() {
        let mut emu = emulator();
        let b = bar(10, 100.0, 100.5, 98.0, 99.5);
        emu.open_bar(&b);
        emu.buy_limit(99.0, 1.0).unwrap();
        assert!(!emu.fill_next_order(&b));
        assert_eq!(emu.active_orders().len(), 1);

        run_bar(&mut emu, &bar(11, 99.5, 99.8, 98.5, 99.0));
        assert_eq!(emu.take_fills().len(), 1);
    }

    #[test]
    fn cancel_order_and_cancel_all() {
        let mut emu = emulator();
        let a = emu.buy_limit(95.0, 1.0).unwrap();
        emu.sell_limit(105.0, 1.0).unwrap();
        emu.sell_stop(90.0, 1.0).unwrap();
        assert!(emu.cancel_order(a));
        assert!(!emu.cancel_order(a));
        assert_eq!(emu.cancel_active_orders(), 2);
        assert!(emu.active_orders().is_empty());
    }

    #[test]
    fn close_position_flattens() {
        let mut emu = emulator();
        emu.sell_market(3.0).unwrap();
        emu.set_market(t(10), 90.0);
        assert_relative_eq!(emu.unrealized_pnl(), 30.0);
        emu.close_position().unwrap();
        assert!(emu.is_flat());
        assert_relative_eq!(emu.realized_pnl(), 30.0);
        assert_eq!(emu.portfolio().closed_trades.len(), 1);
        assert!(emu.close_position().is_none());
    }

    #[test]
    fn protection_stop_closes_position() {
        let mut emu = emulator();
        emu.start_protection(Protection::new(Unit::Absolute(5.0), Unit::Absolute(2.0)));
        emu.buy_market(1.0).unwrap();
        emu.take_fills();

        run_bar(&mut emu, &bar(10, 99.5, 100.0, 97.0, 97.5));
        let fills = emu.take_fills();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].side, Side::Sell);
        assert_relative_eq!(fills[0].price, 98.0);
        assert!(emu.is_flat());
        assert_relative_eq!(emu.realized_pnl(), -2.0);
    }

    #[test]
    fn protection_skips_position_opened_on_the_same_bar() {
        let mut emu = emulator();
        emu.start_protection(Protection::new(Unit::Absolute(0.0), Unit::Absolute(1.0)));
        emu.buy_limit(99.0, 1.0).unwrap();
        // Fills at 99 and trades down to 97 within the same bar.
        run_bar(&mut emu, &bar(10, 100.0, 100.0, 97.0, 97.5));
        assert!(emu.position() > 0.0);
        run_bar(&mut emu, &bar(11, 97.5, 98.0, 97.0, 97.5));
        assert!(emu.is_flat());
    }

    #[test]
    fn commission_charged_on_each_fill() {
        let mut emu = Emulator::new(
            security(),
            ExecutionConfig {
                commission_per_trade: 1.0,
                commission_pct: 0.1,
                slippage_pct: 0.0,
            },
            10_000.0,
        );
        emu.set_market(t(9), 100.0);
        emu.buy_market(10.0).unwrap();
        // 1 + 1000 * 0.1%
        assert_relative_eq!(emu.portfolio().commissions, 2.0);
        assert_relative_eq!(emu.portfolio_value(), 9_998.0);
    }

    #[test]
    fn record_equity_marks_to_last_price() {
        let mut emu = emulator();
        emu.buy_market(10.0).unwrap();
        emu.set_market(t(10), 101.0);
        emu.record_equity();
        let point = emu.portfolio().equity_curve.last().unwrap();
        assert_eq!(point.time, t(10));
        assert_relative_eq!(point.equity, 10_010.0);
    }
}
