//! Host surface strategies trade through.

use chrono::NaiveDateTime;

use crate::domain::order::{Order, OrderId};
use crate::domain::protection::Protection;
use crate::domain::security::Security;

/// Order placement and account queries available to a running strategy.
///
/// Volumes are normalised by the host against the security's volume rules;
/// an order whose volume normalises to zero is rejected and `None` returned.
pub trait TradingPort {
    fn security(&self) -> &Security;
    fn current_time(&self) -> NaiveDateTime;
    fn last_price(&self) -> f64;

    /// Signed net volume: positive long, negative short.
    fn position(&self) -> f64;
    /// Average entry price of the open position, zero when flat.
    fn position_price(&self) -> f64;
    fn portfolio_value(&self) -> f64;
    /// Settled PnL since the start of the run, commissions included.
    fn realized_pnl(&self) -> f64;

    fn buy_market(&mut self, volume: f64) -> Option<OrderId>;
    fn sell_market(&mut self, volume: f64) -> Option<OrderId>;
    fn buy_limit(&mut self, price: f64, volume: f64) -> Option<OrderId>;
    fn sell_limit(&mut self, price: f64, volume: f64) -> Option<OrderId>;
    fn buy_stop(&mut self, price: f64, volume: f64) -> Option<OrderId>;
    fn sell_stop(&mut self, price: f64, volume: f64) -> Option<OrderId>;

    fn cancel_order(&mut self, id: OrderId) -> bool;
    /// Cancel every pending order; returns how many were cancelled.
    fn cancel_active_orders(&mut self) -> usize;
    fn active_orders(&self) -> Vec<Order>;

    fn start_protection(&mut self, protection: Protection);

    /// Flatten the position with a market order.
    fn close_position(&mut self) -> Option<OrderId> {
        let position = self.position();
        if position > 0.0 {
            self.sell_market(position)
        } else if position < 0.0 {
            self.buy_market(-position)
        } else {
            None
        }
    }

    fn unrealized_pnl(&self) -> f64 {
        let position = self.position();
        if position == 0.0 {
            0.0
        } else {
            position * (self.last_price() - self.position_price())
        }
    }

    fn is_flat(&self) -> bool {
        self.position() == 0.0
    }
}
