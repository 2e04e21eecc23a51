//! Opening range breakout.
//!
//! The first `range_candles` candles from `session_start_hour` form the
//! range. A buy stop above and a sell stop below are then placed as an OCO
//! pair; everything is flattened at `session_end_hour`.

use chrono::{NaiveDate, Timelike};
use tracing::{debug, info};

use crate::domain::candle::Candle;
use crate::domain::error::StratError;
use crate::domain::order::{MyTrade, OrderId};
use crate::domain::param::{Param, StrategyParam};
use crate::domain::strategy::Strategy;
use crate::domain::timeframe::Timeframe;
use crate::ports::trading_port::TradingPort;
use crate::{param_refs, param_refs_mut};

use super::protect_pips;

#[derive(Debug, Default)]
struct Session {
    day: Option<NaiveDate>,
    high: f64,
    low: f64,
    collected: usize,
    buy_order: Option<OrderId>,
    sell_order: Option<OrderId>,
    closed: bool,
}

impl Session {
    fn start(day: NaiveDate) -> Self {
        Session {
            day: Some(day),
            high: f64::MIN,
            low: f64::MAX,
            ..Session::default()
        }
    }
}

pub struct OpeningRangeBreakout {
    candle_type: StrategyParam<Timeframe>,
    session_start_hour: StrategyParam<u32>,
    session_end_hour: StrategyParam<u32>,
    range_candles: StrategyParam<usize>,
    offset_pips: StrategyParam<f64>,
    volume: StrategyParam<f64>,
    stop_loss_pips: StrategyParam<f64>,
    take_profit_pips: StrategyParam<f64>,

    session: Session,
}

impl OpeningRangeBreakout {
    pub fn new() -> Self {
        OpeningRangeBreakout {
            candle_type: StrategyParam::new("candle_type", Timeframe::M15)
                .set_display("Candle type", "Timeframe of the working candles", "General"),
            session_start_hour: StrategyParam::new("session_start_hour", 8)
                .set_display("Session start", "Hour the opening range starts", "Session"),
            session_end_hour: StrategyParam::new("session_end_hour", 17)
                .set_display("Session end", "Hour all orders and positions are closed", "Session"),
            range_candles: StrategyParam::new("range_candles", 4)
                .set_display("Range candles", "Candles that form the opening range", "Session")
                .set_greater_than_zero()
                .set_can_optimize(2, 8, 2),
            offset_pips: StrategyParam::new("offset_pips", 2.0)
                .set_display("Offset", "Distance of the entry stops beyond the range", "Trading")
                .set_can_optimize(0.0, 10.0, 2.0),
            volume: StrategyParam::new("volume", 1.0)
                .set_display("Volume", "Order volume", "Trading")
                .set_greater_than_zero(),
            stop_loss_pips: StrategyParam::new("stop_loss_pips", 30.0)
                .set_display("Stop loss", "Stop-loss distance in pips, 0 disables", "Risk"),
            take_profit_pips: StrategyParam::new("take_profit_pips", 60.0)
                .set_display("Take profit", "Take-profit distance in pips, 0 disables", "Risk"),
            session: Session::default(),
        }
    }

    fn flatten(&mut self, host: &mut dyn TradingPort) {
        let cancelled = host.cancel_active_orders();
        if host.close_position().is_some() || cancelled > 0 {
            info!(cancelled, "session end, flattening");
        }
        self.session.buy_order = None;
        self.session.sell_order = None;
        self.session.closed = true;
    }
}

impl Default for OpeningRangeBreakout {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for OpeningRangeBreakout {
    fn id(&self) -> &'static str {
        "opening_range_breakout"
    }

    fn title(&self) -> &'static str {
        "Opening range breakout"
    }

    fn params(&self) -> Vec<&dyn Param> {
        param_refs![
            self.candle_type,
            self.session_start_hour,
            self.session_end_hour,
            self.range_candles,
            self.offset_pips,
            self.volume,
            self.stop_loss_pips,
            self.take_profit_pips,
        ]
    }

    fn params_mut(&mut self) -> Vec<&mut dyn Param> {
        param_refs_mut![
            self.candle_type,
            self.session_start_hour,
            self.session_end_hour,
            self.range_candles,
            self.offset_pips,
            self.volume,
            self.stop_loss_pips,
            self.take_profit_pips,
        ]
    }

    fn timeframe(&self) -> Timeframe {
        self.candle_type.value()
    }

    fn on_started(&mut self, host: &mut dyn TradingPort) -> Result<(), StratError> {
        let (start, end) = (self.session_start_hour.value(), self.session_end_hour.value());
        if end > 24 || start >= end {
            return Err(StratError::invalid_state(format!(
                "session hours must satisfy start < end <= 24, got {start}..{end}"
            )));
        }
        self.session = Session::default();
        protect_pips(
            host,
            self.take_profit_pips.value(),
            self.stop_loss_pips.value(),
        );
        Ok(())
    }

    fn on_candle(&mut self, candle: &Candle, host: &mut dyn TradingPort) {
        if !candle.is_finished() {
            return;
        }
        let day = candle.open_time.date();
        let hour = candle.open_time.hour();

        if self.session.day != Some(day) {
            if self.session.day.is_some() && !self.session.closed {
                self.flatten(host);
            }
            self.session = Session::start(day);
        }
        if self.session.closed {
            return;
        }
        if hour >= self.session_end_hour.value() {
            self.flatten(host);
            return;
        }
        if hour < self.session_start_hour.value() {
            return;
        }

        let wanted = self.range_candles.value();
        if self.session.collected >= wanted {
            return;
        }
        self.session.high = self.session.high.max(candle.high);
        self.session.low = self.session.low.min(candle.low);
        self.session.collected += 1;
        if self.session.collected < wanted {
            return;
        }

        let offset = host.security().pips_to_price(self.offset_pips.value());
        let volume = self.volume.value();
        let (high, low) = (self.session.high, self.session.low);
        debug!(high, low, "opening range formed");
        self.session.buy_order = host.buy_stop(high + offset, volume);
        self.session.sell_order = host.sell_stop(low - offset, volume);
        info!(
            buy = high + offset,
            sell = low - offset,
            "placed opening range stops"
        );
    }

    fn on_own_trade(&mut self, trade: &MyTrade, host: &mut dyn TradingPort) {
        let other = if Some(trade.order_id) == self.session.buy_order {
            self.session.sell_order.take()
        } else if Some(trade.order_id) == self.session.sell_order {
            self.session.buy_order.take()
        } else {
            return;
        };
        self.session.buy_order = None;
        self.session.sell_order = None;
        if let Some(id) = other {
            if host.cancel_order(id) {
                debug!(order_id = id, "cancelled opposite range order");
            }
        }
    }
}
