//! Very Blondie grid averaging.
//!
//! When price stretches `limit_pips` away from the recent extreme, the
//! strategy fades it with a market order plus a ladder of limit orders,
//! doubling the volume on every rung. The basket is closed on a money
//! target, or by a lock-down stop once it has run far enough into profit.

use ta::indicators::{Maximum, Minimum};
use ta::Next;
use tracing::{debug, info};

use crate::domain::candle::Candle;
use crate::domain::error::StratError;
use crate::domain::indicator::Formed;
use crate::domain::param::{Param, StrategyParam};
use crate::domain::strategy::Strategy;
use crate::domain::timeframe::Timeframe;
use crate::ports::trading_port::TradingPort;
use crate::{param_refs, param_refs_mut};

pub struct VeryBlondie {
    candle_type: StrategyParam<Timeframe>,
    period: StrategyParam<usize>,
    limit_pips: StrategyParam<f64>,
    grid_pips: StrategyParam<f64>,
    levels: StrategyParam<usize>,
    volume: StrategyParam<f64>,
    profit_target: StrategyParam<f64>,
    lock_trigger_pips: StrategyParam<f64>,
    lock_pips: StrategyParam<f64>,

    highest: Option<Formed<Maximum>>,
    lowest: Option<Formed<Minimum>>,
    lock_armed: bool,
}

impl VeryBlondie {
    pub fn new() -> Self {
        VeryBlondie {
            candle_type: StrategyParam::new("candle_type", Timeframe::H1)
                .set_display("Candle type", "Timeframe of the working candles", "General"),
            period: StrategyParam::new("period", 60)
                .set_display("Period", "Candles scanned for the recent extreme", "Signal")
                .set_greater_than_zero()
                .set_can_optimize(20, 100, 20),
            limit_pips: StrategyParam::new("limit_pips", 100.0)
                .set_display("Limit", "Stretch from the extreme that triggers entry", "Signal")
                .set_greater_than_zero()
                .set_can_optimize(50.0, 150.0, 25.0),
            grid_pips: StrategyParam::new("grid_pips", 50.0)
                .set_display("Grid step", "Distance between ladder orders", "Grid")
                .set_greater_than_zero(),
            levels: StrategyParam::new("levels", 4)
                .set_display("Levels", "Limit orders in the ladder", "Grid")
                .set_can_optimize(0, 6, 1),
            volume: StrategyParam::new("volume", 1.0)
                .set_display("Volume", "Volume of the first order", "Trading")
                .set_greater_than_zero(),
            profit_target: StrategyParam::new("profit_target", 100.0)
                .set_display("Profit target", "Unrealized profit that closes the basket", "Exit")
                .set_greater_than_zero(),
            lock_trigger_pips: StrategyParam::new("lock_trigger_pips", 30.0)
                .set_display("Lock trigger", "Profit in pips that arms the lock-down stop", "Exit"),
            lock_pips: StrategyParam::new("lock_pips", 10.0)
                .set_display("Lock", "Lock-down stop distance beyond the average price", "Exit"),
            highest: None,
            lowest: None,
            lock_armed: false,
        }
    }

    fn close_basket(&mut self, host: &mut dyn TradingPort) {
        host.cancel_active_orders();
        host.close_position();
        self.lock_armed = false;
    }

    fn open_basket(&mut self, host: &mut dyn TradingPort, long: bool, close: f64) {
        let grid = host.security().pips_to_price(self.grid_pips.value());
        let volume = self.volume.value();
        let entry = if long {
            host.buy_market(volume)
        } else {
            host.sell_market(volume)
        };
        if entry.is_none() {
            return;
        }
        let mut rung_volume = volume;
        for level in 1..=self.levels.value() {
            rung_volume *= 2.0;
            let offset = grid * level as f64;
            if long {
                host.buy_limit(close - offset, rung_volume);
            } else {
                host.sell_limit(close + offset, rung_volume);
            }
        }
        self.lock_armed = false;
        info!(long, close, levels = self.levels.value(), "grid basket opened");
    }
}

impl Default for VeryBlondie {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for VeryBlondie {
    fn id(&self) -> &'static str {
        "very_blondie"
    }

    fn title(&self) -> &'static str {
        "Very Blondie grid"
    }

    fn params(&self) -> Vec<&dyn Param> {
        param_refs![
            self.candle_type,
            self.period,
            self.limit_pips,
            self.grid_pips,
            self.levels,
            self.volume,
            self.profit_target,
            self.lock_trigger_pips,
            self.lock_pips,
        ]
    }

    fn params_mut(&mut self) -> Vec<&mut dyn Param> {
        param_refs_mut![
            self.candle_type,
            self.period,
            self.limit_pips,
            self.grid_pips,
            self.levels,
            self.volume,
            self.profit_target,
            self.lock_trigger_pips,
            self.lock_pips,
        ]
    }

    fn timeframe(&self) -> Timeframe {
        self.candle_type.value()
    }

    fn on_started(&mut self, _host: &mut dyn TradingPort) -> Result<(), StratError> {
        let trigger = self.lock_trigger_pips.value();
        if trigger > 0.0 && self.lock_pips.value() >= trigger {
            return Err(StratError::invalid_state(
                "lock distance must be below the lock trigger",
            ));
        }
        let period = self.period.value();
        self.highest = Some(Formed::new(Maximum::new(period)?, period));
        self.lowest = Some(Formed::new(Minimum::new(period)?, period));
        self.lock_armed = false;
        Ok(())
    }

    fn on_candle(&mut self, candle: &Candle, host: &mut dyn TradingPort) {
        if !candle.is_finished() {
            return;
        }
        let (Some(max_ind), Some(min_ind)) = (self.highest.as_mut(), self.lowest.as_mut()) else {
            return;
        };
        let highest = max_ind.next(candle);
        let lowest = min_ind.next(candle);
        if !max_ind.is_formed() || !min_ind.is_formed() {
            return;
        }

        let close = candle.close;
        let position = host.position();
        let pip = host.security().pip_size();

        if position != 0.0 {
            let profit = host.unrealized_pnl();
            if profit >= self.profit_target.value() {
                info!(profit, "basket profit target reached, closing");
                self.close_basket(host);
                return;
            }

            let avg = host.position_price();
            let long = position > 0.0;
            let pips_in_profit = (if long { close - avg } else { avg - close }) / pip;
            if !self.lock_armed
                && self.lock_trigger_pips.value() > 0.0
                && pips_in_profit > self.lock_trigger_pips.value()
            {
                debug!(avg, pips_in_profit, "lock-down stop armed");
                self.lock_armed = true;
            }
            if self.lock_armed {
                // Re-anchored every candle: ladder fills move the average.
                let lock = self.lock_pips.value() * pip;
                let stop = if long { avg + lock } else { avg - lock };
                let hit = if long { close <= stop } else { close >= stop };
                if hit {
                    info!(close, stop, "lock-down stop hit, closing basket");
                    self.close_basket(host);
                }
            }
            return;
        }

        if !host.active_orders().is_empty() {
            debug!("flat with leftover ladder orders, cancelling");
            host.cancel_active_orders();
        }
        self.lock_armed = false;

        let limit = self.limit_pips.value() * pip;
        if highest - close > limit {
            self.open_basket(host, true, close);
        } else if close - lowest > limit {
            self.open_basket(host, false, close);
        }
    }
}
