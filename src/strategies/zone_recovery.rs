//! Zone recovery.
//!
//! A cycle opens in the EMA direction. Whenever price crosses the far edge
//! of the recovery zone against the open side, the position is reversed
//! with a larger leg so that one exit at the cycle target clears every
//! earlier loss. After `max_trades` legs the cycle is stopped out.

use ta::indicators::ExponentialMovingAverage;
use ta::Next;
use tracing::{debug, info, warn};

use crate::domain::candle::Candle;
use crate::domain::error::StratError;
use crate::domain::indicator::Formed;
use crate::domain::param::{Param, StrategyParam};
use crate::domain::strategy::Strategy;
use crate::domain::timeframe::Timeframe;
use crate::ports::trading_port::TradingPort;
use crate::{param_refs, param_refs_mut};

#[derive(Debug, Clone, PartialEq)]
struct Cycle {
    /// Buy edge of the zone.
    upper: f64,
    /// Sell edge of the zone.
    lower: f64,
    long: bool,
    leg_volume: f64,
    legs: usize,
    start_realized: f64,
}

impl Cycle {
    fn open(anchor: f64, zone: f64, long: bool, volume: f64, start_realized: f64) -> Self {
        let (upper, lower) = if long {
            (anchor, anchor - zone)
        } else {
            (anchor + zone, anchor)
        };
        Cycle {
            upper,
            lower,
            long,
            leg_volume: volume,
            legs: 1,
            start_realized,
        }
    }

    /// True when `close` sits past the zone edge opposite to the open side.
    fn needs_recovery(&self, close: f64) -> bool {
        if self.long {
            close <= self.lower
        } else {
            close >= self.upper
        }
    }
}

pub struct ZoneRecovery {
    candle_type: StrategyParam<Timeframe>,
    ema_period: StrategyParam<usize>,
    zone_pips: StrategyParam<f64>,
    take_profit_pips: StrategyParam<f64>,
    volume: StrategyParam<f64>,
    multiplier: StrategyParam<f64>,
    max_trades: StrategyParam<usize>,

    ema: Option<Formed<ExponentialMovingAverage>>,
    cycle: Option<Cycle>,
}

impl ZoneRecovery {
    pub fn new() -> Self {
        ZoneRecovery {
            candle_type: StrategyParam::new("candle_type", Timeframe::H1)
                .set_display("Candle type", "Timeframe of the working candles", "General"),
            ema_period: StrategyParam::new("ema_period", 50)
                .set_display("EMA period", "Trend filter for the first leg", "Indicators")
                .set_greater_than_zero()
                .set_can_optimize(20, 100, 20),
            zone_pips: StrategyParam::new("zone_pips", 20.0)
                .set_display("Zone width", "Distance between the recovery edges in pips", "Recovery")
                .set_greater_than_zero()
                .set_can_optimize(10.0, 50.0, 10.0),
            take_profit_pips: StrategyParam::new("take_profit_pips", 40.0)
                .set_display("Take profit", "Cycle target in pips of the base volume", "Recovery")
                .set_greater_than_zero()
                .set_can_optimize(20.0, 80.0, 20.0),
            volume: StrategyParam::new("volume", 1.0)
                .set_display("Volume", "Volume of the first leg", "Trading")
                .set_greater_than_zero(),
            multiplier: StrategyParam::new("multiplier", 2.0)
                .set_display("Multiplier", "Leg volume growth per recovery", "Recovery")
                .set_greater_than_zero()
                .set_can_optimize(1.5, 3.0, 0.5),
            max_trades: StrategyParam::new("max_trades", 6)
                .set_display("Max legs", "Legs before the cycle is stopped out", "Recovery")
                .set_greater_than_zero(),
            ema: None,
            cycle: None,
        }
    }

    fn close_cycle(&mut self, host: &mut dyn TradingPort) {
        host.close_position();
        self.cycle = None;
    }
}

impl Default for ZoneRecovery {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for ZoneRecovery {
    fn id(&self) -> &'static str {
        "zone_recovery"
    }

    fn title(&self) -> &'static str {
        "Zone recovery"
    }

    fn params(&self) -> Vec<&dyn Param> {
        param_refs![
            self.candle_type,
            self.ema_period,
            self.zone_pips,
            self.take_profit_pips,
            self.volume,
            self.multiplier,
            self.max_trades,
        ]
    }

    fn params_mut(&mut self) -> Vec<&mut dyn Param> {
        param_refs_mut![
            self.candle_type,
            self.ema_period,
            self.zone_pips,
            self.take_profit_pips,
            self.volume,
            self.multiplier,
            self.max_trades,
        ]
    }

    fn timeframe(&self) -> Timeframe {
        self.candle_type.value()
    }

    fn on_started(&mut self, _host: &mut dyn TradingPort) -> Result<(), StratError> {
        if self.multiplier.value() <= 1.0 {
            return Err(StratError::invalid_state(
                "recovery multiplier must be above 1",
            ));
        }
        self.ema = Some(Formed::new(
            ExponentialMovingAverage::new(self.ema_period.value())?,
            self.ema_period.value(),
        ));
        self.cycle = None;
        Ok(())
    }

    fn on_candle(&mut self, candle: &Candle, host: &mut dyn TradingPort) {
        if !candle.is_finished() {
            return;
        }
        let Some(ema_ind) = self.ema.as_mut() else {
            return;
        };
        let ema = ema_ind.next(candle.close);
        if !ema_ind.is_formed() {
            return;
        }
        let close = candle.close;
        let pip = host.security().pip_size();
        let base = self.volume.value();

        if self.cycle.is_none() {
            if !host.is_flat() || close == ema {
                return;
            }
            let long = close > ema;
            let start_realized = host.realized_pnl();
            let order = if long {
                host.buy_market(base)
            } else {
                host.sell_market(base)
            };
            if order.is_some() {
                let anchor = host.position_price();
                let zone = self.zone_pips.value() * pip;
                info!(long, anchor, zone, "zone recovery cycle opened");
                self.cycle = Some(Cycle::open(anchor, zone, long, base, start_realized));
            }
            return;
        }
        let Some(cycle) = self.cycle.as_mut() else {
            return;
        };

        if host.is_flat() {
            debug!("position closed outside the cycle, resetting");
            self.cycle = None;
            return;
        }

        let profit = host.realized_pnl() - cycle.start_realized + host.unrealized_pnl();
        let target = self.take_profit_pips.value() * pip * base;
        if profit >= target {
            info!(profit, target, legs = cycle.legs, "cycle target reached, closing");
            self.close_cycle(host);
            return;
        }

        if !cycle.needs_recovery(close) {
            return;
        }
        if cycle.legs >= self.max_trades.value() {
            warn!(legs = cycle.legs, profit, "max legs reached, stopping cycle out");
            self.close_cycle(host);
            return;
        }

        let leg = cycle.leg_volume * self.multiplier.value();
        let order_volume = leg + host.position().abs();
        let max_volume = host.security().max_volume;
        if order_volume > max_volume {
            warn!(
                order_volume,
                max_volume,
                legs = cycle.legs,
                "recovery leg exceeds max volume, stopping cycle out"
            );
            self.close_cycle(host);
            return;
        }
        let order = if cycle.long {
            host.sell_market(order_volume)
        } else {
            host.buy_market(order_volume)
        };
        if order.is_some() {
            cycle.long = !cycle.long;
            cycle.leg_volume = leg;
            cycle.legs += 1;
            info!(
                long = cycle.long,
                leg,
                legs = cycle.legs,
                close,
                "recovery leg opened"
            );
        }
    }
}
