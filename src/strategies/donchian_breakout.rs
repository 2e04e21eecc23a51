//! Donchian channel breakout with an ATR stop that trails the best close.

use ta::indicators::{AverageTrueRange, Maximum, Minimum};
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

/// Stop state of an open breakout trade.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TrailState {
    distance: f64,
    best_close: f64,
    stop: f64,
}

pub struct DonchianBreakout {
    candle_type: StrategyParam<Timeframe>,
    channel_period: StrategyParam<usize>,
    atr_period: StrategyParam<usize>,
    atr_multiplier: StrategyParam<f64>,
    volume: StrategyParam<f64>,

    highest: Option<Formed<Maximum>>,
    lowest: Option<Formed<Minimum>>,
    atr: Option<Formed<AverageTrueRange>>,
    /// Channel of the candles before the current one.
    channel: Option<(f64, f64)>,
    trail: Option<TrailState>,
}

impl DonchianBreakout {
    pub fn new() -> Self {
        DonchianBreakout {
            candle_type: StrategyParam::new("candle_type", Timeframe::H4)
                .set_display("Candle type", "Timeframe of the working candles", "General"),
            channel_period: StrategyParam::new("channel_period", 20)
                .set_display("Channel period", "Candles in the Donchian channel", "Channel")
                .set_greater_than_zero()
                .set_can_optimize(10, 55, 5),
            atr_period: StrategyParam::new("atr_period", 14)
                .set_display("ATR period", "Average true range length", "Risk")
                .set_greater_than_zero(),
            atr_multiplier: StrategyParam::new("atr_multiplier", 2.0)
                .set_display("ATR multiplier", "Stop distance in ATRs", "Risk")
                .set_greater_than_zero()
                .set_can_optimize(1.0, 4.0, 0.5),
            volume: StrategyParam::new("volume", 1.0)
                .set_display("Volume", "Order volume", "Trading")
                .set_greater_than_zero(),
            highest: None,
            lowest: None,
            atr: None,
            channel: None,
            trail: None,
        }
    }

    /// Trail the stop behind the best close; true when the close hit it.
    fn stop_hit(&mut self, close: f64, long: bool) -> bool {
        let Some(trail) = self.trail.as_mut() else {
            return false;
        };
        if long {
            trail.best_close = trail.best_close.max(close);
            trail.stop = trail.stop.max(trail.best_close - trail.distance);
            close <= trail.stop
        } else {
            trail.best_close = trail.best_close.min(close);
            trail.stop = trail.stop.min(trail.best_close + trail.distance);
            close >= trail.stop
        }
    }
}

impl Default for DonchianBreakout {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for DonchianBreakout {
    fn id(&self) -> &'static str {
        "donchian_breakout"
    }

    fn title(&self) -> &'static str {
        "Donchian channel breakout"
    }

    fn params(&self) -> Vec<&dyn Param> {
        param_refs![
            self.candle_type,
            self.channel_period,
            self.atr_period,
            self.atr_multiplier,
            self.volume,
        ]
    }

    fn params_mut(&mut self) -> Vec<&mut dyn Param> {
        param_refs_mut![
            self.candle_type,
            self.channel_period,
            self.atr_period,
            self.atr_multiplier,
            self.volume,
        ]
    }

    fn timeframe(&self) -> Timeframe {
        self.candle_type.value()
    }

    fn on_started(&mut self, _host: &mut dyn TradingPort) -> Result<(), StratError> {
        let period = self.channel_period.value();
        self.highest = Some(Formed::new(Maximum::new(period)?, period));
        self.lowest = Some(Formed::new(Minimum::new(period)?, period));
        self.atr = Some(Formed::new(
            AverageTrueRange::new(self.atr_period.value())?,
            self.atr_period.value(),
        ));
        self.channel = None;
        self.trail = None;
        Ok(())
    }

    fn on_candle(&mut self, candle: &Candle, host: &mut dyn TradingPort) {
        if !candle.is_finished() {
            return;
        }
        let (Some(highest), Some(lowest), Some(atr_ind)) =
            (self.highest.as_mut(), self.lowest.as_mut(), self.atr.as_mut())
        else {
            return;
        };
        let atr = atr_ind.next(candle);
        let upper = highest.next(candle);
        let lower = lowest.next(candle);
        let atr_formed = atr_ind.is_formed();
        let prev_channel = if highest.is_formed() && lowest.is_formed() {
            self.channel.replace((upper, lower))
        } else {
            None
        };

        let close = candle.close;
        let position = host.position();
        if position == 0.0 {
            self.trail = None;
        } else {
            if self.stop_hit(close, position > 0.0) {
                info!(close, stop = ?self.trail.map(|t| t.stop), "trailing ATR stop hit, exiting");
                host.close_position();
                self.trail = None;
            }
            return;
        }

        let Some((upper, lower)) = prev_channel else {
            return;
        };
        if !atr_formed {
            return;
        }
        debug!(upper, lower, atr, "channel");

        let distance = atr * self.atr_multiplier.value();
        let volume = self.volume.value();
        if close > upper {
            info!(close, upper, "breakout above channel, buying");
            if host.buy_market(volume).is_some() {
                self.trail = Some(TrailState {
                    distance,
                    best_close: close,
                    stop: close - distance,
                });
            }
        } else if close < lower {
            info!(close, lower, "breakout below channel, selling");
            if host.sell_market(volume).is_some() {
                self.trail = Some(TrailState {
                    distance,
                    best_close: close,
                    stop: close + distance,
                });
            }
        }
    }
}
