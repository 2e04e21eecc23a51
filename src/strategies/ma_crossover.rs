//! Moving-average crossover with an optional manual trailing stop.

use tracing::{debug, info};

use crate::domain::candle::Candle;
use crate::domain::error::StratError;
use crate::domain::indicator::{Formed, MaKind, MovingAverage};
use crate::domain::param::{Param, StrategyParam};
use crate::domain::strategy::Strategy;
use crate::domain::timeframe::Timeframe;
use crate::ports::trading_port::TradingPort;
use crate::{param_refs, param_refs_mut};
use ta::Next;

use super::{crossed_above, crossed_below, protect_pips};

pub struct MaCrossover {
    candle_type: StrategyParam<Timeframe>,
    fast_period: StrategyParam<usize>,
    fast_ma_kind: StrategyParam<MaKind>,
    slow_period: StrategyParam<usize>,
    slow_ma_kind: StrategyParam<MaKind>,
    volume: StrategyParam<f64>,
    stop_loss_pips: StrategyParam<f64>,
    take_profit_pips: StrategyParam<f64>,
    trailing_stop_pips: StrategyParam<f64>,
    trailing_step_pips: StrategyParam<f64>,

    fast: Option<Formed<MovingAverage>>,
    slow: Option<Formed<MovingAverage>>,
    prev: Option<(f64, f64)>,
    trailing_stop: Option<f64>,
}

impl MaCrossover {
    pub fn new() -> Self {
        MaCrossover {
            candle_type: StrategyParam::new("candle_type", Timeframe::H1)
                .set_display("Candle type", "Timeframe of the working candles", "General"),
            fast_period: StrategyParam::new("fast_period", 10)
                .set_display("Fast period", "Fast moving average length", "Indicators")
                .set_greater_than_zero()
                .set_can_optimize(5, 20, 5),
            fast_ma_kind: StrategyParam::new("fast_ma_kind", MaKind::Simple)
                .set_display("Fast MA type", "Smoothing of the fast average", "Indicators")
                .set_can_optimize(MaKind::Simple, MaKind::Weighted, MaKind::Simple),
            slow_period: StrategyParam::new("slow_period", 30)
                .set_display("Slow period", "Slow moving average length", "Indicators")
                .set_greater_than_zero()
                .set_can_optimize(20, 60, 10),
            slow_ma_kind: StrategyParam::new("slow_ma_kind", MaKind::Simple)
                .set_display("Slow MA type", "Smoothing of the slow average", "Indicators")
                .set_can_optimize(MaKind::Simple, MaKind::Weighted, MaKind::Simple),
            volume: StrategyParam::new("volume", 1.0)
                .set_display("Volume", "Order volume", "Trading")
                .set_greater_than_zero(),
            stop_loss_pips: StrategyParam::new("stop_loss_pips", 0.0)
                .set_display("Stop loss", "Stop-loss distance in pips, 0 disables", "Risk")
                .set_can_optimize(0.0, 100.0, 20.0),
            take_profit_pips: StrategyParam::new("take_profit_pips", 0.0)
                .set_display("Take profit", "Take-profit distance in pips, 0 disables", "Risk")
                .set_can_optimize(0.0, 200.0, 40.0),
            trailing_stop_pips: StrategyParam::new("trailing_stop_pips", 0.0).set_display(
                "Trailing stop",
                "Trailing stop distance in pips, 0 disables",
                "Risk",
            ),
            trailing_step_pips: StrategyParam::new("trailing_step_pips", 0.0).set_display(
                "Trailing step",
                "Minimum improvement before the trailing stop moves",
                "Risk",
            ),
            fast: None,
            slow: None,
            prev: None,
            trailing_stop: None,
        }
    }

    /// Move the trailing stop and report whether price hit it.
    fn update_trailing(&mut self, candle: &Candle, host: &dyn TradingPort) -> bool {
        let position = host.position();
        if position == 0.0 || self.trailing_stop_pips.value() <= 0.0 {
            self.trailing_stop = None;
            return false;
        }

        let security = host.security();
        let stop = security.pips_to_price(self.trailing_stop_pips.value());
        let step = security.pips_to_price(self.trailing_step_pips.value());
        let entry = host.position_price();
        let close = candle.close;

        if position > 0.0 {
            if close - entry > stop + step
                && self.trailing_stop.is_none_or(|s| s < close - (stop + step))
            {
                self.trailing_stop = Some(close - stop);
                debug!(stop = close - stop, "trailing stop raised");
            }
            self.trailing_stop.is_some_and(|s| close <= s)
        } else {
            if entry - close > stop + step
                && self.trailing_stop.is_none_or(|s| s > close + (stop + step))
            {
                self.trailing_stop = Some(close + stop);
                debug!(stop = close + stop, "trailing stop lowered");
            }
            self.trailing_stop.is_some_and(|s| close >= s)
        }
    }
}

impl Default for MaCrossover {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for MaCrossover {
    fn id(&self) -> &'static str {
        "ma_crossover"
    }

    fn title(&self) -> &'static str {
        "Moving average crossover"
    }

    fn params(&self) -> Vec<&dyn Param> {
        param_refs![
            self.candle_type,
            self.fast_period,
            self.fast_ma_kind,
            self.slow_period,
            self.slow_ma_kind,
            self.volume,
            self.stop_loss_pips,
            self.take_profit_pips,
            self.trailing_stop_pips,
            self.trailing_step_pips,
        ]
    }

    fn params_mut(&mut self) -> Vec<&mut dyn Param> {
        param_refs_mut![
            self.candle_type,
            self.fast_period,
            self.fast_ma_kind,
            self.slow_period,
            self.slow_ma_kind,
            self.volume,
            self.stop_loss_pips,
            self.take_profit_pips,
            self.trailing_stop_pips,
            self.trailing_step_pips,
        ]
    }

    fn timeframe(&self) -> Timeframe {
        self.candle_type.value()
    }

    fn on_started(&mut self, host: &mut dyn TradingPort) -> Result<(), StratError> {
        if self.fast_period.value() >= self.slow_period.value() {
            return Err(StratError::invalid_state(
                "fast period must be shorter than slow period",
            ));
        }
        if self.trailing_stop_pips.value() > 0.0 && self.trailing_step_pips.value() <= 0.0 {
            return Err(StratError::invalid_state(
                "trailing step must be positive when the trailing stop is enabled",
            ));
        }

        self.fast = Some(MovingAverage::formed(
            self.fast_ma_kind.value(),
            self.fast_period.value(),
        )?);
        self.slow = Some(MovingAverage::formed(
            self.slow_ma_kind.value(),
            self.slow_period.value(),
        )?);
        self.prev = None;
        self.trailing_stop = None;

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
        let (Some(fast_ma), Some(slow_ma)) = (self.fast.as_mut(), self.slow.as_mut()) else {
            return;
        };
        let fast = fast_ma.next(candle.close);
        let slow = slow_ma.next(candle.close);
        if !fast_ma.is_formed() || !slow_ma.is_formed() {
            return;
        }
        let prev = self.prev.replace((fast, slow));

        if self.update_trailing(candle, host) {
            info!(price = candle.close, "trailing stop hit, closing position");
            host.close_position();
            self.trailing_stop = None;
            return;
        }

        let Some((prev_fast, prev_slow)) = prev else {
            return;
        };
        debug!(fast, slow, "moving averages");

        let position = host.position();
        let volume = self.volume.value();
        if crossed_above(prev_fast, prev_slow, fast, slow) && position <= 0.0 {
            info!(price = candle.close, "fast crossed above slow, buying");
            if host.buy_market(volume + position.abs()).is_some() {
                self.trailing_stop = None;
            }
        } else if crossed_below(prev_fast, prev_slow, fast, slow) && position >= 0.0 {
            info!(price = candle.close, "fast crossed below slow, selling");
            if host.sell_market(volume + position.abs()).is_some() {
                self.trailing_stop = None;
            }
        }
    }
}
