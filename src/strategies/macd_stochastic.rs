//! MACD signal-line crosses confirmed by a slow stochastic.

use ta::indicators::{MovingAverageConvergenceDivergence, SlowStochastic};
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

use super::{crossed_above, crossed_below, protect_pips};

pub struct MacdStochastic {
    candle_type: StrategyParam<Timeframe>,
    macd_fast: StrategyParam<usize>,
    macd_slow: StrategyParam<usize>,
    macd_signal: StrategyParam<usize>,
    stoch_period: StrategyParam<usize>,
    stoch_smooth: StrategyParam<usize>,
    oversold: StrategyParam<f64>,
    overbought: StrategyParam<f64>,
    volume: StrategyParam<f64>,
    stop_loss_pips: StrategyParam<f64>,
    take_profit_pips: StrategyParam<f64>,

    macd: Option<Formed<MovingAverageConvergenceDivergence>>,
    stoch: Option<Formed<SlowStochastic>>,
    prev: Option<(f64, f64)>,
}

impl MacdStochastic {
    pub fn new() -> Self {
        MacdStochastic {
            candle_type: StrategyParam::new("candle_type", Timeframe::H1)
                .set_display("Candle type", "Timeframe of the working candles", "General"),
            macd_fast: StrategyParam::new("macd_fast", 12)
                .set_display("MACD fast", "Fast EMA length", "MACD")
                .set_greater_than_zero()
                .set_can_optimize(8, 16, 2),
            macd_slow: StrategyParam::new("macd_slow", 26)
                .set_display("MACD slow", "Slow EMA length", "MACD")
                .set_greater_than_zero()
                .set_can_optimize(20, 32, 3),
            macd_signal: StrategyParam::new("macd_signal", 9)
                .set_display("MACD signal", "Signal EMA length", "MACD")
                .set_greater_than_zero(),
            stoch_period: StrategyParam::new("stoch_period", 14)
                .set_display("%K period", "Stochastic lookback", "Stochastic")
                .set_greater_than_zero()
                .set_can_optimize(5, 21, 4),
            stoch_smooth: StrategyParam::new("stoch_smooth", 3)
                .set_display("%K smoothing", "Slow stochastic smoothing", "Stochastic")
                .set_greater_than_zero(),
            oversold: StrategyParam::new("oversold", 20.0)
                .set_display("Oversold", "Stochastic level confirming buys", "Stochastic")
                .set_can_optimize(10.0, 30.0, 5.0),
            overbought: StrategyParam::new("overbought", 80.0)
                .set_display("Overbought", "Stochastic level confirming sells", "Stochastic")
                .set_can_optimize(70.0, 90.0, 5.0),
            volume: StrategyParam::new("volume", 1.0)
                .set_display("Volume", "Order volume", "Trading")
                .set_greater_than_zero(),
            stop_loss_pips: StrategyParam::new("stop_loss_pips", 50.0)
                .set_display("Stop loss", "Stop-loss distance in pips, 0 disables", "Risk"),
            take_profit_pips: StrategyParam::new("take_profit_pips", 100.0)
                .set_display("Take profit", "Take-profit distance in pips, 0 disables", "Risk"),
            macd: None,
            stoch: None,
            prev: None,
        }
    }
}

impl Default for MacdStochastic {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for MacdStochastic {
    fn id(&self) -> &'static str {
        "macd_stochastic"
    }

    fn title(&self) -> &'static str {
        "MACD + Stochastic"
    }

    fn params(&self) -> Vec<&dyn Param> {
        param_refs![
            self.candle_type,
            self.macd_fast,
            self.macd_slow,
            self.macd_signal,
            self.stoch_period,
            self.stoch_smooth,
            self.oversold,
            self.overbought,
            self.volume,
            self.stop_loss_pips,
            self.take_profit_pips,
        ]
    }

    fn params_mut(&mut self) -> Vec<&mut dyn Param> {
        param_refs_mut![
            self.candle_type,
            self.macd_fast,
            self.macd_slow,
            self.macd_signal,
            self.stoch_period,
            self.stoch_smooth,
            self.oversold,
            self.overbought,
            self.volume,
            self.stop_loss_pips,
            self.take_profit_pips,
        ]
    }

    fn timeframe(&self) -> Timeframe {
        self.candle_type.value()
    }

    fn on_started(&mut self, host: &mut dyn TradingPort) -> Result<(), StratError> {
        if self.macd_fast.value() >= self.macd_slow.value() {
            return Err(StratError::invalid_state(
                "MACD fast period must be shorter than the slow period",
            ));
        }
        if self.oversold.value() >= self.overbought.value() {
            return Err(StratError::invalid_state(
                "oversold level must be below overbought level",
            ));
        }

        let macd = MovingAverageConvergenceDivergence::new(
            self.macd_fast.value(),
            self.macd_slow.value(),
            self.macd_signal.value(),
        )?;
        self.macd = Some(Formed::new(
            macd,
            self.macd_slow.value() + self.macd_signal.value(),
        ));
        let stoch = SlowStochastic::new(self.stoch_period.value(), self.stoch_smooth.value())?;
        self.stoch = Some(Formed::new(
            stoch,
            self.stoch_period.value() + self.stoch_smooth.value(),
        ));
        self.prev = None;

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
        let (Some(macd_ind), Some(stoch_ind)) = (self.macd.as_mut(), self.stoch.as_mut()) else {
            return;
        };
        let macd = macd_ind.next(candle.close);
        let k = stoch_ind.next(candle);
        if !macd_ind.is_formed() || !stoch_ind.is_formed() {
            return;
        }
        let Some((prev_macd, prev_signal)) = self.prev.replace((macd.macd, macd.signal)) else {
            return;
        };
        debug!(macd = macd.macd, signal = macd.signal, k, "macd/stochastic");

        let volume = self.volume.value();
        if crossed_above(prev_macd, prev_signal, macd.macd, macd.signal) {
            if host.position() < 0.0 {
                info!(price = candle.close, "MACD crossed up, closing short");
                host.close_position();
            }
            if host.is_flat() && k < self.oversold.value() {
                info!(price = candle.close, k, "MACD crossed up while oversold, buying");
                host.buy_market(volume);
            }
        } else if crossed_below(prev_macd, prev_signal, macd.macd, macd.signal) {
            if host.position() > 0.0 {
                info!(price = candle.close, "MACD crossed down, closing long");
                host.close_position();
            }
            if host.is_flat() && k > self.overbought.value() {
                info!(price = candle.close, k, "MACD crossed down while overbought, selling");
                host.sell_market(volume);
            }
        }
    }
}
