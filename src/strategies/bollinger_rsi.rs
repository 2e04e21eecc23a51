//! Mean reversion: fade closes outside the Bollinger bands when RSI agrees,
//! take profit at the middle band.

use ta::indicators::{BollingerBands, RelativeStrengthIndex};
use ta::Next;
use tracing::{debug, info};

use crate::domain::candle::Candle;
use crate::domain::error::StratError;
use crate::domain::indicator::Formed;
use crate::domain::param::{Param, StrategyParam};
use crate::domain::protection::{Protection, Unit};
use crate::domain::strategy::Strategy;
use crate::domain::timeframe::Timeframe;
use crate::ports::trading_port::TradingPort;
use crate::{param_refs, param_refs_mut};

pub struct BollingerRsi {
    candle_type: StrategyParam<Timeframe>,
    bb_period: StrategyParam<usize>,
    bb_width: StrategyParam<f64>,
    rsi_period: StrategyParam<usize>,
    oversold: StrategyParam<f64>,
    overbought: StrategyParam<f64>,
    volume: StrategyParam<f64>,
    stop_loss_pct: StrategyParam<f64>,

    bands: Option<Formed<BollingerBands>>,
    rsi: Option<Formed<RelativeStrengthIndex>>,
}

impl BollingerRsi {
    pub fn new() -> Self {
        BollingerRsi {
            candle_type: StrategyParam::new("candle_type", Timeframe::H1)
                .set_display("Candle type", "Timeframe of the working candles", "General"),
            bb_period: StrategyParam::new("bb_period", 20)
                .set_display("Bands period", "Bollinger moving average length", "Bollinger")
                .set_greater_than_zero()
                .set_can_optimize(10, 30, 5),
            bb_width: StrategyParam::new("bb_width", 2.0)
                .set_display("Bands width", "Standard deviations from the middle", "Bollinger")
                .set_greater_than_zero()
                .set_can_optimize(1.5, 3.0, 0.5),
            rsi_period: StrategyParam::new("rsi_period", 14)
                .set_display("RSI period", "RSI length", "RSI")
                .set_greater_than_zero(),
            oversold: StrategyParam::new("oversold", 30.0)
                .set_display("Oversold", "RSI level confirming buys", "RSI")
                .set_can_optimize(20.0, 35.0, 5.0),
            overbought: StrategyParam::new("overbought", 70.0)
                .set_display("Overbought", "RSI level confirming sells", "RSI")
                .set_can_optimize(65.0, 80.0, 5.0),
            volume: StrategyParam::new("volume", 1.0)
                .set_display("Volume", "Order volume", "Trading")
                .set_greater_than_zero(),
            stop_loss_pct: StrategyParam::new("stop_loss_pct", 0.0)
                .set_display("Stop loss %", "Stop-loss distance in percent of entry, 0 disables", "Risk"),
            bands: None,
            rsi: None,
        }
    }
}

impl Default for BollingerRsi {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for BollingerRsi {
    fn id(&self) -> &'static str {
        "bollinger_rsi"
    }

    fn title(&self) -> &'static str {
        "Bollinger + RSI mean reversion"
    }

    fn params(&self) -> Vec<&dyn Param> {
        param_refs![
            self.candle_type,
            self.bb_period,
            self.bb_width,
            self.rsi_period,
            self.oversold,
            self.overbought,
            self.volume,
            self.stop_loss_pct,
        ]
    }

    fn params_mut(&mut self) -> Vec<&mut dyn Param> {
        param_refs_mut![
            self.candle_type,
            self.bb_period,
            self.bb_width,
            self.rsi_period,
            self.oversold,
            self.overbought,
            self.volume,
            self.stop_loss_pct,
        ]
    }

    fn timeframe(&self) -> Timeframe {
        self.candle_type.value()
    }

    fn on_started(&mut self, host: &mut dyn TradingPort) -> Result<(), StratError> {
        if self.oversold.value() >= self.overbought.value() {
            return Err(StratError::invalid_state(
                "oversold level must be below overbought level",
            ));
        }
        self.bands = Some(Formed::new(
            BollingerBands::new(self.bb_period.value(), self.bb_width.value())?,
            self.bb_period.value(),
        ));
        self.rsi = Some(Formed::new(
            RelativeStrengthIndex::new(self.rsi_period.value())?,
            self.rsi_period.value() + 1,
        ));

        let protection = Protection::new(Unit::Percent(0.0), Unit::Percent(self.stop_loss_pct.value()));
        if !protection.is_empty() {
            host.start_protection(protection);
        }
        Ok(())
    }

    fn on_candle(&mut self, candle: &Candle, host: &mut dyn TradingPort) {
        if !candle.is_finished() {
            return;
        }
        let (Some(bands_ind), Some(rsi_ind)) = (self.bands.as_mut(), self.rsi.as_mut()) else {
            return;
        };
        let bands = bands_ind.next(candle.close);
        let rsi = rsi_ind.next(candle.close);
        if !bands_ind.is_formed() || !rsi_ind.is_formed() {
            return;
        }

        let close = candle.close;
        debug!(
            lower = bands.lower,
            middle = bands.average,
            upper = bands.upper,
            rsi,
            "bands"
        );

        let position = host.position();
        if position > 0.0 {
            if close >= bands.average {
                info!(close, "long reached the middle band, exiting");
                host.close_position();
            }
            return;
        }
        if position < 0.0 {
            if close <= bands.average {
                info!(close, "short reached the middle band, exiting");
                host.close_position();
            }
            return;
        }

        if close < bands.lower && rsi < self.oversold.value() {
            info!(close, rsi, "close below lower band and RSI oversold, buying");
            host.buy_market(self.volume.value());
        } else if close > bands.upper && rsi > self.overbought.value() {
            info!(close, rsi, "close above upper band and RSI overbought, selling");
            host.sell_market(self.volume.value());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::{Emulator, ExecutionConfig};
    use crate::domain::security::Security;

    #[test]
    fn levels_must_be_ordered() {
        let mut host = Emulator::new(Security::new("X"), ExecutionConfig::default(), 1_000.0);
        let mut strategy = BollingerRsi::new();
        strategy.overbought.set(25.0).unwrap();
        assert!(matches!(
            strategy.on_started(&mut host),
            Err(StratError::InvalidState { .. })
        ));
    }

    #[test]
    fn zero_band_width_is_a_param_error() {
        let mut strategy = BollingerRsi::new();
        assert!(matches!(
            strategy.bb_width.set(0.0),
            Err(StratError::Param { .. })
        ));
    }
}
