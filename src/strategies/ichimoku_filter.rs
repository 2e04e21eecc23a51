//! Tenkan/kijun crosses taken only on the outside of the cloud.

use ta::Next;
use tracing::{debug, info};

use crate::domain::candle::Candle;
use crate::domain::error::StratError;
use crate::domain::indicator::Ichimoku;
use crate::domain::param::{Param, StrategyParam};
use crate::domain::strategy::Strategy;
use crate::domain::timeframe::Timeframe;
use crate::ports::trading_port::TradingPort;
use crate::{param_refs, param_refs_mut};

use super::{crossed_above, crossed_below, protect_pips};

pub struct IchimokuFilter {
    candle_type: StrategyParam<Timeframe>,
    tenkan_period: StrategyParam<usize>,
    kijun_period: StrategyParam<usize>,
    senkou_period: StrategyParam<usize>,
    volume: StrategyParam<f64>,
    stop_loss_pips: StrategyParam<f64>,

    ichimoku: Option<Ichimoku>,
    prev: Option<(f64, f64)>,
}

impl IchimokuFilter {
    pub fn new() -> Self {
        IchimokuFilter {
            candle_type: StrategyParam::new("candle_type", Timeframe::H1)
                .set_display("Candle type", "Timeframe of the working candles", "General"),
            tenkan_period: StrategyParam::new("tenkan_period", 9)
                .set_display("Tenkan", "Conversion line period", "Ichimoku")
                .set_greater_than_zero()
                .set_can_optimize(7, 11, 2),
            kijun_period: StrategyParam::new("kijun_period", 26)
                .set_display("Kijun", "Base line period and cloud displacement", "Ichimoku")
                .set_greater_than_zero()
                .set_can_optimize(20, 30, 5),
            senkou_period: StrategyParam::new("senkou_period", 52)
                .set_display("Senkou B", "Leading span B period", "Ichimoku")
                .set_greater_than_zero(),
            volume: StrategyParam::new("volume", 1.0)
                .set_display("Volume", "Order volume", "Trading")
                .set_greater_than_zero(),
            stop_loss_pips: StrategyParam::new("stop_loss_pips", 100.0)
                .set_display("Stop loss", "Stop-loss distance in pips, 0 disables", "Risk")
                .set_can_optimize(50.0, 150.0, 25.0),
            ichimoku: None,
            prev: None,
        }
    }
}

impl Default for IchimokuFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for IchimokuFilter {
    fn id(&self) -> &'static str {
        "ichimoku_filter"
    }

    fn title(&self) -> &'static str {
        "Ichimoku cloud filter"
    }

    fn params(&self) -> Vec<&dyn Param> {
        param_refs![
            self.candle_type,
            self.tenkan_period,
            self.kijun_period,
            self.senkou_period,
            self.volume,
            self.stop_loss_pips,
        ]
    }

    fn params_mut(&mut self) -> Vec<&mut dyn Param> {
        param_refs_mut![
            self.candle_type,
            self.tenkan_period,
            self.kijun_period,
            self.senkou_period,
            self.volume,
            self.stop_loss_pips,
        ]
    }

    fn timeframe(&self) -> Timeframe {
        self.candle_type.value()
    }

    fn on_started(&mut self, host: &mut dyn TradingPort) -> Result<(), StratError> {
        if self.tenkan_period.value() >= self.kijun_period.value() {
            return Err(StratError::invalid_state(
                "tenkan period must be shorter than kijun period",
            ));
        }
        self.ichimoku = Some(Ichimoku::new(
            self.tenkan_period.value(),
            self.kijun_period.value(),
            self.senkou_period.value(),
        )?);
        self.prev = None;
        protect_pips(host, 0.0, self.stop_loss_pips.value());
        Ok(())
    }

    fn on_candle(&mut self, candle: &Candle, host: &mut dyn TradingPort) {
        if !candle.is_finished() {
            return;
        }
        let Some(ichimoku) = self.ichimoku.as_mut() else {
            return;
        };
        let value = ichimoku.next(candle);
        if !ichimoku.is_formed() {
            return;
        }
        let Some((prev_tenkan, prev_kijun)) = self.prev.replace((value.tenkan, value.kijun)) else {
            return;
        };

        let close = candle.close;
        let (top, bottom) = (value.cloud_top(), value.cloud_bottom());
        debug!(
            tenkan = value.tenkan,
            kijun = value.kijun,
            top,
            bottom,
            "ichimoku"
        );

        let position = host.position();
        if position > 0.0 && close <= top {
            info!(close, top, "close back in the cloud, exiting long");
            host.close_position();
            return;
        }
        if position < 0.0 && close >= bottom {
            info!(close, bottom, "close back in the cloud, exiting short");
            host.close_position();
            return;
        }
        if position != 0.0 {
            return;
        }

        let volume = self.volume.value();
        if crossed_above(prev_tenkan, prev_kijun, value.tenkan, value.kijun) && close > top {
            info!(close, "tenkan crossed above kijun over the cloud, buying");
            host.buy_market(volume);
        } else if crossed_below(prev_tenkan, prev_kijun, value.tenkan, value.kijun)
            && close < bottom
        {
            info!(close, "tenkan crossed below kijun under the cloud, selling");
            host.sell_market(volume);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::{Emulator, ExecutionConfig};
    use crate::domain::security::Security;

    #[test]
    fn tenkan_must_be_shorter_than_kijun() {
        let mut host = Emulator::new(Security::new("X"), ExecutionConfig::default(), 1_000.0);
        let mut strategy = IchimokuFilter::new();
        strategy.tenkan_period.set(26).unwrap();
        assert!(matches!(
            strategy.on_started(&mut host),
            Err(StratError::InvalidState { .. })
        ));
    }

    #[test]
    fn builds_indicator_on_start() {
        let mut host = Emulator::new(Security::new("X"), ExecutionConfig::default(), 1_000.0);
        let mut strategy = IchimokuFilter::new();
        strategy.on_started(&mut host).unwrap();
        assert!(strategy.ichimoku.is_some());
    }
}
