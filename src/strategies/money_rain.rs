//! Money rain: DeMarker direction with loss-recovery position sizing.

use ta::Next;
use tracing::{debug, info};

use crate::domain::candle::Candle;
use crate::domain::error::StratError;
use crate::domain::indicator::DeMarker;
use crate::domain::param::{Param, StrategyParam};
use crate::domain::security::Security;
use crate::domain::strategy::Strategy;
use crate::domain::timeframe::Timeframe;
use crate::ports::trading_port::TradingPort;
use crate::{param_refs, param_refs_mut};

use super::protect_pips;

/// Loss carried into the next trade's size.
#[derive(Debug, Clone, Default, PartialEq)]
struct Recovery {
    accumulated_loss: f64,
    consecutive_losses: usize,
}

impl Recovery {
    /// Book a finished trade. Returns true when the loss streak hit the cap
    /// and the carried loss was written off.
    fn record(&mut self, pnl: f64, max_losses: usize) -> bool {
        if pnl < 0.0 {
            self.accumulated_loss += -pnl;
            self.consecutive_losses += 1;
            if self.consecutive_losses >= max_losses {
                *self = Recovery::default();
                return true;
            }
        } else if pnl > 0.0 {
            *self = Recovery::default();
        }
        false
    }

    /// `base + loss / tp_distance`, normalised and capped. A raw volume
    /// within float noise of a volume step snaps to it before flooring.
    fn volume(&self, base: f64, tp_distance: f64, cap: f64, security: &Security) -> f64 {
        let raw = if self.accumulated_loss > 0.0 && tp_distance > 0.0 {
            base + self.accumulated_loss / tp_distance
        } else {
            base
        };
        let steps = raw / security.volume_step;
        let snapped = if (steps - steps.round()).abs() <= steps.abs().max(1.0) * 1e-6 {
            steps.round() * security.volume_step
        } else {
            raw
        };
        security.normalize_volume(snapped.min(cap))
    }
}

pub struct MoneyRain {
    candle_type: StrategyParam<Timeframe>,
    demarker_period: StrategyParam<usize>,
    take_profit_pips: StrategyParam<f64>,
    stop_loss_pips: StrategyParam<f64>,
    volume: StrategyParam<f64>,
    max_volume: StrategyParam<f64>,
    max_losses: StrategyParam<usize>,

    demarker: Option<DeMarker>,
    recovery: Recovery,
    in_trade: bool,
    realized_before: f64,
}

impl MoneyRain {
    pub fn new() -> Self {
        MoneyRain {
            candle_type: StrategyParam::new("candle_type", Timeframe::H1)
                .set_display("Candle type", "Timeframe of the working candles", "General"),
            demarker_period: StrategyParam::new("demarker_period", 10)
                .set_display("DeMarker period", "DeMarker averaging length", "Indicators")
                .set_greater_than_zero()
                .set_can_optimize(5, 30, 5),
            take_profit_pips: StrategyParam::new("take_profit_pips", 20.0)
                .set_display("Take profit", "Take-profit distance in pips", "Risk")
                .set_greater_than_zero()
                .set_can_optimize(10.0, 50.0, 10.0),
            stop_loss_pips: StrategyParam::new("stop_loss_pips", 20.0)
                .set_display("Stop loss", "Stop-loss distance in pips", "Risk")
                .set_greater_than_zero()
                .set_can_optimize(10.0, 50.0, 10.0),
            volume: StrategyParam::new("volume", 1.0)
                .set_display("Volume", "Base order volume", "Trading")
                .set_greater_than_zero(),
            max_volume: StrategyParam::new("max_volume", 10.0)
                .set_display("Max volume", "Cap on the recovery volume", "Recovery")
                .set_greater_than_zero(),
            max_losses: StrategyParam::new("max_losses", 5)
                .set_display("Max losses", "Losing streak after which the loss is written off", "Recovery")
                .set_greater_than_zero(),
            demarker: None,
            recovery: Recovery::default(),
            in_trade: false,
            realized_before: 0.0,
        }
    }
}

impl Default for MoneyRain {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for MoneyRain {
    fn id(&self) -> &'static str {
        "money_rain"
    }

    fn title(&self) -> &'static str {
        "Money rain recovery"
    }

    fn params(&self) -> Vec<&dyn Param> {
        param_refs![
            self.candle_type,
            self.demarker_period,
            self.take_profit_pips,
            self.stop_loss_pips,
            self.volume,
            self.max_volume,
            self.max_losses,
        ]
    }

    fn params_mut(&mut self) -> Vec<&mut dyn Param> {
        param_refs_mut![
            self.candle_type,
            self.demarker_period,
            self.take_profit_pips,
            self.stop_loss_pips,
            self.volume,
            self.max_volume,
            self.max_losses,
        ]
    }

    fn timeframe(&self) -> Timeframe {
        self.candle_type.value()
    }

    fn on_started(&mut self, host: &mut dyn TradingPort) -> Result<(), StratError> {
        if self.max_volume.value() < self.volume.value() {
            return Err(StratError::invalid_state(
                "max volume must not be below the base volume",
            ));
        }
        self.demarker = Some(DeMarker::new(self.demarker_period.value())?);
        self.recovery = Recovery::default();
        self.in_trade = false;
        self.realized_before = host.realized_pnl();
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
        let Some(demarker) = self.demarker.as_mut() else {
            return;
        };
        let dem = demarker.next(candle);
        if !demarker.is_formed() {
            return;
        }
        if !host.is_flat() {
            return;
        }

        if self.in_trade {
            let pnl = host.realized_pnl() - self.realized_before;
            self.in_trade = false;
            if self.recovery.record(pnl, self.max_losses.value()) {
                info!(max_losses = self.max_losses.value(), "loss streak cap reached, writing off");
            }
            debug!(
                pnl,
                carried = self.recovery.accumulated_loss,
                streak = self.recovery.consecutive_losses,
                "trade finished"
            );
        }

        let security = host.security();
        let tp_distance = security.pips_to_price(self.take_profit_pips.value());
        let volume = self.recovery.volume(
            self.volume.value(),
            tp_distance,
            self.max_volume.value(),
            security,
        );

        self.realized_before = host.realized_pnl();
        let order = if dem > 0.5 {
            info!(dem, volume, "DeMarker above 0.5, buying");
            host.buy_market(volume)
        } else {
            info!(dem, volume, "DeMarker at or below 0.5, selling");
            host.sell_market(volume)
        };
        self.in_trade = order.is_some();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn security() -> Security {
        Security {
            volume_step: 0.01,
            min_volume: 0.01,
            ..Security::new("EURUSD")
        }
    }

    #[test]
    fn loss_accumulates_and_win_clears() {
        let mut recovery = Recovery::default();
        recovery.record(-10.0, 5);
        recovery.record(-5.0, 5);
        assert_eq!(recovery.accumulated_loss, 15.0);
        assert_eq!(recovery.consecutive_losses, 2);

        recovery.record(3.0, 5);
        assert_eq!(recovery, Recovery::default());
    }

    #[test]
    fn streak_cap_writes_loss_off() {
        let mut recovery = Recovery::default();
        assert!(!recovery.record(-1.0, 2));
        assert!(recovery.record(-1.0, 2));
        assert_eq!(recovery.accumulated_loss, 0.0);
    }

    #[test]
    fn breakeven_keeps_carried_loss() {
        let mut recovery = Recovery::default();
        recovery.record(-4.0, 5);
        recovery.record(0.0, 5);
        assert_eq!(recovery.accumulated_loss, 4.0);
    }

    #[test]
    fn volume_recovers_loss_at_take_profit() {
        let recovery = Recovery {
            accumulated_loss: 0.002,
            consecutive_losses: 1,
        };
        // 20 pips on a 4-digit quote is 0.0020: one extra unit recovers 0.002.
        let v = recovery.volume(1.0, 0.0020, 10.0, &security());
        assert!((v - 2.0).abs() < 1e-9);
    }

    #[test]
    fn volume_snaps_float_noise_to_step() {
        let recovery = Recovery {
            accumulated_loss: 0.003999999986263,
            consecutive_losses: 2,
        };
        let v = recovery.volume(1.0, 0.0020, 10.0, &security());
        assert!((v - 3.0).abs() < 1e-9);
    }

    #[test]
    fn volume_is_capped() {
        let recovery = Recovery {
            accumulated_loss: 1.0,
            consecutive_losses: 1,
        };
        let v = recovery.volume(1.0, 0.0020, 3.0, &security());
        assert!((v - 3.0).abs() < 1e-9);
    }
}
