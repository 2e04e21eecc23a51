//! Intraday multi-indicator vote.
//!
//! RSI, CCI, Bollinger position, stochastic %K and close-versus-EMA each
//! vote +1 (bullish), -1 (bearish) or 0. Entries need `min_votes` in one
//! direction inside the trading window; positions are closed on an opposite
//! vote of `exit_votes` or at `end_hour`.

use chrono::Timelike;
use ta::indicators::{
    BollingerBands, CommodityChannelIndex, ExponentialMovingAverage, RelativeStrengthIndex,
    SlowStochastic,
};
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

use super::protect_pips;

const VOTERS: i64 = 5;

/// +1 below `low`, -1 above `high`, 0 in between.
fn band_vote(value: f64, low: f64, high: f64) -> i64 {
    if value < low {
        1
    } else if value > high {
        -1
    } else {
        0
    }
}

struct Indicators {
    rsi: Formed<RelativeStrengthIndex>,
    cci: Formed<CommodityChannelIndex>,
    bands: Formed<BollingerBands>,
    stoch: Formed<SlowStochastic>,
    ema: Formed<ExponentialMovingAverage>,
}

impl Indicators {
    fn is_formed(&self) -> bool {
        self.rsi.is_formed()
            && self.cci.is_formed()
            && self.bands.is_formed()
            && self.stoch.is_formed()
            && self.ema.is_formed()
    }
}

pub struct IntradayCombo {
    candle_type: StrategyParam<Timeframe>,
    rsi_period: StrategyParam<usize>,
    rsi_lower: StrategyParam<f64>,
    rsi_upper: StrategyParam<f64>,
    cci_period: StrategyParam<usize>,
    cci_level: StrategyParam<f64>,
    bb_period: StrategyParam<usize>,
    bb_width: StrategyParam<f64>,
    stoch_period: StrategyParam<usize>,
    stoch_smooth: StrategyParam<usize>,
    stoch_lower: StrategyParam<f64>,
    stoch_upper: StrategyParam<f64>,
    ema_period: StrategyParam<usize>,
    min_votes: StrategyParam<i64>,
    exit_votes: StrategyParam<i64>,
    start_hour: StrategyParam<u32>,
    end_hour: StrategyParam<u32>,
    volume: StrategyParam<f64>,
    stop_loss_pips: StrategyParam<f64>,
    take_profit_pips: StrategyParam<f64>,

    indicators: Option<Indicators>,
}

impl IntradayCombo {
    pub fn new() -> Self {
        IntradayCombo {
            candle_type: StrategyParam::new("candle_type", Timeframe::M15)
                .set_display("Candle type", "Timeframe of the working candles", "General"),
            rsi_period: StrategyParam::new("rsi_period", 14)
                .set_display("RSI period", "RSI length", "RSI")
                .set_greater_than_zero(),
            rsi_lower: StrategyParam::new("rsi_lower", 30.0)
                .set_display("RSI lower", "RSI below this votes bullish", "RSI"),
            rsi_upper: StrategyParam::new("rsi_upper", 70.0)
                .set_display("RSI upper", "RSI above this votes bearish", "RSI"),
            cci_period: StrategyParam::new("cci_period", 20)
                .set_display("CCI period", "CCI length", "CCI")
                .set_greater_than_zero(),
            cci_level: StrategyParam::new("cci_level", 100.0)
                .set_display("CCI level", "CCI beyond plus or minus this votes", "CCI")
                .set_greater_than_zero(),
            bb_period: StrategyParam::new("bb_period", 20)
                .set_display("Bands period", "Bollinger length", "Bollinger")
                .set_greater_than_zero(),
            bb_width: StrategyParam::new("bb_width", 2.0)
                .set_display("Bands width", "Standard deviations from the middle", "Bollinger")
                .set_greater_than_zero(),
            stoch_period: StrategyParam::new("stoch_period", 14)
                .set_display("%K period", "Stochastic lookback", "Stochastic")
                .set_greater_than_zero(),
            stoch_smooth: StrategyParam::new("stoch_smooth", 3)
                .set_display("%K smoothing", "Slow stochastic smoothing", "Stochastic")
                .set_greater_than_zero(),
            stoch_lower: StrategyParam::new("stoch_lower", 20.0)
                .set_display("Stochastic lower", "%K below this votes bullish", "Stochastic"),
            stoch_upper: StrategyParam::new("stoch_upper", 80.0)
                .set_display("Stochastic upper", "%K above this votes bearish", "Stochastic"),
            ema_period: StrategyParam::new("ema_period", 50)
                .set_display("EMA period", "Trend filter length", "Trend")
                .set_greater_than_zero(),
            min_votes: StrategyParam::new("min_votes", 3)
                .set_display("Entry votes", "Net votes needed to enter", "Signal")
                .set_greater_than_zero()
                .set_can_optimize(2, 4, 1),
            exit_votes: StrategyParam::new("exit_votes", 2)
                .set_display("Exit votes", "Opposite net votes that close a position", "Signal")
                .set_greater_than_zero()
                .set_can_optimize(1, 3, 1),
            start_hour: StrategyParam::new("start_hour", 8)
                .set_display("Start hour", "First hour new entries are allowed", "Session"),
            end_hour: StrategyParam::new("end_hour", 20)
                .set_display("End hour", "Hour everything is closed", "Session"),
            volume: StrategyParam::new("volume", 1.0)
                .set_display("Volume", "Order volume", "Trading")
                .set_greater_than_zero(),
            stop_loss_pips: StrategyParam::new("stop_loss_pips", 30.0)
                .set_display("Stop loss", "Stop-loss distance in pips, 0 disables", "Risk"),
            take_profit_pips: StrategyParam::new("take_profit_pips", 60.0)
                .set_display("Take profit", "Take-profit distance in pips, 0 disables", "Risk"),
            indicators: None,
        }
    }

    fn vote(&mut self, candle: &Candle) -> Option<i64> {
        let ind = self.indicators.as_mut()?;
        let close = candle.close;
        let rsi = ind.rsi.next(close);
        let cci = ind.cci.next(candle);
        let bands = ind.bands.next(close);
        let k = ind.stoch.next(candle);
        let ema = ind.ema.next(close);
        if !ind.is_formed() {
            return None;
        }

        let level = self.cci_level.value();
        let votes = [
            band_vote(rsi, self.rsi_lower.value(), self.rsi_upper.value()),
            band_vote(cci, -level, level),
            band_vote(close, bands.lower, bands.upper),
            band_vote(k, self.stoch_lower.value(), self.stoch_upper.value()),
            -band_vote(close, ema, ema),
        ];
        let sum: i64 = votes.iter().sum();
        debug!(rsi, cci, k, ema, ?votes, sum, "votes");
        Some(sum)
    }
}

impl Default for IntradayCombo {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for IntradayCombo {
    fn id(&self) -> &'static str {
        "intraday_combo"
    }

    fn title(&self) -> &'static str {
        "Intraday indicator combo"
    }

    fn params(&self) -> Vec<&dyn Param> {
        param_refs![
            self.candle_type,
            self.rsi_period,
            self.rsi_lower,
            self.rsi_upper,
            self.cci_period,
            self.cci_level,
            self.bb_period,
            self.bb_width,
            self.stoch_period,
            self.stoch_smooth,
            self.stoch_lower,
            self.stoch_upper,
            self.ema_period,
            self.min_votes,
            self.exit_votes,
            self.start_hour,
            self.end_hour,
            self.volume,
            self.stop_loss_pips,
            self.take_profit_pips,
        ]
    }

    fn params_mut(&mut self) -> Vec<&mut dyn Param> {
        param_refs_mut![
            self.candle_type,
            self.rsi_period,
            self.rsi_lower,
            self.rsi_upper,
            self.cci_period,
            self.cci_level,
            self.bb_period,
            self.bb_width,
            self.stoch_period,
            self.stoch_smooth,
            self.stoch_lower,
            self.stoch_upper,
            self.ema_period,
            self.min_votes,
            self.exit_votes,
            self.start_hour,
            self.end_hour,
            self.volume,
            self.stop_loss_pips,
            self.take_profit_pips,
        ]
    }

    fn timeframe(&self) -> Timeframe {
        self.candle_type.value()
    }

    fn on_started(&mut self, host: &mut dyn TradingPort) -> Result<(), StratError> {
        let (start, end) = (self.start_hour.value(), self.end_hour.value());
        if end > 24 || start >= end {
            return Err(StratError::invalid_state(format!(
                "trading hours must satisfy start < end <= 24, got {start}..{end}"
            )));
        }
        if self.min_votes.value() > VOTERS || self.exit_votes.value() > VOTERS {
            return Err(StratError::invalid_state(format!(
                "vote thresholds cannot exceed {VOTERS}"
            )));
        }
        if self.rsi_lower.value() >= self.rsi_upper.value()
            || self.stoch_lower.value() >= self.stoch_upper.value()
        {
            return Err(StratError::invalid_state(
                "lower oscillator levels must be below upper levels",
            ));
        }

        let stoch_warmup = self.stoch_period.value() + self.stoch_smooth.value();
        self.indicators = Some(Indicators {
            rsi: Formed::new(
                RelativeStrengthIndex::new(self.rsi_period.value())?,
                self.rsi_period.value() + 1,
            ),
            cci: Formed::new(
                CommodityChannelIndex::new(self.cci_period.value())?,
                self.cci_period.value(),
            ),
            bands: Formed::new(
                BollingerBands::new(self.bb_period.value(), self.bb_width.value())?,
                self.bb_period.value(),
            ),
            stoch: Formed::new(
                SlowStochastic::new(self.stoch_period.value(), self.stoch_smooth.value())?,
                stoch_warmup,
            ),
            ema: Formed::new(
                ExponentialMovingAverage::new(self.ema_period.value())?,
                self.ema_period.value(),
            ),
        });

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
        let Some(sum) = self.vote(candle) else {
            return;
        };

        let hour = candle.open_time.hour();
        let position = host.position();
        if hour >= self.end_hour.value() {
            if position != 0.0 {
                info!(hour, "end of trading window, closing");
                host.close_position();
            }
            return;
        }

        let exit = self.exit_votes.value();
        if (position > 0.0 && sum <= -exit) || (position < 0.0 && sum >= exit) {
            info!(sum, "opposite votes, closing");
            host.close_position();
            return;
        }
        if position != 0.0 || hour < self.start_hour.value() {
            return;
        }

        let needed = self.min_votes.value();
        if sum >= needed {
            info!(sum, price = candle.close, "bullish vote, buying");
            host.buy_market(self.volume.value());
        } else if sum <= -needed {
            info!(sum, price = candle.close, "bearish vote, selling");
            host.sell_market(self.volume.value());
        }
    }
}
