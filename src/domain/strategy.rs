//! The callback interface every catalogue strategy implements.

use super::candle::Candle;
use super::error::StratError;
use super::order::MyTrade;
use super::param::Param;
use super::timeframe::Timeframe;
use crate::ports::trading_port::TradingPort;

pub trait Strategy {
    /// Registry key, also the `[strategy] name` value in config files.
    fn id(&self) -> &'static str;
    fn title(&self) -> &'static str;

    fn params(&self) -> Vec<&dyn Param>;
    fn params_mut(&mut self) -> Vec<&mut dyn Param>;

    /// Candle length the strategy subscribes to.
    fn timeframe(&self) -> Timeframe;

    /// Build indicators, check parameter combinations and start protection.
    /// Called once before the first candle.
    fn on_started(&mut self, host: &mut dyn TradingPort) -> Result<(), StratError>;

    /// Called for every candle update, active and finished.
    fn on_candle(&mut self, candle: &Candle, host: &mut dyn TradingPort);

    fn on_own_trade(&mut self, _trade: &MyTrade, _host: &mut dyn TradingPort) {}

    fn on_stopped(&mut self, _host: &mut dyn TradingPort) {}

    /// Look up a parameter by its config key.
    fn param(&self, name: &str) -> Option<&dyn Param> {
        self.params().into_iter().find(|p| p.name() == name)
    }

    fn validate_params(&self) -> Result<(), StratError> {
        self.params().iter().try_for_each(|p| p.validate())
    }
}
