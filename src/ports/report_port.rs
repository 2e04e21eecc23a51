//! Report generation port trait.

use crate::domain::backtest::{BacktestResult, MultiCodeResult};
use crate::domain::error::StratError;

/// Port for writing backtest results.
pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        strategy_id: &str,
        output_path: &str,
    ) -> Result<(), StratError>;

    /// Default implementation: writes only the first code's result.
    fn write_multi(
        &self,
        result: &MultiCodeResult,
        strategy_id: &str,
        output_path: &str,
    ) -> Result<(), StratError> {
        match result.code_results.first() {
            Some(first) => self.write(first, strategy_id, output_path),
            None => Ok(()),
        }
    }
}
