//! Trade log writer.

use crate::domain::backtest::{BacktestResult, MultiCodeResult};
use crate::domain::candle::format_time;
use crate::domain::error::StratError;
use crate::domain::position::ClosedTrade;
use crate::ports::report_port::ReportPort;
use std::path::Path;

const HEADER: [&str; 9] = [
    "strategy",
    "code",
    "side",
    "volume",
    "entry_time",
    "entry_price",
    "exit_time",
    "exit_price",
    "pnl",
];

/// Writes closed trades as CSV, one row per realisation.
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    fn write_trades<'a>(
        strategy_id: &str,
        trades: impl Iterator<Item = &'a ClosedTrade>,
        output_path: &str,
    ) -> Result<(), StratError> {
        let to_io = |e: csv::Error| -> StratError {
            match e.into_kind() {
                csv::ErrorKind::Io(io) => StratError::Io(io),
                other => StratError::Data {
                    reason: format!("CSV write error: {other:?}"),
                },
            }
        };

        let mut writer = csv::Writer::from_path(Path::new(output_path)).map_err(to_io)?;
        writer.write_record(HEADER).map_err(to_io)?;
        for trade in trades {
            writer
                .write_record([
                    strategy_id.to_string(),
                    trade.code.clone(),
                    trade.side.to_string(),
                    trade.volume.to_string(),
                    format_time(&trade.entry_time),
                    trade.entry_price.to_string(),
                    format_time(&trade.exit_time),
                    trade.exit_price.to_string(),
                    format!("{:.2}", trade.pnl),
                ])
                .map_err(to_io)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        strategy_id: &str,
        output_path: &str,
    ) -> Result<(), StratError> {
        Self::write_trades(
            strategy_id,
            result.portfolio.closed_trades.iter(),
            output_path,
        )
    }

    fn write_multi(
        &self,
        result: &MultiCodeResult,
        strategy_id: &str,
        output_path: &str,
    ) -> Result<(), StratError> {
        Self::write_trades(strategy_id, result.closed_trades(), output_path)
    }
}
