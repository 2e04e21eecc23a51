//! CSV candle data adapter.
//!
//! One file per code, `{data_dir}/{CODE}.csv`, with the header
//! `time,open,high,low,close,volume`.

use crate::domain::candle::{parse_time, Candle, CandleState};
use crate::domain::error::StratError;
use crate::ports::data_port::DataPort;
use chrono::NaiveDateTime;
use std::fs;
use std::path::PathBuf;

const COLUMNS: [&str; 6] = ["time", "open", "high", "low", "close", "volume"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, code: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", code))
    }

    fn load(&self, code: &str) -> Result<Vec<Candle>, StratError> {
        let path = self.csv_path(code);
        let content = fs::read_to_string(&path).map_err(|e| StratError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers = rdr.headers().map_err(|e| StratError::Data {
            reason: format!("{}: CSV header error: {}", path.display(), e),
        })?;
        let mut index = [0usize; 6];
        for (slot, name) in index.iter_mut().zip(COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| StratError::Data {
                    reason: format!("{}: missing {} column", path.display(), name),
                })?;
        }

        let mut candles = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| StratError::Data {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;
            let line = row + 2;
            let field = |col: usize| record.get(index[col]).unwrap_or("");

            let open_time = parse_time(field(0)).ok_or_else(|| StratError::Data {
                reason: format!("{}:{}: invalid time '{}'", path.display(), line, field(0)),
            })?;
            let mut values = [0.0f64; 5];
            for (i, value) in values.iter_mut().enumerate() {
                let raw = field(i + 1);
                *value = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| StratError::Data {
                        reason: format!(
                            "{}:{}: invalid {} value '{}'",
                            path.display(),
                            line,
                            COLUMNS[i + 1],
                            raw
                        ),
                    })?;
            }
            let [open, high, low, close, volume] = values;
            if high < low {
                return Err(StratError::Data {
                    reason: format!("{}:{}: high below low", path.display(), line),
                });
            }

            candles.push(Candle {
                open_time,
                open,
                high,
                low,
                close,
                volume,
                state: CandleState::Finished,
            });
        }

        candles.sort_by_key(|c| c.open_time);
        Ok(candles)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_candles(
        &self,
        code: &str,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> Result<Vec<Candle>, StratError> {
        let mut candles = self.load(code)?;
        candles.retain(|c| {
            from.is_none_or(|from| c.open_time >= from) && to.is_none_or(|to| c.open_time <= to)
        });
        Ok(candles)
    }

    fn list_codes(&self) -> Result<Vec<String>, StratError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| StratError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut codes = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StratError::Data {
                reason: format!("directory entry error: {}", e),
            })?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(code) = name_str.strip_suffix(".csv") {
                codes.push(code.to_string());
            }
        }

        codes.sort();
        Ok(codes)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, StratError> {
        if !self.csv_path(code).exists() {
            return Ok(None);
        }
        let candles = self.load(code)?;
        Ok(match (candles.first(), candles.last()) {
            (Some(first), Some(last)) => Some((first.open_time, last.open_time, candles.len())),
            _ => None,
        })
    }
}
