#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use stratbook::domain::backtest::BacktestConfig;
pub use stratbook::domain::candle::{Candle, CandleState};
use stratbook::domain::error::StratError;
use stratbook::domain::security::Security;
use stratbook::domain::timeframe::Timeframe;
use stratbook::ports::data_port::DataPort;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Candle>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_candles(mut self, code: &str, candles: Vec<Candle>) -> Self {
        self.data.insert(code.to_string(), candles);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_candles(
        &self,
        code: &str,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> Result<Vec<Candle>, StratError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(StratError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(code)
            .map(|candles| {
                candles
                    .iter()
                    .filter(|c| from.is_none_or(|f| c.open_time >= f))
                    .filter(|c| to.is_none_or(|t| c.open_time <= t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_codes(&self) -> Result<Vec<String>, StratError> {
        let mut codes: Vec<String> = self.data.keys().cloned().collect();
        codes.sort();
        Ok(codes)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, StratError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(StratError::Data {
                reason: reason.clone(),
            });
        }
        match self.data.get(code) {
            Some(candles) if !candles.is_empty() => {
                let min = candles.iter().map(|c| c.open_time).min().unwrap();
                let max = candles.iter().map(|c| c.open_time).max().unwrap();
                Ok(Some((min, max, candles.len())))
            }
            _ => Ok(None),
        }
    }
}

pub fn start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

pub fn candle(time: NaiveDateTime, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        open_time: time,
        open,
        high,
        low,
        close,
        volume: 100.0,
        state: CandleState::Finished,
    }
}

/// One finished candle per close, `step` apart. Open is the previous close
/// and the wick extends `spread` either side of the body.
pub fn candles_from_closes(closes: &[f64], step: Timeframe, spread: f64) -> Vec<Candle> {
    let mut prev = closes.first().copied().unwrap_or_default();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let time = start_time() + step.duration() * i as i32;
            let open = prev;
            prev = close;
            candle(
                time,
                open,
                open.max(close) + spread,
                open.min(close) - spread,
                close,
            )
        })
        .collect()
}

/// `count` hourly candles drifting by `step` per candle.
pub fn trending_candles(count: usize, start_price: f64, step: f64) -> Vec<Candle> {
    let closes: Vec<f64> = (0..count).map(|i| start_price + step * i as f64).collect();
    candles_from_closes(&closes, Timeframe::H1, step.abs() / 2.0)
}

/// Flat, then a steady fall, then a steady rise.
pub fn valley_closes(flat: usize, leg: usize, start_price: f64, step: f64) -> Vec<f64> {
    let mut closes = vec![start_price; flat];
    let bottom = start_price - step * leg as f64;
    closes.extend((1..=leg).map(|i| start_price - step * i as f64));
    closes.extend((1..=leg).map(|i| bottom + step * i as f64));
    closes
}

/// Flat, then a steady rise, then a steady fall.
pub fn peak_closes(flat: usize, leg: usize, start_price: f64, step: f64) -> Vec<f64> {
    valley_closes(flat, leg, start_price, -step)
}

pub fn security(code: &str) -> Security {
    Security::new(code)
}

pub fn sample_config(timeframe: Timeframe) -> BacktestConfig {
    BacktestConfig {
        initial_capital: 100_000.0,
        timeframe,
        ..BacktestConfig::default()
    }
}

pub fn minutes(n: i64) -> Duration {
    Duration::minutes(n)
}
