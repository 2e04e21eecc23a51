//! Candle representation and the `ta` price-trait bridge.

use chrono::{NaiveDate, NaiveDateTime};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse `YYYY-MM-DD HH:MM:SS`, or `YYYY-MM-DD` as midnight.
pub fn parse_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub fn format_time(time: &NaiveDateTime) -> String {
    time.format(DATETIME_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleState {
    Active,
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub open_time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub state: CandleState,
}

impl Candle {
    pub fn is_finished(&self) -> bool {
        self.state == CandleState::Finished
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// (high + low) / 2
    pub fn median_price(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

impl ta::Open for Candle {
    fn open(&self) -> f64 {
        self.open
    }
}

impl ta::High for Candle {
    fn high(&self) -> f64 {
        self.high
    }
}

impl ta::Low for Candle {
    fn low(&self) -> f64 {
        self.low
    }
}

impl ta::Close for Candle {
    fn close(&self) -> f64 {
        self.close
    }
}

impl ta::Volume for Candle {
    fn volume(&self) -> f64 {
        self.volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_candle() -> Candle {
        Candle {
            open_time: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            volume: 50_000.0,
            state: CandleState::Finished,
        }
    }

    #[test]
    fn parse_time_accepts_both_formats() {
        let full = parse_time("2024-01-15 10:00:00").unwrap();
        assert_eq!(full, sample_candle().open_time);
        let date_only = parse_time(" 2024-01-15 ").unwrap();
        assert_eq!(format_time(&date_only), "2024-01-15 00:00:00");
        assert!(parse_time("15/01/2024").is_none());
    }

    #[test]
    fn typical_price() {
        let candle = sample_candle();
        let expected = (110.0 + 90.0 + 105.0) / 3.0;
        assert!((candle.typical_price() - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_hl_dominates() {
        let candle = sample_candle();
        // high-low=20, |high-100|=10, |low-100|=10 → 20
        assert!((candle.true_range(100.0) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        let candle = sample_candle();
        // high-low=20, |110-70|=40, |90-70|=20 → 40
        assert!((candle.true_range(70.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_down() {
        let candle = sample_candle();
        // high-low=20, |110-130|=20, |90-130|=40 → 40
        assert!((candle.true_range(130.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ta_traits_expose_prices() {
        use ta::{Close, High, Low};
        let candle = sample_candle();
        assert_eq!(High::high(&candle), 110.0);
        assert_eq!(Low::low(&candle), 90.0);
        assert_eq!(Close::close(&candle), 105.0);
    }

    #[test]
    fn finished_state() {
        let mut candle = sample_candle();
        assert!(candle.is_finished());
        candle.state = CandleState::Active;
        assert!(!candle.is_finished());
    }
}
