//! Candle timeframes and resampling of source bars into strategy candles.

use chrono::{Duration, NaiveDateTime};
use std::fmt;
use std::str::FromStr;

use super::candle::{Candle, CandleState};
use super::error::StratError;

const MINUTES_PER_HOUR: u32 = 60;
const MINUTES_PER_DAY: u32 = 1440;

/// A candle length, stored in whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timeframe(u32);

impl Timeframe {
    pub const M1: Timeframe = Timeframe(1);
    pub const M5: Timeframe = Timeframe(5);
    pub const M15: Timeframe = Timeframe(15);
    pub const H1: Timeframe = Timeframe(60);
    pub const H4: Timeframe = Timeframe(240);
    pub const D1: Timeframe = Timeframe(1440);

    pub fn from_minutes(minutes: u32) -> Result<Self, StratError> {
        if minutes == 0 {
            return Err(StratError::Timeframe {
                reason: "timeframe must be at least one minute".into(),
            });
        }
        Ok(Timeframe(minutes))
    }

    pub fn minutes(&self) -> u32 {
        self.0
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.0 as i64)
    }

    /// Start of the bucket containing `time`, aligned on multiples of the
    /// timeframe since the Unix epoch.
    pub fn bucket_start(&self, time: NaiveDateTime) -> NaiveDateTime {
        let secs = time.and_utc().timestamp();
        let offset = secs.rem_euclid(self.0 as i64 * 60);
        time - Duration::seconds(offset)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % MINUTES_PER_DAY == 0 {
            write!(f, "D{}", self.0 / MINUTES_PER_DAY)
        } else if self.0 % MINUTES_PER_HOUR == 0 {
            write!(f, "H{}", self.0 / MINUTES_PER_HOUR)
        } else {
            write!(f, "M{}", self.0)
        }
    }
}

impl FromStr for Timeframe {
    type Err = StratError;

    /// Accepts `M5`, `H1`, `D1` or a bare minute count.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || StratError::Timeframe {
            reason: format!("cannot parse timeframe '{s}'"),
        };
        let (unit, digits) = match s.chars().next() {
            Some(c) if c.is_ascii_alphabetic() => (c.to_ascii_uppercase(), &s[1..]),
            Some(_) => ('M', s),
            None => return Err(invalid()),
        };
        let n: u32 = digits.parse().map_err(|_| invalid())?;
        let minutes = match unit {
            'M' => Some(n),
            'H' => n.checked_mul(MINUTES_PER_HOUR),
            'D' => n.checked_mul(MINUTES_PER_DAY),
            _ => return Err(invalid()),
        };
        Timeframe::from_minutes(minutes.ok_or_else(invalid)?)
    }
}

/// Builds strategy-timeframe candles from finer source bars.
///
/// Every pushed bar yields the current state of its bucket: `Active` while
/// the bucket is still open, `Finished` once the bar that closes it arrives.
/// A bucket left open by a gap in the data is finished when the next bucket
/// starts.
#[derive(Debug, Clone)]
pub struct CandleAggregator {
    source: Timeframe,
    target: Timeframe,
    current: Option<Candle>,
}

impl CandleAggregator {
    pub fn new(source: Timeframe, target: Timeframe) -> Result<Self, StratError> {
        if target.minutes() % source.minutes() != 0 {
            return Err(StratError::Timeframe {
                reason: format!("{target} is not a multiple of source timeframe {source}"),
            });
        }
        Ok(Self {
            source,
            target,
            current: None,
        })
    }

    pub fn target(&self) -> Timeframe {
        self.target
    }

    pub fn push(&mut self, bar: &Candle) -> Vec<Candle> {
        let mut updates = Vec::with_capacity(2);
        let bucket = self.target.bucket_start(bar.open_time);

        if let Some(stale) = self.current.take_if(|c| c.open_time != bucket) {
            updates.push(Candle {
                state: CandleState::Finished,
                ..stale
            });
        }

        let fresh = self.current.is_none();
        let candle = self.current.get_or_insert_with(|| Candle {
            open_time: bucket,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            state: CandleState::Active,
        });
        if !fresh {
            candle.high = candle.high.max(bar.high);
            candle.low = candle.low.min(bar.low);
            candle.close = bar.close;
            candle.volume += bar.volume;
        }

        let bar_end = bar.open_time + self.source.duration();
        if bar_end >= bucket + self.target.duration() {
            candle.state = CandleState::Finished;
            updates.extend(self.current.take());
        } else {
            updates.push(candle.clone());
        }

        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn bar(time: NaiveDateTime, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: time,
            open,
            high,
            low,
            close,
            volume: 10.0,
            state: CandleState::Finished,
        }
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("M5".parse::<Timeframe>().unwrap(), Timeframe::M5);
        assert_eq!("h1".parse::<Timeframe>().unwrap(), Timeframe::H1);
        assert_eq!("D1".parse::<Timeframe>().unwrap(), Timeframe::D1);
        assert_eq!("15".parse::<Timeframe>().unwrap(), Timeframe::M15);
        assert_eq!(Timeframe::H4.to_string(), "H4");
        assert_eq!(Timeframe::M15.to_string(), "M15");
        assert!("X3".parse::<Timeframe>().is_err());
        assert!("M0".parse::<Timeframe>().is_err());
    }

    #[test]
    fn oversized_timeframe_is_an_error() {
        let err = "H99999999".parse::<Timeframe>().unwrap_err();
        assert!(matches!(err, StratError::Timeframe { .. }));
        assert!("D9999999".parse::<Timeframe>().is_err());
    }

    #[test]
    fn bucket_start_aligns() {
        assert_eq!(Timeframe::M15.bucket_start(at(10, 37)), at(10, 30));
        assert_eq!(Timeframe::H1.bucket_start(at(10, 37)), at(10, 0));
        assert_eq!(Timeframe::D1.bucket_start(at(10, 37)), at(0, 0));
    }

    #[test]
    fn rejects_non_multiple_target() {
        let result = CandleAggregator::new(Timeframe::M5, Timeframe::from_minutes(7).unwrap());
        assert!(matches!(result, Err(StratError::Timeframe { .. })));
    }

    #[test]
    fn same_timeframe_finishes_every_bar() {
        let mut agg = CandleAggregator::new(Timeframe::M5, Timeframe::M5).unwrap();
        let out = agg.push(&bar(at(10, 0), 1.0, 2.0, 0.5, 1.5));
        assert_eq!(out.len(), 1);
        assert!(out[0].is_finished());
    }

    #[test]
    fn aggregates_into_coarser_candle() {
        let mut agg = CandleAggregator::new(Timeframe::M5, Timeframe::M15).unwrap();

        let first = agg.push(&bar(at(10, 0), 1.0, 2.0, 0.9, 1.5));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].state, CandleState::Active);

        let second = agg.push(&bar(at(10, 5), 1.5, 3.0, 1.2, 2.5));
        assert_eq!(second[0].state, CandleState::Active);
        assert_eq!(second[0].high, 3.0);

        let third = agg.push(&bar(at(10, 10), 2.5, 2.6, 0.4, 2.0));
        assert_eq!(third.len(), 1);
        let candle = &third[0];
        assert!(candle.is_finished());
        assert_eq!(candle.open_time, at(10, 0));
        assert_eq!(candle.open, 1.0);
        assert_eq!(candle.high, 3.0);
        assert_eq!(candle.low, 0.4);
        assert_eq!(candle.close, 2.0);
        assert_eq!(candle.volume, 30.0);
    }

    #[test]
    fn gap_finishes_stale_bucket() {
        let mut agg = CandleAggregator::new(Timeframe::M5, Timeframe::M15).unwrap();
        agg.push(&bar(at(10, 0), 1.0, 2.0, 0.9, 1.5));
        let out = agg.push(&bar(at(10, 20), 1.6, 1.7, 1.5, 1.6));
        assert_eq!(out.len(), 2);
        assert!(out[0].is_finished());
        assert_eq!(out[0].open_time, at(10, 0));
        assert_eq!(out[1].state, CandleState::Active);
        assert_eq!(out[1].open_time, at(10, 15));
    }
}
