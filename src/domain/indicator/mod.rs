//! Indicator plumbing on top of the `ta` crate.
//!
//! Standard indicators (SMA, EMA, RSI, MACD, Bollinger, ATR, Stochastic,
//! CCI, Maximum/Minimum) are used straight from `ta::indicators`. This
//! module adds:
//! - `Formed`: warm-up tracking around any `Next` indicator
//! - `MaKind` / `MovingAverage`: moving-average selection by parameter
//! - the few indicators `ta` lacks, in the same streaming `Next` shape

pub mod demarker;
pub mod ichimoku;
pub mod smoothed;
pub mod weighted;

pub use demarker::DeMarker;
pub use ichimoku::{Ichimoku, IchimokuOutput};
pub use smoothed::SmoothedMovingAverage;
pub use weighted::WeightedMovingAverage;

use std::fmt;
use std::str::FromStr;

use ta::indicators::{ExponentialMovingAverage, SimpleMovingAverage};
use ta::{Next, Reset};

use super::error::StratError;

/// Counts inputs so callers can skip signals until the indicator has seen
/// its warm-up length.
#[derive(Debug, Clone)]
pub struct Formed<I> {
    inner: I,
    warmup: usize,
    seen: usize,
}

impl<I> Formed<I> {
    pub fn new(inner: I, warmup: usize) -> Self {
        Formed {
            inner,
            warmup,
            seen: 0,
        }
    }

    pub fn is_formed(&self) -> bool {
        self.seen >= self.warmup
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }
}

impl<I, T> Next<T> for Formed<I>
where
    I: Next<T>,
{
    type Output = I::Output;

    fn next(&mut self, input: T) -> Self::Output {
        self.seen = self.seen.saturating_add(1);
        self.inner.next(input)
    }
}

impl<I: Reset> Reset for Formed<I> {
    fn reset(&mut self) {
        self.seen = 0;
        self.inner.reset();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MaKind {
    Simple,
    Exponential,
    Smoothed,
    Weighted,
}

impl MaKind {
    pub const ALL: [MaKind; 4] = [
        MaKind::Simple,
        MaKind::Exponential,
        MaKind::Smoothed,
        MaKind::Weighted,
    ];
}

impl fmt::Display for MaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MaKind::Simple => "simple",
            MaKind::Exponential => "exponential",
            MaKind::Smoothed => "smoothed",
            MaKind::Weighted => "weighted",
        };
        f.write_str(name)
    }
}

impl FromStr for MaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" | "sma" => Ok(MaKind::Simple),
            "exponential" | "ema" => Ok(MaKind::Exponential),
            "smoothed" | "smma" => Ok(MaKind::Smoothed),
            "weighted" | "wma" | "lwma" => Ok(MaKind::Weighted),
            other => Err(format!("unknown moving average type '{other}'")),
        }
    }
}

/// A moving average whose flavour is chosen at runtime.
#[derive(Debug, Clone)]
pub enum MovingAverage {
    Simple(SimpleMovingAverage),
    Exponential(ExponentialMovingAverage),
    Smoothed(SmoothedMovingAverage),
    Weighted(WeightedMovingAverage),
}

impl MovingAverage {
    pub fn new(kind: MaKind, period: usize) -> Result<Self, StratError> {
        Ok(match kind {
            MaKind::Simple => MovingAverage::Simple(SimpleMovingAverage::new(period)?),
            MaKind::Exponential => {
                MovingAverage::Exponential(ExponentialMovingAverage::new(period)?)
            }
            MaKind::Smoothed => MovingAverage::Smoothed(SmoothedMovingAverage::new(period)?),
            MaKind::Weighted => MovingAverage::Weighted(WeightedMovingAverage::new(period)?),
        })
    }

    /// A moving average that reports formed after `period` inputs.
    pub fn formed(kind: MaKind, period: usize) -> Result<Formed<Self>, StratError> {
        Ok(Formed::new(Self::new(kind, period)?, period))
    }
}

impl Next<f64> for MovingAverage {
    type Output = f64;

    fn next(&mut self, input: f64) -> f64 {
        match self {
            MovingAverage::Simple(ma) => ma.next(input),
            MovingAverage::Exponential(ma) => ma.next(input),
            MovingAverage::Smoothed(ma) => ma.next(input),
            MovingAverage::Weighted(ma) => ma.next(input),
        }
    }
}

impl Reset for MovingAverage {
    fn reset(&mut self) {
        match self {
            MovingAverage::Simple(ma) => ma.reset(),
            MovingAverage::Exponential(ma) => ma.reset(),
            MovingAverage::Smoothed(ma) => ma.reset(),
            MovingAverage::Weighted(ma) => ma.reset(),
        }
    }
}

/// `ta` and the local indicators reject a zero period the same way.
pub(crate) fn check_period(period: usize) -> Result<(), StratError> {
    if period == 0 {
        return Err(StratError::Indicator {
            reason: "period must be greater than zero".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ma_kind_parse_aliases() {
        assert_eq!("SMA".parse::<MaKind>().unwrap(), MaKind::Simple);
        assert_eq!("ema".parse::<MaKind>().unwrap(), MaKind::Exponential);
        assert_eq!("smma".parse::<MaKind>().unwrap(), MaKind::Smoothed);
        assert_eq!("lwma".parse::<MaKind>().unwrap(), MaKind::Weighted);
        assert!("hull".parse::<MaKind>().is_err());
    }

    #[test]
    fn ma_kind_display_round_trips() {
        for kind in MaKind::ALL {
            assert_eq!(kind.to_string().parse::<MaKind>().unwrap(), kind);
        }
    }

    #[test]
    fn factory_rejects_zero_period() {
        for kind in MaKind::ALL {
            assert!(MovingAverage::new(kind, 0).is_err());
        }
    }

    #[test]
    fn simple_factory_averages() {
        let mut ma = MovingAverage::new(MaKind::Simple, 3).unwrap();
        ma.next(1.0);
        ma.next(2.0);
        assert_relative_eq!(ma.next(3.0), 2.0);
        assert_relative_eq!(ma.next(6.0), (2.0 + 3.0 + 6.0) / 3.0);
    }

    #[test]
    fn formed_counts_warmup() {
        let mut ma = MovingAverage::formed(MaKind::Exponential, 3).unwrap();
        ma.next(1.0);
        ma.next(1.0);
        assert!(!ma.is_formed());
        ma.next(1.0);
        assert!(ma.is_formed());
        ma.reset();
        assert!(!ma.is_formed());
    }
}
