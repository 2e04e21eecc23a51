//! DeMarker oscillator.
//!
//! DeMax = max(high - prev_high, 0), DeMin = max(prev_low - low, 0),
//! DeM = SMA(DeMax) / (SMA(DeMax) + SMA(DeMin)), 0.5 when both are flat.

use ta::indicators::SimpleMovingAverage;
use ta::{High, Low, Next, Reset};

use crate::domain::error::StratError;

#[derive(Debug, Clone)]
pub struct DeMarker {
    de_max: SimpleMovingAverage,
    de_min: SimpleMovingAverage,
    prev: Option<(f64, f64)>,
    period: usize,
    seen: usize,
}

impl DeMarker {
    pub fn new(period: usize) -> Result<Self, StratError> {
        Ok(DeMarker {
            de_max: SimpleMovingAverage::new(period)?,
            de_min: SimpleMovingAverage::new(period)?,
            prev: None,
            period,
            seen: 0,
        })
    }

    pub fn is_formed(&self) -> bool {
        self.seen > self.period
    }
}

impl<T: High + Low> Next<&T> for DeMarker {
    type Output = f64;

    fn next(&mut self, input: &T) -> f64 {
        let (high, low) = (input.high(), input.low());
        self.seen = self.seen.saturating_add(1);

        let Some((prev_high, prev_low)) = self.prev.replace((high, low)) else {
            return 0.5;
        };

        let up = self.de_max.next((high - prev_high).max(0.0));
        let down = self.de_min.next((prev_low - low).max(0.0));
        let total = up + down;
        if total == 0.0 { 0.5 } else { up / total }
    }
}

impl Reset for DeMarker {
    fn reset(&mut self) {
        self.de_max.reset();
        self.de_min.reset();
        self.prev = None;
        self.seen = 0;
    }
}
