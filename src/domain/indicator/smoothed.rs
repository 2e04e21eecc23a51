//! Smoothed moving average (SMMA, Wilder's average).
//!
//! Seeded with the simple mean of the first n values, then
//! SMMA[i] = (SMMA[i-1] * (n-1) + x[i]) / n.

use ta::{Next, Reset};

use super::check_period;
use crate::domain::error::StratError;

#[derive(Debug, Clone)]
pub struct SmoothedMovingAverage {
    period: usize,
    count: usize,
    sum: f64,
    value: f64,
}

impl SmoothedMovingAverage {
    pub fn new(period: usize) -> Result<Self, StratError> {
        check_period(period)?;
        Ok(Self {
            period,
            count: 0,
            sum: 0.0,
            value: 0.0,
        })
    }
}

impl Next<f64> for SmoothedMovingAverage {
    type Output = f64;

    fn next(&mut self, input: f64) -> f64 {
        if self.count < self.period {
            self.count += 1;
            self.sum += input;
            self.value = self.sum / self.count as f64;
        } else {
            let n = self.period as f64;
            self.value = (self.value * (n - 1.0) + input) / n;
        }
        self.value
    }
}

impl Reset for SmoothedMovingAverage {
    fn reset(&mut self) {
        self.count = 0;
        self.sum = 0.0;
        self.value = 0.0;
    }
}
