//! Linear weighted moving average.
//!
//! O(1) per update: keeps the weighted sum and the plain window sum.
//! WMA(n) = (1*x[i-n+1] + 2*x[i-n+2] + ... + n*x[i]) / (n*(n+1)/2)
//! Before the window fills, the weights run 1..k over the k values seen.

use std::collections::VecDeque;

use ta::{Next, Reset};

use super::check_period;
use crate::domain::error::StratError;

#[derive(Debug, Clone)]
pub struct WeightedMovingAverage {
    period: usize,
    window: VecDeque<f64>,
    weighted_sum: f64,
    window_sum: f64,
}

impl WeightedMovingAverage {
    pub fn new(period: usize) -> Result<Self, StratError> {
        check_period(period)?;
        Ok(Self {
            period,
            window: VecDeque::with_capacity(period),
            weighted_sum: 0.0,
            window_sum: 0.0,
        })
    }
}

impl Next<f64> for WeightedMovingAverage {
    type Output = f64;

    fn next(&mut self, input: f64) -> f64 {
        if self.window.len() < self.period {
            self.window.push_back(input);
            self.weighted_sum += self.window.len() as f64 * input;
            self.window_sum += input;
        } else {
            self.weighted_sum += self.period as f64 * input - self.window_sum;
            let oldest = self.window.pop_front().unwrap_or(0.0);
            self.window.push_back(input);
            self.window_sum += input - oldest;
        }
        let k = self.window.len() as f64;
        self.weighted_sum / (k * (k + 1.0) / 2.0)
    }
}

impl Reset for WeightedMovingAverage {
    fn reset(&mut self) {
        self.window.clear();
        self.weighted_sum = 0.0;
        self.window_sum = 0.0;
    }
}
