//! Ichimoku Kinko Hyo.
//!
//! Tenkan, kijun and senkou span B are channel midpoints over their periods.
//! Span A is the mean of tenkan and kijun. Both spans are plotted `kijun`
//! bars ahead, so the cloud under the current bar is the span pair computed
//! `kijun` bars earlier.

use std::collections::VecDeque;

use ta::indicators::{Maximum, Minimum};
use ta::{High, Low, Next, Reset};

use crate::domain::error::StratError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IchimokuOutput {
    pub tenkan: f64,
    pub kijun: f64,
    pub span_a: f64,
    pub span_b: f64,
}

impl IchimokuOutput {
    pub fn cloud_top(&self) -> f64 {
        self.span_a.max(self.span_b)
    }

    pub fn cloud_bottom(&self) -> f64 {
        self.span_a.min(self.span_b)
    }
}

#[derive(Debug, Clone)]
struct Channel {
    highest: Maximum,
    lowest: Minimum,
}

impl Channel {
    fn new(period: usize) -> Result<Self, StratError> {
        Ok(Channel {
            highest: Maximum::new(period)?,
            lowest: Minimum::new(period)?,
        })
    }

    fn midpoint(&mut self, high: f64, low: f64) -> f64 {
        (self.highest.next(high) + self.lowest.next(low)) / 2.0
    }

    fn reset(&mut self) {
        self.highest.reset();
        self.lowest.reset();
    }
}

#[derive(Debug, Clone)]
pub struct Ichimoku {
    tenkan: Channel,
    kijun: Channel,
    senkou: Channel,
    displacement: usize,
    warmup: usize,
    seen: usize,
    projected: VecDeque<(f64, f64)>,
}

impl Ichimoku {
    pub fn new(tenkan: usize, kijun: usize, senkou_b: usize) -> Result<Self, StratError> {
        Ok(Ichimoku {
            tenkan: Channel::new(tenkan)?,
            kijun: Channel::new(kijun)?,
            senkou: Channel::new(senkou_b)?,
            displacement: kijun,
            warmup: senkou_b.max(kijun) + kijun,
            seen: 0,
            projected: VecDeque::with_capacity(kijun + 1),
        })
    }

    /// Formed once the displaced spans were computed from full windows.
    pub fn is_formed(&self) -> bool {
        self.seen >= self.warmup
    }
}

impl<T: High + Low> Next<&T> for Ichimoku {
    type Output = IchimokuOutput;

    fn next(&mut self, input: &T) -> IchimokuOutput {
        let (high, low) = (input.high(), input.low());
        self.seen = self.seen.saturating_add(1);

        let tenkan = self.tenkan.midpoint(high, low);
        let kijun = self.kijun.midpoint(high, low);
        let span_b_now = self.senkou.midpoint(high, low);

        self.projected.push_back(((tenkan + kijun) / 2.0, span_b_now));
        if self.projected.len() > self.displacement + 1 {
            self.projected.pop_front();
        }
        let (span_a, span_b) = self
            .projected
            .front()
            .copied()
            .unwrap_or((tenkan, span_b_now));

        IchimokuOutput {
            tenkan,
            kijun,
            span_a,
            span_b,
        }
    }
}

impl Reset for Ichimoku {
    fn reset(&mut self) {
        self.tenkan.reset();
        self.kijun.reset();
        self.senkou.reset();
        self.projected.clear();
        self.seen = 0;
    }
}
