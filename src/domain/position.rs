//! Netted position tracking.
//!
//! One signed volume per security. Fills in the position's direction
//! re-average the entry price; opposite fills realise PnL on the closed part
//! and any remainder opens the other way at the fill price.

use chrono::NaiveDateTime;

use super::order::Side;

const VOLUME_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NetPosition {
    /// Positive long, negative short.
    pub volume: f64,
    pub avg_price: f64,
    pub opened_at: Option<NaiveDateTime>,
    /// Entry commission still attributed to the open volume.
    pub open_commission: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub code: String,
    pub side: Side,
    pub volume: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    /// Price PnL net of the entry and exit commission shares.
    pub pnl: f64,
}

impl NetPosition {
    pub fn is_flat(&self) -> bool {
        self.volume.abs() < VOLUME_EPSILON
    }

    pub fn is_long(&self) -> bool {
        self.volume >= VOLUME_EPSILON
    }

    pub fn is_short(&self) -> bool {
        self.volume <= -VOLUME_EPSILON
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        if self.is_flat() {
            0.0
        } else {
            self.volume * (price - self.avg_price)
        }
    }

    /// Apply a fill. Returns the price PnL realised by it and the closed
    /// trade it produced, if it reduced the position.
    pub fn apply_fill(
        &mut self,
        code: &str,
        side: Side,
        price: f64,
        volume: f64,
        commission: f64,
        time: NaiveDateTime,
    ) -> (f64, Option<ClosedTrade>) {
        let signed = side.sign() * volume;

        if self.is_flat() || self.volume.signum() == signed.signum() {
            let held = self.volume.abs();
            let total = held + volume;
            self.avg_price = if self.is_flat() {
                price
            } else {
                (self.avg_price * held + price * volume) / total
            };
            self.volume += signed;
            self.opened_at.get_or_insert(time);
            self.open_commission += commission;
            return (0.0, None);
        }

        let held = self.volume.abs();
        let closing = held.min(volume);
        let direction = self.volume.signum();
        let price_pnl = (price - self.avg_price) * closing * direction;

        let entry_share = self.open_commission * closing / held;
        let exit_share = commission * closing / volume;
        self.open_commission -= entry_share;

        let trade = ClosedTrade {
            code: code.to_string(),
            side: if direction > 0.0 { Side::Buy } else { Side::Sell },
            volume: closing,
            entry_price: self.avg_price,
            exit_price: price,
            entry_time: self.opened_at.unwrap_or(time),
            exit_time: time,
            pnl: price_pnl - entry_share - exit_share,
        };

        self.volume += signed;
        if self.is_flat() {
            *self = NetPosition::default();
        } else if volume - closing > VOLUME_EPSILON {
            // Flipped: the remainder opens at the fill price.
            self.avg_price = price;
            self.opened_at = Some(time);
            self.open_commission = commission - exit_share;
        }

        (price_pnl, Some(trade))
    }
}
