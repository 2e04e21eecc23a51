//! Instrument metadata: price step, pip size and volume rules.

use super::error::StratError;

#[derive(Debug, Clone, PartialEq)]
pub struct Security {
    pub code: String,
    pub price_step: f64,
    pub decimals: u32,
    pub volume_step: f64,
    pub min_volume: f64,
    pub max_volume: f64,
}

impl Security {
    pub fn new(code: impl Into<String>) -> Self {
        Security {
            code: code.into(),
            price_step: 0.0001,
            decimals: 4,
            volume_step: 1.0,
            min_volume: 1.0,
            max_volume: f64::MAX,
        }
    }

    pub fn validate(&self) -> Result<(), StratError> {
        if self.price_step <= 0.0 {
            return Err(self.invalid("price_step", "price_step must be positive"));
        }
        if self.volume_step <= 0.0 {
            return Err(self.invalid("volume_step", "volume_step must be positive"));
        }
        if self.min_volume < 0.0 || self.max_volume < self.min_volume {
            return Err(self.invalid(
                "min_volume",
                "min_volume must be non-negative and not above max_volume",
            ));
        }
        Ok(())
    }

    fn invalid(&self, key: &str, reason: &str) -> StratError {
        StratError::ConfigInvalid {
            section: format!("security.{}", self.code),
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// One pip. Five- and three-digit quotes carry a fractional pip, so the
    /// pip is ten price steps there.
    pub fn pip_size(&self) -> f64 {
        if self.decimals == 3 || self.decimals == 5 {
            self.price_step * 10.0
        } else {
            self.price_step
        }
    }

    pub fn pips_to_price(&self, pips: f64) -> f64 {
        pips * self.pip_size()
    }

    pub fn price_to_pips(&self, distance: f64) -> f64 {
        distance / self.pip_size()
    }

    pub fn normalize_price(&self, price: f64) -> f64 {
        (price / self.price_step).round() * self.price_step
    }

    /// Floor to the volume step and clamp to the tradable range. Anything
    /// below the minimum volume normalises to zero.
    pub fn normalize_volume(&self, volume: f64) -> f64 {
        if volume <= 0.0 {
            return 0.0;
        }
        // Nudge before flooring so 0.3 / 0.1 does not land on 2.999...
        let steps = (volume / self.volume_step + 1e-9).floor();
        let normalized = (steps * self.volume_step).min(self.max_volume);
        if normalized < self.min_volume || normalized <= 0.0 {
            0.0
        } else {
            normalized
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fx_security() -> Security {
        Security {
            code: "EURUSD".into(),
            price_step: 0.00001,
            decimals: 5,
            volume_step: 0.01,
            min_volume: 0.01,
            max_volume: 50.0,
        }
    }

    #[test]
    fn pip_size_fractional_quote() {
        assert_relative_eq!(fx_security().pip_size(), 0.0001);
    }

    #[test]
    fn pip_size_three_digits() {
        let sec = Security {
            price_step: 0.001,
            decimals: 3,
            ..fx_security()
        };
        assert_relative_eq!(sec.pip_size(), 0.01);
    }

    #[test]
    fn pip_size_plain_quote() {
        let sec = Security {
            price_step: 0.01,
            decimals: 2,
            ..fx_security()
        };
        assert_relative_eq!(sec.pip_size(), 0.01);
    }

    #[test]
    fn pips_round_trip() {
        let sec = fx_security();
        assert_relative_eq!(sec.pips_to_price(25.0), 0.0025);
        assert_relative_eq!(sec.price_to_pips(0.0025), 25.0, epsilon = 1e-9);
    }

    #[test]
    fn normalize_volume_floors_to_step() {
        let sec = fx_security();
        assert_relative_eq!(sec.normalize_volume(0.137), 0.13, epsilon = 1e-12);
        assert_relative_eq!(sec.normalize_volume(0.3), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn normalize_volume_below_minimum_is_zero() {
        let sec = fx_security();
        assert_eq!(sec.normalize_volume(0.004), 0.0);
        assert_eq!(sec.normalize_volume(-1.0), 0.0);
    }

    #[test]
    fn normalize_volume_clamps_to_max() {
        let sec = fx_security();
        assert_relative_eq!(sec.normalize_volume(120.0), 50.0);
    }

    #[test]
    fn normalize_price_rounds_to_step() {
        let sec = fx_security();
        assert_relative_eq!(sec.normalize_price(1.234567), 1.23457, epsilon = 1e-12);
    }

    #[test]
    fn validate_rejects_bad_steps() {
        let sec = Security {
            price_step: 0.0,
            ..fx_security()
        };
        assert!(sec.validate().is_err());
        assert!(fx_security().validate().is_ok());
    }
}
