//! Universe module for multi-code backtesting.
//!
//! Parses code lists from configuration and validates that each code has
//! sufficient data for backtesting.

use crate::domain::error::StratError;
use crate::ports::data_port::DataPort;
use chrono::NaiveDateTime;
use std::collections::HashSet;
use tracing::{info, warn};

pub const MIN_BARS: usize = 30;

#[derive(Debug, Clone)]
pub struct Universe {
    pub codes: Vec<String>,
}

impl Universe {
    pub fn count(&self) -> usize {
        self.codes.len()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),
}

impl From<UniverseError> for StratError {
    fn from(err: UniverseError) -> Self {
        StratError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "codes".to_string(),
            reason: err.to_string(),
        }
    }
}

pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(UniverseError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}

#[derive(Debug, Clone)]
pub struct UniverseValidationResult {
    pub universe: Universe,
    pub skipped: Vec<SkippedCode>,
}

#[derive(Debug, Clone)]
pub struct SkippedCode {
    pub code: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    InsufficientBars { bars: usize },
}

pub fn validate_universe(
    data_port: &dyn DataPort,
    codes: Vec<String>,
    from: Option<NaiveDateTime>,
    to: Option<NaiveDateTime>,
) -> Result<UniverseValidationResult, StratError> {
    let mut valid_codes = Vec::new();
    let mut skipped = Vec::new();

    for code in codes {
        let candles = match data_port.fetch_candles(&code, from, to) {
            Ok(data) => data,
            Err(e) => {
                warn!(%code, error = %e, "skipping code");
                skipped.push(SkippedCode {
                    code,
                    reason: SkipReason::NoData,
                });
                continue;
            }
        };

        if candles.is_empty() {
            warn!(%code, "skipping code: no data found");
            skipped.push(SkippedCode {
                code,
                reason: SkipReason::NoData,
            });
            continue;
        }

        if candles.len() < MIN_BARS {
            warn!(%code, bars = candles.len(), minimum = MIN_BARS, "skipping code: too few bars");
            skipped.push(SkippedCode {
                code,
                reason: SkipReason::InsufficientBars {
                    bars: candles.len(),
                },
            });
            continue;
        }

        info!(%code, bars = candles.len(), "code ok");
        valid_codes.push(code);
    }

    if valid_codes.is_empty() {
        let bars = skipped
            .iter()
            .filter_map(|s| match s.reason {
                SkipReason::InsufficientBars { bars } => Some(bars),
                SkipReason::NoData => None,
            })
            .max()
            .unwrap_or(0);
        return Err(StratError::InsufficientData {
            code: "all".to_string(),
            bars,
            minimum: MIN_BARS,
        });
    }

    if !skipped.is_empty() {
        eprintln!(
            "Backtesting {} of {} codes",
            valid_codes.len(),
            valid_codes.len() + skipped.len()
        );
    }

    Ok(UniverseValidationResult {
        universe: Universe { codes: valid_codes },
        skipped,
    })
}
