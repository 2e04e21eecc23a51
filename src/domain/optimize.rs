//! Brute-force parameter optimisation.
//!
//! Every combination of the listed parameters' optimisation ranges is run
//! through the multi-code backtest, and the runs are ranked by one metric.

use std::fmt;
use std::str::FromStr;

use tracing::{info, warn};

use super::backtest::{run_multi_code, BacktestConfig};
use super::candle::Candle;
use super::error::StratError;
use super::metrics::Metrics;
use super::security::Security;
use super::strategy::Strategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizeMetric {
    TotalReturn,
    Sharpe,
    ProfitFactor,
}

impl OptimizeMetric {
    pub fn score(&self, metrics: &Metrics) -> f64 {
        match self {
            OptimizeMetric::TotalReturn => metrics.total_return,
            OptimizeMetric::Sharpe => metrics.sharpe_ratio,
            OptimizeMetric::ProfitFactor => metrics.profit_factor,
        }
    }
}

impl fmt::Display for OptimizeMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OptimizeMetric::TotalReturn => "total_return",
            OptimizeMetric::Sharpe => "sharpe",
            OptimizeMetric::ProfitFactor => "profit_factor",
        })
    }
}

impl FromStr for OptimizeMetric {
    type Err = StratError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "total_return" => Ok(OptimizeMetric::TotalReturn),
            "sharpe" => Ok(OptimizeMetric::Sharpe),
            "profit_factor" => Ok(OptimizeMetric::ProfitFactor),
            other => Err(StratError::ConfigInvalid {
                section: "optimize".to_string(),
                key: "metric".to_string(),
                reason: format!("unknown metric '{other}'"),
            }),
        }
    }
}

/// One parameter assignment: `(name, value)` pairs in listing order.
pub type ParamSet = Vec<(String, String)>;

#[derive(Debug, Clone)]
pub struct OptimizeRun {
    pub params: ParamSet,
    pub metrics: Metrics,
    pub score: f64,
}

/// Cartesian product of the optimisation ranges of `names`.
pub fn build_grid(strategy: &dyn Strategy, names: &[String]) -> Result<Vec<ParamSet>, StratError> {
    let mut grid: Vec<ParamSet> = vec![Vec::new()];

    for name in names {
        let param = strategy
            .param(name)
            .ok_or_else(|| StratError::param(name, "no such parameter"))?;
        if !param.can_optimize() {
            return Err(StratError::param(name, "parameter has no optimisation range"));
        }
        let values = param.optimize_values();
        if values.is_empty() {
            return Err(StratError::param(name, "optimisation range is empty"));
        }

        grid = grid
            .into_iter()
            .flat_map(|set| {
                values.iter().map(move |value| {
                    let mut next = set.clone();
                    next.push((name.clone(), value.clone()));
                    next
                })
            })
            .collect();
    }

    Ok(grid)
}

/// Apply one assignment to a strategy.
pub fn apply_params(strategy: &mut dyn Strategy, params: &ParamSet) -> Result<(), StratError> {
    for (name, value) in params {
        let mut found = false;
        for param in strategy.params_mut() {
            if param.name() == name {
                param.set_from_str(value)?;
                found = true;
                break;
            }
        }
        if !found {
            return Err(StratError::param(name, "no such parameter"));
        }
    }
    Ok(())
}

/// Run the grid and return the runs best first.
///
/// `make_strategy` builds the base strategy (defaults plus config values);
/// each combination is applied on top of it. Combinations the strategy
/// rejects at start-up (for example a fast period above the slow one) are
/// skipped.
pub fn run_optimization<F>(
    inputs: &[(Security, Vec<Candle>)],
    mut make_strategy: F,
    names: &[String],
    metric: OptimizeMetric,
    config: &BacktestConfig,
) -> Result<Vec<OptimizeRun>, StratError>
where
    F: FnMut() -> Result<Box<dyn Strategy>, StratError>,
{
    let base = make_strategy()?;
    let grid = build_grid(base.as_ref(), names)?;
    info!(
        strategy = base.id(),
        combinations = grid.len(),
        %metric,
        "optimisation started"
    );

    let mut runs = Vec::with_capacity(grid.len());
    for params in grid {
        let result = run_multi_code(
            inputs,
            || {
                let mut strategy = make_strategy()?;
                apply_params(strategy.as_mut(), &params)?;
                strategy.validate_params()?;
                Ok(strategy)
            },
            config,
        );

        match result {
            Ok(result) => {
                let score = metric.score(&result.aggregate);
                runs.push(OptimizeRun {
                    params,
                    metrics: result.aggregate,
                    score,
                });
            }
            Err(e @ (StratError::InvalidState { .. } | StratError::Param { .. })) => {
                warn!(?params, error = %e, "skipping parameter combination");
            }
            Err(e) => return Err(e),
        }
    }

    runs.sort_by(|a, b| rank_key(b.score).total_cmp(&rank_key(a.score)));
    Ok(runs)
}

/// NaN scores sort last.
fn rank_key(score: f64) -> f64 {
    if score.is_nan() {
        f64::NEG_INFINITY
    } else {
        score
    }
}
