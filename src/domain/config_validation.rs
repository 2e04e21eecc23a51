//! Configuration validation.
//!
//! Validates config fields before a backtest or optimisation runs.

use crate::domain::candle::parse_time;
use crate::domain::error::StratError;
use crate::domain::timeframe::Timeframe;
use crate::ports::config_port::ConfigPort;

pub const OPTIMIZE_METRICS: [&str; 3] = ["total_return", "sharpe", "profit_factor"];

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), StratError> {
    validate_initial_capital(config)?;
    validate_commission(config)?;
    validate_slippage(config)?;
    validate_risk_free_rate(config)?;
    validate_timeframe(config)?;
    validate_dates(config)?;
    validate_data_dir(config)?;
    validate_codes(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), StratError> {
    match config.get_string("strategy", "name") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(StratError::ConfigMissing {
            section: "strategy".to_string(),
            key: "name".to_string(),
        }),
    }
}

pub fn validate_optimize_config(config: &dyn ConfigPort) -> Result<(), StratError> {
    match config.get_string("optimize", "params") {
        Some(s) if s.split(',').any(|p| !p.trim().is_empty()) => {}
        _ => {
            return Err(StratError::ConfigMissing {
                section: "optimize".to_string(),
                key: "params".to_string(),
            });
        }
    }

    match config.get_string("optimize", "metric") {
        Some(metric) if !OPTIMIZE_METRICS.contains(&metric.trim()) => Err(invalid(
            "optimize",
            "metric",
            format!("metric must be one of {}", OPTIMIZE_METRICS.join(", ")),
        )),
        _ => Ok(()),
    }
}

/// Sections the loader never reads, usually a typo such as `[strategies]`.
pub fn unknown_sections(config: &dyn ConfigPort) -> Vec<String> {
    config
        .sections()
        .into_iter()
        .filter(|name| {
            !KNOWN_SECTIONS.contains(&name.as_str())
                && !name.starts_with("security.")
                && name != "default"
        })
        .collect()
}

const KNOWN_SECTIONS: [&str; 5] = ["backtest", "security", "strategy", "optimize", "report"];

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> StratError {
    StratError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), StratError> {
    let value = config.get_double("backtest", "initial_capital", 100_000.0);
    if value <= 0.0 {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), StratError> {
    let per_trade = config.get_double("backtest", "commission_per_trade", 0.0);
    if per_trade < 0.0 {
        return Err(invalid(
            "backtest",
            "commission_per_trade",
            "commission_per_trade must be non-negative",
        ));
    }
    let pct = config.get_double("backtest", "commission_pct", 0.0);
    if pct < 0.0 {
        return Err(invalid(
            "backtest",
            "commission_pct",
            "commission_pct must be non-negative",
        ));
    }
    Ok(())
}

fn validate_slippage(config: &dyn ConfigPort) -> Result<(), StratError> {
    let value = config.get_double("backtest", "slippage_pct", 0.0);
    if value < 0.0 {
        return Err(invalid(
            "backtest",
            "slippage_pct",
            "slippage_pct must be non-negative",
        ));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), StratError> {
    let value = config.get_double("backtest", "risk_free_rate", 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_timeframe(config: &dyn ConfigPort) -> Result<(), StratError> {
    if let Some(raw) = config.get_string("backtest", "timeframe") {
        raw.parse::<Timeframe>()
            .map_err(|e| invalid("backtest", "timeframe", e.to_string()))?;
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), StratError> {
    let start = parse_optional_time(config, "start_date")?;
    let end = parse_optional_time(config, "end_date")?;

    match (start, end) {
        (Some(start), Some(end)) if start >= end => Err(invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        )),
        _ => Ok(()),
    }
}

/// Read an optional `[backtest]` timestamp key.
pub fn parse_optional_time(
    config: &dyn ConfigPort,
    key: &str,
) -> Result<Option<chrono::NaiveDateTime>, StratError> {
    match config.get_string("backtest", key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_time(&s).map(Some).ok_or_else(|| {
            invalid(
                "backtest",
                key,
                format!("invalid {key} format, expected YYYY-MM-DD [HH:MM:SS]"),
            )
        }),
    }
}

fn validate_data_dir(config: &dyn ConfigPort) -> Result<(), StratError> {
    match config.get_string("backtest", "data_dir") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(StratError::ConfigMissing {
            section: "backtest".to_string(),
            key: "data_dir".to_string(),
        }),
    }
}

fn validate_codes(config: &dyn ConfigPort) -> Result<(), StratError> {
    let codes = config.get_string("backtest", "codes");
    let code = config.get_string("backtest", "code");

    match (codes, code) {
        (Some(c), _) if !c.trim().is_empty() => Ok(()),
        (None, Some(c)) if !c.trim().is_empty() => Ok(()),
        _ => Err(StratError::ConfigMissing {
            section: "backtest".to_string(),
            key: "code".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    const VALID: &str = r#"
[backtest]
data_dir = data
initial_capital = 100000.0
commission_per_trade = 1.0
commission_pct = 0.01
slippage_pct = 0.05
risk_free_rate = 0.05
timeframe = M15
start_date = 2024-01-01
end_date = 2024-06-30 23:59:00
code = EURUSD
"#;

    #[test]
    fn unknown_sections_flags_typos_only() {
        let config = make_config(
            "[backtest]\ncode = EURUSD\n\n[security.EURUSD]\ndecimals = 5\n\n[strategies]\nname = ma_crossover\n\n[report]\ntrades_path = t.csv\n",
        );
        assert_eq!(unknown_sections(&config), vec!["strategies".to_string()]);
        assert!(unknown_sections(&make_config(VALID)).is_empty());
    }

    fn with_line(key: &str, value: &str) -> FileConfigAdapter {
        let prefix = format!("{key} =");
        let mut lines: Vec<String> = VALID
            .lines()
            .filter(|l| !l.starts_with(&prefix))
            .map(str::to_string)
            .collect();
        lines.push(format!("{key} = {value}"));
        make_config(&lines.join("\n"))
    }

    fn assert_invalid(config: &FileConfigAdapter, expected_key: &str) {
        match validate_backtest_config(config) {
            Err(StratError::ConfigInvalid { key, .. }) => assert_eq!(key, expected_key),
            other => panic!("expected ConfigInvalid for {expected_key}, got {other:?}"),
        }
    }

    #[test]
    fn valid_backtest_config_passes() {
        assert!(validate_backtest_config(&make_config(VALID)).is_ok());
    }

    #[test]
    fn dates_are_optional() {
        let config = make_config("[backtest]\ndata_dir = d\ncodes = A,B\n");
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn initial_capital_must_be_positive() {
        assert_invalid(&with_line("initial_capital", "0"), "initial_capital");
        assert_invalid(&with_line("initial_capital", "-5"), "initial_capital");
    }

    #[test]
    fn negative_costs_fail() {
        assert_invalid(&with_line("commission_per_trade", "-1"), "commission_per_trade");
        assert_invalid(&with_line("commission_pct", "-0.1"), "commission_pct");
        assert_invalid(&with_line("slippage_pct", "-0.1"), "slippage_pct");
    }

    #[test]
    fn risk_free_rate_out_of_range_fails() {
        assert_invalid(&with_line("risk_free_rate", "1.5"), "risk_free_rate");
        assert_invalid(&with_line("risk_free_rate", "-0.01"), "risk_free_rate");
    }

    #[test]
    fn bad_timeframe_fails() {
        assert_invalid(&with_line("timeframe", "Q7"), "timeframe");
    }

    #[test]
    fn invalid_start_date_format_fails() {
        assert_invalid(&with_line("start_date", "01/01/2024"), "start_date");
    }

    #[test]
    fn start_date_after_end_date_fails() {
        assert_invalid(&with_line("start_date", "2025-01-01"), "start_date");
    }

    #[test]
    fn missing_data_dir_fails() {
        let config = make_config("[backtest]\ncode = EURUSD\n");
        assert!(matches!(
            validate_backtest_config(&config),
            Err(StratError::ConfigMissing { ref key, .. }) if key == "data_dir"
        ));
    }

    #[test]
    fn missing_code_fails() {
        let config = make_config("[backtest]\ndata_dir = data\n");
        assert!(matches!(
            validate_backtest_config(&config),
            Err(StratError::ConfigMissing { ref key, .. }) if key == "code"
        ));
    }

    #[test]
    fn strategy_name_required() {
        assert!(validate_strategy_config(&make_config("[strategy]\nname = ma_crossover\n")).is_ok());
        assert!(matches!(
            validate_strategy_config(&make_config("[strategy]\nvolume = 1\n")),
            Err(StratError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn optimize_config_checks_params_and_metric() {
        let ok = make_config("[optimize]\nparams = fast_period, slow_period\nmetric = sharpe\n");
        assert!(validate_optimize_config(&ok).is_ok());

        let no_params = make_config("[optimize]\nmetric = sharpe\n");
        assert!(matches!(
            validate_optimize_config(&no_params),
            Err(StratError::ConfigMissing { .. })
        ));

        let bad_metric = make_config("[optimize]\nparams = volume\nmetric = luck\n");
        assert!(matches!(
            validate_optimize_config(&bad_metric),
            Err(StratError::ConfigInvalid { ref key, .. }) if key == "metric"
        ));
    }
}
