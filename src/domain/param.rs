//! Tunable strategy parameters with display and optimizer metadata.
//!
//! `StrategyParam<T>` is the typed field a strategy reads its settings from.
//! `Param` is the object-safe view used by the config loader, the `describe`
//! command and the optimizer, none of which know the concrete types.

use std::fmt;

use super::error::StratError;
use super::indicator::MaKind;
use super::timeframe::Timeframe;

/// Values a `StrategyParam` can hold.
pub trait ParamValue: Clone + fmt::Debug + PartialEq + 'static {
    fn parse_value(raw: &str) -> Result<Self, String>;
    fn format_value(&self) -> String;
    fn is_positive(&self) -> bool;
    /// Candidates from `min` to `max` inclusive, `step` apart.
    fn stepped(min: &Self, max: &Self, step: &Self) -> Vec<Self>;
}

impl ParamValue for usize {
    fn parse_value(raw: &str) -> Result<Self, String> {
        raw.trim().parse().map_err(|e| format!("{e}"))
    }

    fn format_value(&self) -> String {
        self.to_string()
    }

    fn is_positive(&self) -> bool {
        *self > 0
    }

    fn stepped(min: &Self, max: &Self, step: &Self) -> Vec<Self> {
        (*min..=*max).step_by((*step).max(1)).collect()
    }
}

impl ParamValue for u32 {
    fn parse_value(raw: &str) -> Result<Self, String> {
        raw.trim().parse().map_err(|e| format!("{e}"))
    }

    fn format_value(&self) -> String {
        self.to_string()
    }

    fn is_positive(&self) -> bool {
        *self > 0
    }

    fn stepped(min: &Self, max: &Self, step: &Self) -> Vec<Self> {
        (*min..=*max).step_by((*step).max(1) as usize).collect()
    }
}

impl ParamValue for i64 {
    fn parse_value(raw: &str) -> Result<Self, String> {
        raw.trim().parse().map_err(|e| format!("{e}"))
    }

    fn format_value(&self) -> String {
        self.to_string()
    }

    fn is_positive(&self) -> bool {
        *self > 0
    }

    fn stepped(min: &Self, max: &Self, step: &Self) -> Vec<Self> {
        (*min..=*max).step_by((*step).max(1) as usize).collect()
    }
}

impl ParamValue for f64 {
    fn parse_value(raw: &str) -> Result<Self, String> {
        let value: f64 = raw.trim().parse().map_err(|e| format!("{e}"))?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err("value must be finite".into())
        }
    }

    fn format_value(&self) -> String {
        self.to_string()
    }

    fn is_positive(&self) -> bool {
        *self > 0.0
    }

    fn stepped(min: &Self, max: &Self, step: &Self) -> Vec<Self> {
        if *step <= 0.0 || max < min {
            return vec![*min];
        }
        let count = ((max - min) / step + 1e-9).floor() as usize;
        (0..=count).map(|i| min + step * i as f64).collect()
    }
}

impl ParamValue for bool {
    fn parse_value(raw: &str) -> Result<Self, String> {
        match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            other => Err(format!("'{other}' is not a boolean")),
        }
    }

    fn format_value(&self) -> String {
        self.to_string()
    }

    fn is_positive(&self) -> bool {
        *self
    }

    fn stepped(_min: &Self, _max: &Self, _step: &Self) -> Vec<Self> {
        vec![false, true]
    }
}

impl ParamValue for MaKind {
    fn parse_value(raw: &str) -> Result<Self, String> {
        raw.parse()
    }

    fn format_value(&self) -> String {
        self.to_string()
    }

    fn is_positive(&self) -> bool {
        true
    }

    fn stepped(min: &Self, max: &Self, _step: &Self) -> Vec<Self> {
        MaKind::ALL
            .iter()
            .copied()
            .filter(|k| k >= min && k <= max)
            .collect()
    }
}

impl ParamValue for Timeframe {
    fn parse_value(raw: &str) -> Result<Self, String> {
        raw.parse().map_err(|e: StratError| e.to_string())
    }

    fn format_value(&self) -> String {
        self.to_string()
    }

    fn is_positive(&self) -> bool {
        self.minutes() > 0
    }

    fn stepped(min: &Self, max: &Self, step: &Self) -> Vec<Self> {
        (min.minutes()..=max.minutes())
            .step_by(step.minutes().max(1) as usize)
            .filter_map(|m| Timeframe::from_minutes(m).ok())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct OptimizeRange<T> {
    min: T,
    max: T,
    step: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParam<T: ParamValue> {
    name: String,
    display_name: String,
    description: String,
    group: String,
    value: T,
    default: T,
    greater_than_zero: bool,
    optimize: Option<OptimizeRange<T>>,
}

impl<T: ParamValue> StrategyParam<T> {
    pub fn new(name: &str, default: T) -> Self {
        StrategyParam {
            name: name.to_string(),
            display_name: name.to_string(),
            description: String::new(),
            group: "General".to_string(),
            value: default.clone(),
            default,
            greater_than_zero: false,
            optimize: None,
        }
    }

    pub fn set_display(mut self, display_name: &str, description: &str, group: &str) -> Self {
        self.display_name = display_name.to_string();
        self.description = description.to_string();
        self.group = group.to_string();
        self
    }

    pub fn set_greater_than_zero(mut self) -> Self {
        self.greater_than_zero = true;
        self
    }

    pub fn set_can_optimize(mut self, min: T, max: T, step: T) -> Self {
        self.optimize = Some(OptimizeRange { min, max, step });
        self
    }

    pub fn value(&self) -> T {
        self.value.clone()
    }

    pub fn set(&mut self, value: T) -> Result<(), StratError> {
        self.check(&value)?;
        self.value = value;
        Ok(())
    }

    fn check(&self, value: &T) -> Result<(), StratError> {
        if self.greater_than_zero && !value.is_positive() {
            return Err(StratError::param(&self.name, "must be greater than zero"));
        }
        Ok(())
    }
}

/// Object-safe view over a `StrategyParam`.
pub trait Param {
    fn name(&self) -> &str;
    fn display_name(&self) -> &str;
    fn description(&self) -> &str;
    fn group(&self) -> &str;
    fn value_string(&self) -> String;
    fn default_string(&self) -> String;
    fn set_from_str(&mut self, raw: &str) -> Result<(), StratError>;
    fn validate(&self) -> Result<(), StratError>;
    fn can_optimize(&self) -> bool;
    fn optimize_values(&self) -> Vec<String>;
    fn reset(&mut self);
}

impl<T: ParamValue> Param for StrategyParam<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn group(&self) -> &str {
        &self.group
    }

    fn value_string(&self) -> String {
        self.value.format_value()
    }

    fn default_string(&self) -> String {
        self.default.format_value()
    }

    fn set_from_str(&mut self, raw: &str) -> Result<(), StratError> {
        let value = T::parse_value(raw).map_err(|reason| StratError::param(&self.name, reason))?;
        self.set(value)
    }

    fn validate(&self) -> Result<(), StratError> {
        self.check(&self.value)
    }

    fn can_optimize(&self) -> bool {
        self.optimize.is_some()
    }

    fn optimize_values(&self) -> Vec<String> {
        match &self.optimize {
            Some(range) => T::stepped(&range.min, &range.max, &range.step)
                .iter()
                .map(ParamValue::format_value)
                .collect(),
            None => Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.value = self.default.clone();
    }
}

/// Collect `&dyn Param` views over strategy fields.
#[macro_export]
macro_rules! param_refs {
    ($($p:expr),* $(,)?) => {
        vec![$(&$p as &dyn $crate::domain::param::Param),*]
    };
}

/// Collect `&mut dyn Param` views over strategy fields.
#[macro_export]
macro_rules! param_refs_mut {
    ($($p:expr),* $(,)?) => {
        vec![$(&mut $p as &mut dyn $crate::domain::param::Param),*]
    };
}
