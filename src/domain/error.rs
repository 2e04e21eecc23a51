//! Domain error types.

/// Top-level error type for stratbook.
#[derive(Debug, thiserror::Error)]
pub enum StratError {
    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("invalid parameter {name}: {reason}")]
    Param { name: String, reason: String },

    #[error("invalid strategy state: {reason}")]
    InvalidState { reason: String },

    #[error("indicator error: {reason}")]
    Indicator { reason: String },

    #[error("timeframe error: {reason}")]
    Timeframe { reason: String },

    #[error("insufficient data for {code}: have {bars} bars, need {minimum}")]
    InsufficientData {
        code: String,
        bars: usize,
        minimum: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StratError {
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        StratError::InvalidState {
            reason: reason.into(),
        }
    }

    pub fn param(name: &str, reason: impl Into<String>) -> Self {
        StratError::Param {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// `ta` constructors reject zero periods; surface that as an indicator error.
impl From<ta::errors::TaError> for StratError {
    fn from(err: ta::errors::TaError) -> Self {
        StratError::Indicator {
            reason: format!("{err:?}"),
        }
    }
}

impl From<&StratError> for std::process::ExitCode {
    fn from(err: &StratError) -> Self {
        let code: u8 = match err {
            StratError::Io(_) => 1,
            StratError::ConfigParse { .. }
            | StratError::ConfigMissing { .. }
            | StratError::ConfigInvalid { .. }
            | StratError::UnknownStrategy(_)
            | StratError::Param { .. } => 2,
            StratError::Data { .. } => 3,
            StratError::InvalidState { .. }
            | StratError::Indicator { .. }
            | StratError::Timeframe { .. } => 4,
            StratError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
