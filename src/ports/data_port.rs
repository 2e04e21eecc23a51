//! Candle history port trait.

use crate::domain::candle::Candle;
use crate::domain::error::StratError;
use chrono::NaiveDateTime;

pub trait DataPort {
    /// Finished source candles for `code` with open time in `[from, to]`,
    /// ordered by time. `None` bounds are open.
    fn fetch_candles(
        &self,
        code: &str,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> Result<Vec<Candle>, StratError>;

    fn list_codes(&self) -> Result<Vec<String>, StratError>;

    /// First and last open time plus bar count, or `None` if there is no data.
    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, StratError>;
}
