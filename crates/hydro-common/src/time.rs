//! Scene-id date parsing.
//!
//! Scene ids are fixed-width, digit-only strings (with an optional leading
//! `A` for MODIS and GLDAS). Each product family encodes the acquisition date
//! with one of the layouts below.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};

/// Date layout embedded in a scene id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneDateFormat {
    /// `A%Y%j`, e.g. `A2020100`.
    AYearDoy,
    /// `%Y%m%d`, e.g. `20200101`.
    YearMonthDay,
    /// `A%Y%m%d`, e.g. `A20200101`.
    AYearMonthDay,
    /// `%y%j`, e.g. `20032`.
    ShortYearDoy,
    /// `%y%m%d`, e.g. `200101`.
    ShortYearMonthDay,
    /// `%Y%m%d%H`, e.g. `2020010106`.
    YearMonthDayHour,
}

impl SceneDateFormat {
    /// chrono format string of the layout.
    pub fn pattern(&self) -> &'static str {
        match self {
            SceneDateFormat::AYearDoy => "A%Y%j",
            SceneDateFormat::YearMonthDay => "%Y%m%d",
            SceneDateFormat::AYearMonthDay => "A%Y%m%d",
            SceneDateFormat::ShortYearDoy => "%y%j",
            SceneDateFormat::ShortYearMonthDay => "%y%m%d",
            SceneDateFormat::YearMonthDayHour => "%Y%m%d%H",
        }
    }

    /// Exact length of a scene id in this layout.
    pub fn width(&self) -> usize {
        match self {
            SceneDateFormat::AYearDoy => 8,
            SceneDateFormat::YearMonthDay => 8,
            SceneDateFormat::AYearMonthDay => 9,
            SceneDateFormat::ShortYearDoy => 5,
            SceneDateFormat::ShortYearMonthDay => 6,
            SceneDateFormat::YearMonthDayHour => 10,
        }
    }

    /// Parse the calendar date of a scene id.
    ///
    /// chrono accepts short or signed numeric fields, so the id must also have
    /// the exact width and only digits after the optional `A`. Two-digit years
    /// below 70 are 2000s. The hour of `%Y%m%d%H` is range-checked and dropped.
    pub fn parse(&self, scene_id: &str) -> CommonResult<NaiveDate> {
        let invalid = || CommonError::InvalidDate {
            value: scene_id.to_string(),
            format: self.pattern().to_string(),
        };

        let digits = scene_id.strip_prefix('A').unwrap_or(scene_id);
        if scene_id.len() != self.width() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        NaiveDate::parse_from_str(scene_id, self.pattern()).map_err(|_| invalid())
    }
}
