use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid range {0:?}, expected one of 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max")]
pub struct InvalidRange(pub String);

/// Named history window, matching the market data provider's periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RangeSpec {
    OneDay,
    FiveDays,
    OneMonth,
    ThreeMonths,
    #[default]
    SixMonths,
    OneYear,
    TwoYears,
    FiveYears,
    TenYears,
    YearToDate,
    Max,
}

impl RangeSpec {
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeSpec::OneDay => "1d",
            RangeSpec::FiveDays => "5d",
            RangeSpec::OneMonth => "1mo",
            RangeSpec::ThreeMonths => "3mo",
            RangeSpec::SixMonths => "6mo",
            RangeSpec::OneYear => "1y",
            RangeSpec::TwoYears => "2y",
            RangeSpec::FiveYears => "5y",
            RangeSpec::TenYears => "10y",
            RangeSpec::YearToDate => "ytd",
            RangeSpec::Max => "max",
        }
    }
}

impl FromStr for RangeSpec {
    type Err = InvalidRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let range = match s.trim().to_ascii_lowercase().as_str() {
            "1d" => RangeSpec::OneDay,
            "5d" => RangeSpec::FiveDays,
            "1mo" => RangeSpec::OneMonth,
            "3mo" => RangeSpec::ThreeMonths,
            "6mo" => RangeSpec::SixMonths,
            "1y" => RangeSpec::OneYear,
            "2y" => RangeSpec::TwoYears,
            "5y" => RangeSpec::FiveYears,
            "10y" => RangeSpec::TenYears,
            "ytd" => RangeSpec::YearToDate,
            "max" => RangeSpec::Max,
            _ => return Err(InvalidRange(s.to_string())),
        };
        Ok(range)
    }
}

impl TryFrom<String> for RangeSpec {
    type Error = InvalidRange;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RangeSpec> for String {
    fn from(value: RangeSpec) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
