use std::sync::LazyLock;

use chrono::{FixedOffset, NaiveDate, TimeZone};
use regex::Regex;

use crate::error::IngestError;

/// Republic-era years count from 1912, so year 1 maps to 1912.
pub const REPUBLIC_ERA_OFFSET: i32 = 1911;

/// Asia/Taipei has kept +08:00 without daylight saving since 1979.
pub const TAIPEI_UTC_OFFSET_SECS: i32 = 8 * 3600;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

const MONTH_MARKER: char = '月';
const DAY_MARKER: char = '日';

static LEADING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+").expect("static regex"));

/// Turns the date spellings found in vendor manifests into canonical
/// midnight timestamps in a fixed zone.
///
/// Two spellings are understood: `YYYY/MM/DD`, and a year-less
/// `M月D日` form that borrows the year derived from the sample's Path No.
/// Anything else normalizes to `None`; a bad date never fails a row.
#[derive(Debug, Clone, Copy)]
pub struct DateNormalizer {
    era_offset: i32,
    utc_offset: FixedOffset,
}

impl Default for DateNormalizer {
    fn default() -> Self {
        Self::taipei()
    }
}

impl DateNormalizer {
    pub fn taipei() -> Self {
        Self {
            era_offset: REPUBLIC_ERA_OFFSET,
            utc_offset: FixedOffset::east_opt(TAIPEI_UTC_OFFSET_SECS)
                .expect("+08:00 is a valid offset"),
        }
    }

    pub fn new(era_offset: i32, utc_offset: FixedOffset) -> Self {
        Self {
            era_offset,
            utc_offset,
        }
    }

    pub fn era_offset(&self) -> i32 {
        self.era_offset
    }

    /// Common-era year encoded in a Path No. such as `M112-00003`.
    ///
    /// The first hyphen-separated segment loses its leading letter and the
    /// digits that follow are read as a republic-era year.
    pub fn fiscal_year(&self, path_number: &str) -> Result<i32, IngestError> {
        let malformed = |reason: &str| IngestError::MalformedIdentifier {
            path_number: path_number.to_string(),
            reason: reason.to_string(),
        };

        let segment = path_number.split('-').next().unwrap_or_default();
        let mut chars = segment.chars();
        if chars.next().is_none() {
            return Err(malformed("empty year segment"));
        }
        let rest = chars.as_str();
        let digits = LEADING_DIGITS
            .find(rest)
            .ok_or_else(|| malformed("no year digits after the prefix letter"))?;
        let year = digits
            .as_str()
            .parse::<i32>()
            .map_err(|err| malformed(&err.to_string()))?;
        year.checked_add(self.era_offset)
            .ok_or_else(|| malformed("year out of range"))
    }

    /// Canonical timestamp for `raw`, or `None` when it does not parse.
    pub fn normalize(&self, raw: &str, fiscal_year: i32) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let date = if raw.contains(MONTH_MARKER) {
            parse_month_day(raw, fiscal_year)?
        } else {
            NaiveDate::parse_from_str(raw, "%Y/%m/%d").ok()?
        };
        self.format_midnight(date)
    }

    fn format_midnight(&self, date: NaiveDate) -> Option<String> {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        let local = self.utc_offset.from_local_datetime(&midnight).single()?;
        Some(local.format(TIMESTAMP_FORMAT).to_string())
    }
}

/// `6月15日` → June 15 of `year`. The day marker is optional.
fn parse_month_day(raw: &str, year: i32) -> Option<NaiveDate> {
    let (month, rest) = raw.split_once(MONTH_MARKER)?;
    let day = match rest.split_once(DAY_MARKER) {
        Some((day, _)) => day,
        None => rest,
    };
    let month = month.trim().parse::<u32>().ok()?;
    let day = day.trim().parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
