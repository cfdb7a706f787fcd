//! Reporting timezone offset and calendar-day ranges.
//!
//! Every day bucket in the system is computed as
//! `floor_to_day(occurred_at + reporting_offset)`. Nothing stores a bucketed
//! day, so changing the offset reclassifies history on the next query.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{StepError, StepResult};

/// A signed `±HH:MM` offset from UTC used for day bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingOffset(FixedOffset);

impl ReportingOffset {
    pub fn utc() -> Self {
        ReportingOffset(Utc.fix())
    }

    /// Build an offset from a signed number of minutes east of UTC.
    pub fn from_minutes(minutes: i32) -> StepResult<Self> {
        FixedOffset::east_opt(minutes * 60)
            .map(ReportingOffset)
            .ok_or_else(|| StepError::InvalidOffset(format!("{minutes} minutes is out of range")))
    }

    /// Parse `+HH:MM` / `-HH:MM`. `Z` and `UTC` are accepted for `+00:00`.
    pub fn parse(input: &str) -> StepResult<Self> {
        let s = input.trim();
        if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
            return Ok(Self::utc());
        }

        let invalid = || StepError::InvalidOffset(format!("expected \"+HH:MM\", got {input:?}"));

        let (sign, rest) = match s.as_bytes().first() {
            Some(b'+') => (1, &s[1..]),
            Some(b'-') => (-1, &s[1..]),
            _ => return Err(invalid()),
        };
        let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
        if hours.len() != 2 || minutes.len() != 2 {
            return Err(invalid());
        }
        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
        if hours > 23 || minutes > 59 {
            return Err(invalid());
        }

        Self::from_minutes(sign * (hours * 60 + minutes))
    }

    pub fn as_fixed(&self) -> FixedOffset {
        self.0
    }

    pub fn total_minutes(&self) -> i32 {
        self.0.local_minus_utc() / 60
    }

    /// Calendar day of `ts` in this offset.
    pub fn day_of(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.0).date_naive()
    }

    /// UTC instant at which `day` begins in this offset. Saturates at the
    /// representable bounds for days at the edge of the calendar.
    pub fn start_of_day(&self, day: NaiveDate) -> DateTime<Utc> {
        let local_midnight = day.and_time(NaiveTime::default());
        let shift = Duration::seconds(i64::from(self.0.local_minus_utc()));
        match local_midnight.checked_sub_signed(shift) {
            Some(utc) => Utc.from_utc_datetime(&utc),
            None if shift > Duration::zero() => DateTime::<Utc>::MIN_UTC,
            None => DateTime::<Utc>::MAX_UTC,
        }
    }
}

impl Default for ReportingOffset {
    fn default() -> Self {
        Self::utc()
    }
}

impl fmt::Display for ReportingOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total_minutes();
        let sign = if total < 0 { '-' } else { '+' };
        let abs = total.abs();
        write!(f, "{}{:02}:{:02}", sign, abs / 60, abs % 60)
    }
}

impl FromStr for ReportingOffset {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ReportingOffset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ReportingOffset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_day(input: &str) -> StepResult<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| StepError::InvalidDate(format!("{input:?}: {e}")))
}

/// Inclusive range of calendar days in the reporting offset.
///
/// A range with `from > to` is empty; queries over it return empty results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DayRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    pub fn single(day: NaiveDate) -> Self {
        Self { from: day, to: day }
    }

    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }

    /// Number of days in the range (0 when empty).
    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.to - self.from).num_days() as usize + 1
        }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.from <= day && day <= self.to
    }

    /// Every day in the range, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let to = self.to;
        self.from.iter_days().take_while(move |d| *d <= to)
    }

    /// Half-open UTC window `[start, end)` covering the range in `offset`.
    pub fn utc_window(&self, offset: ReportingOffset) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = offset.start_of_day(self.from);
        let end = self
            .to
            .succ_opt()
            .map(|next| offset.start_of_day(next))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn day(s: &str) -> NaiveDate {
        parse_day(s).unwrap()
    }

    #[test]
    fn test_parse_and_display_offsets() {
        assert_eq!(ReportingOffset::parse("+03:00").unwrap().total_minutes(), 180);
        assert_eq!(ReportingOffset::parse("-05:30").unwrap().total_minutes(), -330);
        assert_eq!(ReportingOffset::parse("Z").unwrap(), ReportingOffset::utc());
        assert_eq!(ReportingOffset::parse("-05:30").unwrap().to_string(), "-05:30");
        assert_eq!(ReportingOffset::utc().to_string(), "+00:00");
    }

    #[test]
    fn test_reject_malformed_offsets() {
        for bad in ["", "03:00", "+3:00", "+03", "+24:00", "+03:60", "+ab:cd", "Moscow"] {
            let err = ReportingOffset::parse(bad).unwrap_err();
            assert!(matches!(err, StepError::InvalidOffset(_)), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_day_of_near_midnight() {
        let event = ts("2024-03-10T22:30:00Z");
        assert_eq!(ReportingOffset::utc().day_of(event), day("2024-03-10"));
        let moscow = ReportingOffset::parse("+03:00").unwrap();
        assert_eq!(moscow.day_of(event), day("2024-03-11"));
        let west = ReportingOffset::parse("-01:00").unwrap();
        assert_eq!(west.day_of(ts("2024-03-11T00:30:00Z")), day("2024-03-10"));
    }

    #[test]
    fn test_utc_window_shifts_with_offset() {
        let range = DayRange::single(day("2024-03-11"));
        let moscow = ReportingOffset::parse("+03:00").unwrap();
        let (start, end) = range.utc_window(moscow);
        assert_eq!(start, ts("2024-03-10T21:00:00Z"));
        assert_eq!(end, ts("2024-03-11T21:00:00Z"));
    }

    #[test]
    fn test_utc_window_at_calendar_edges() {
        for raw in ["+03:00", "-05:00"] {
            let offset = ReportingOffset::parse(raw).unwrap();
            for edge in [NaiveDate::MIN, NaiveDate::MAX] {
                let parsed = parse_day(&edge.format("%Y-%m-%d").to_string()).unwrap();
                assert_eq!(parsed, edge);
                let (start, end) = DayRange::single(parsed).utc_window(offset);
                assert!(start <= end, "{raw} {parsed}: {start} > {end}");
            }
        }

        let east = ReportingOffset::parse("+03:00").unwrap();
        assert_eq!(east.start_of_day(NaiveDate::MIN), DateTime::<Utc>::MIN_UTC);
        let (_, end) = DayRange::single(NaiveDate::MAX).utc_window(east);
        assert_eq!(end, DateTime::<Utc>::MAX_UTC);

        let west = ReportingOffset::parse("-05:00").unwrap();
        assert_eq!(
            west.start_of_day(NaiveDate::MIN),
            DateTime::<Utc>::MIN_UTC + Duration::hours(5)
        );
    }

    #[test]
    fn test_day_range_iteration() {
        let range = DayRange::new(day("2024-02-27"), day("2024-03-01"));
        assert_eq!(range.len(), 4);
        let days: Vec<_> = range.days().collect();
        assert_eq!(days.first(), Some(&day("2024-02-27")));
        assert_eq!(days.last(), Some(&day("2024-03-01")));

        let inverted = DayRange::new(day("2024-03-02"), day("2024-03-01"));
        assert!(inverted.is_empty());
        assert_eq!(inverted.len(), 0);
        assert_eq!(inverted.days().count(), 0);
    }

    #[test]
    fn test_offset_serde_as_string() {
        let offset: ReportingOffset = serde_json::from_str("\"+05:45\"").unwrap();
        assert_eq!(offset.total_minutes(), 345);
        assert_eq!(serde_json::to_string(&offset).unwrap(), "\"+05:45\"");
        assert!(serde_json::from_str::<ReportingOffset>("\"noon\"").is_err());
    }
}
