use crate::config::LocalTimeZone;
use crate::error::JsError;

pub const MS_PER_DAY: i64 = 86_400_000;
const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_MINUTE: i64 = 60_000;
pub const MAX_TIME: f64 = 8.64e15;

const MONTH_STARTS: [i64; 13] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334, 365];
const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Day number (days since the epoch) of the first day of `month` in `year`.
/// `month` is zero-based and may lie outside `0..12`; it is carried into
/// the year.
pub fn day_from_month(year: i64, month: i64) -> i64 {
    let year = year + month.div_euclid(12);
    let month = month.rem_euclid(12) as usize;
    let t = i64::from(month > 1);
    MONTH_STARTS[month] + (year - 1969 + t).div_euclid(4) - (year - 1901 + t).div_euclid(100)
        + (year - 1601 + t).div_euclid(400)
        + 365 * (year - 1970)
}

pub fn days_in_month(year: i64, month: i64) -> i64 {
    day_from_month(year, month + 1) - day_from_month(year, month)
}

/// 0 = Sunday.
pub fn week_day(day_number: i64) -> u32 {
    (day_number + 4).rem_euclid(7) as u32
}

pub fn time_clip(time: f64) -> f64 {
    if !time.is_finite() || time.abs() > MAX_TIME {
        return f64::NAN;
    }
    let t = time.trunc();
    if t == 0.0 { 0.0_f64 } else { t }
}

fn year_from_day(day_number: i64) -> i64 {
    let mut year = 1970 + (day_number * 10_000).div_euclid(3_652_425);
    while day_from_month(year, 0) > day_number {
        year -= 1;
    }
    while day_from_month(year + 1, 0) <= day_number {
        year += 1;
    }
    year
}

/// A time value broken down into calendar fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDate {
    pub year: i64,
    /// 0-based
    pub month: u32,
    /// 1-based
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub millisecond: u32,
    pub weekday: u32,
    pub day_number: i64,
}

impl CalendarDate {
    /// Builds a date from fields assumed to be in range.
    pub fn new(year: i64, month: u32, day: u32, hour: u32, minute: u32, second: u32, millisecond: u32) -> Self {
        let day_number = day_from_month(year, month as i64) + day as i64 - 1;
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            millisecond,
            weekday: week_day(day_number),
            day_number,
        }
    }

    /// `None` for time values outside `±MAX_TIME`, NaN included.
    pub fn from_time(t: f64) -> Option<Self> {
        if !(-MAX_TIME..=MAX_TIME).contains(&t) {
            return None;
        }
        Some(Self::decompose(t))
    }

    /// `t` must be finite and within a day of the valid range.
    fn decompose(t: f64) -> Self {
        let t = t.floor() as i64;
        let day_number = t.div_euclid(MS_PER_DAY);
        let ms = t.rem_euclid(MS_PER_DAY);
        let year = year_from_day(day_number);
        let mut month = 0;
        while month < 11 && day_from_month(year, month + 1) <= day_number {
            month += 1;
        }
        Self {
            year,
            month: month as u32,
            day: (day_number - day_from_month(year, month) + 1) as u32,
            hour: (ms / MS_PER_HOUR) as u32,
            minute: (ms / MS_PER_MINUTE % 60) as u32,
            second: (ms / 1000 % 60) as u32,
            millisecond: (ms % 1000) as u32,
            weekday: week_day(day_number),
            day_number,
        }
    }

    pub fn to_time(&self) -> f64 {
        (self.day_number * MS_PER_DAY
            + self.hour as i64 * MS_PER_HOUR
            + self.minute as i64 * MS_PER_MINUTE
            + self.second as i64 * 1000
            + self.millisecond as i64) as f64
    }

    fn day_name(&self) -> &'static str {
        DAY_NAMES[self.weekday as usize % 7]
    }

    fn month_name(&self) -> &'static str {
        MONTH_NAMES[self.month as usize % 12]
    }

    fn legacy_year(&self) -> String {
        if self.year < 0 {
            format!("-{:04}", self.year.unsigned_abs())
        } else {
            format!("{:04}", self.year)
        }
    }

    fn iso_year(&self) -> String {
        if (0..=9999).contains(&self.year) {
            format!("{:04}", self.year)
        } else if self.year > 0 {
            format!("+{:06}", self.year)
        } else {
            format!("-{:06}", self.year.unsigned_abs())
        }
    }

    fn hms(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

// Formatting

pub fn to_iso_string(t: f64) -> Result<String, JsError> {
    let d = CalendarDate::from_time(t)
        .ok_or_else(|| JsError::range_error("Invalid time value"))?;
    Ok(format!(
        "{}-{:02}-{:02}T{}.{:03}Z",
        d.iso_year(),
        d.month + 1,
        d.day,
        d.hms(),
        d.millisecond
    ))
}

pub fn to_utc_string(t: f64) -> String {
    match CalendarDate::from_time(t) {
        Some(d) => format!(
            "{}, {:02} {} {} {} GMT",
            d.day_name(),
            d.day,
            d.month_name(),
            d.legacy_year(),
            d.hms()
        ),
        None => "Invalid Date".to_string(),
    }
}

// The local instant may lie past MAX_TIME by up to the zone offset.
fn local_date(t: f64, tz: LocalTimeZone) -> Option<(CalendarDate, i32)> {
    if !(-MAX_TIME..=MAX_TIME).contains(&t) {
        return None;
    }
    Some((CalendarDate::decompose(tz.local_time(t)), tz.offset_at_utc(t)))
}

/// Calendar fields of `t` in local time.
pub fn local_fields(t: f64, tz: LocalTimeZone) -> Option<CalendarDate> {
    local_date(t, tz).map(|(d, _)| d)
}

fn gmt_offset(offset_minutes: i32) -> String {
    let sign = if offset_minutes >= 0 { '+' } else { '-' };
    let abs = offset_minutes.unsigned_abs();
    format!("GMT{sign}{:02}{:02}", abs / 60, abs % 60)
}

pub fn to_date_string(t: f64, tz: LocalTimeZone) -> String {
    match local_date(t, tz) {
        Some((d, _)) => format!(
            "{} {} {:02} {}",
            d.day_name(),
            d.month_name(),
            d.day,
            d.legacy_year()
        ),
        None => "Invalid Date".to_string(),
    }
}

pub fn to_time_string(t: f64, tz: LocalTimeZone) -> String {
    match local_date(t, tz) {
        Some((d, offset)) => format!("{} {}", d.hms(), gmt_offset(offset)),
        None => "Invalid Date".to_string(),
    }
}

/// `Date.prototype.toString`: `Wed Dec 09 2015 12:00:00 GMT+0100`.
pub fn to_date_time_string(t: f64, tz: LocalTimeZone) -> String {
    if local_date(t, tz).is_none() {
        return "Invalid Date".to_string();
    }
    format!("{} {}", to_date_string(t, tz), to_time_string(t, tz))
}

// Parsing

fn digits(bytes: &[u8], pos: usize, n: usize) -> Option<i64> {
    let slice = bytes.get(pos..pos + n)?;
    if !slice.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(slice.iter().fold(0, |acc, b| acc * 10 + (b - b'0') as i64))
}

/// Parses the simplified ISO 8601 format
/// `(YYYY|±YYYYYY)[-MM[-DD[THH:mm[:ss[.f+]][Z|±HH:mm]]]]`.
/// Returns NaN for anything invalid.
pub fn parse_iso(s: &str, tz: LocalTimeZone) -> f64 {
    parse_iso_match(s, tz).unwrap_or(f64::NAN)
}

/// `None` when `s` does not have the ISO shape at all; `Some(NaN)` when it
/// has the shape but a field is out of range.
fn parse_iso_match(s: &str, tz: LocalTimeZone) -> Option<f64> {
    let bytes = s.as_bytes();
    let len = bytes.len();

    let (year, mut pos) = match bytes.first()? {
        sign @ (b'+' | b'-') => {
            let y = digits(bytes, 1, 6)?;
            if *sign == b'-' && y == 0 {
                return Some(f64::NAN);
            }
            (if *sign == b'-' { -y } else { y }, 7)
        }
        _ => (digits(bytes, 0, 4)?, 4),
    };

    let mut month = 1;
    let mut day = 1;
    let (mut hour, mut minute, mut second, mut millisecond) = (0, 0, 0, 0);
    let mut has_time = false;
    // minutes east of UTC
    let mut offset: Option<i64> = None;

    if pos < len {
        if bytes[pos] != b'-' {
            return None;
        }
        month = digits(bytes, pos + 1, 2)?;
        pos += 3;
    }
    if pos < len {
        if bytes[pos] != b'-' {
            return None;
        }
        day = digits(bytes, pos + 1, 2)?;
        pos += 3;
    }
    if pos < len {
        if bytes[pos] != b'T' || bytes.get(pos + 3) != Some(&b':') {
            return None;
        }
        hour = digits(bytes, pos + 1, 2)?;
        minute = digits(bytes, pos + 4, 2)?;
        has_time = true;
        pos += 6;
        if bytes.get(pos) == Some(&b':') {
            second = digits(bytes, pos + 1, 2)?;
            pos += 3;
            if bytes.get(pos) == Some(&b'.') {
                let start = pos + 1;
                let mut end = start;
                while end < len && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end == start {
                    return None;
                }
                // first three digits, right-padded
                let frac = &s[start..end.min(start + 3)];
                millisecond = format!("{frac:0<3}").parse().ok()?;
                pos = end;
            }
        }
        match bytes.get(pos) {
            None => {}
            Some(b'Z') => {
                offset = Some(0);
                pos += 1;
            }
            Some(sign @ (b'+' | b'-')) => {
                if bytes.get(pos + 3) != Some(&b':') {
                    return None;
                }
                let oh = digits(bytes, pos + 1, 2)?;
                let om = digits(bytes, pos + 4, 2)?;
                if oh >= 24 || om >= 60 {
                    return Some(f64::NAN);
                }
                let minutes = oh * 60 + om;
                offset = Some(if *sign == b'-' { -minutes } else { minutes });
                pos += 6;
            }
            Some(_) => return None,
        }
    }
    if pos != len {
        return None;
    }

    let fractional_time = minute > 0 || second > 0 || millisecond > 0;
    let max_hour = if fractional_time { 24 } else { 25 };
    let valid = (1..=12).contains(&month)
        && day >= 1
        && day <= days_in_month(year, month - 1)
        && hour < max_hour
        && minute < 60
        && second < 60;
    if !valid {
        return Some(f64::NAN);
    }

    let day_number = day_from_month(year, month - 1) + day - 1;
    let mut t = (day_number * MS_PER_DAY
        + hour * MS_PER_HOUR
        + (minute - offset.unwrap_or(0)) * MS_PER_MINUTE
        + second * 1000
        + millisecond) as f64;
    if has_time && offset.is_none() {
        t = tz.utc_time(t);
    }
    if (-MAX_TIME..=MAX_TIME).contains(&t) {
        Some(t)
    } else {
        Some(f64::NAN)
    }
}

fn month_index(name: &str) -> Option<i64> {
    MONTH_NAMES.iter().position(|m| *m == name).map(|i| i as i64)
}

fn parse_hms(s: &str) -> Option<(i64, i64, i64)> {
    let bytes = s.as_bytes();
    if bytes.len() != 8 || bytes[2] != b':' || bytes[5] != b':' {
        return None;
    }
    Some((digits(bytes, 0, 2)?, digits(bytes, 3, 2)?, digits(bytes, 6, 2)?))
}

fn parse_legacy_year(s: &str) -> Option<i64> {
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if !(4..=6).contains(&body.len()) {
        return None;
    }
    let y = digits(body.as_bytes(), 0, body.len())?;
    Some(if negative { -y } else { y })
}

/// The formats written by `to_utc_string`, `to_date_time_string` and
/// `to_date_string`.
fn parse_legacy(s: &str, tz: LocalTimeZone) -> Option<f64> {
    let parts: Vec<&str> = s.split_whitespace().collect();
    let weekday = parts.first()?;
    let (utc_form, weekday) = match weekday.strip_suffix(',') {
        Some(w) => (true, w),
        None => (false, *weekday),
    };
    if !DAY_NAMES.contains(&weekday) {
        return None;
    }

    let (month, day) = if utc_form {
        (month_index(parts.get(2)?)?, digits(parts.get(1)?.as_bytes(), 0, 2)?)
    } else {
        (month_index(parts.get(1)?)?, digits(parts.get(2)?.as_bytes(), 0, 2)?)
    };
    let year = parse_legacy_year(parts.get(3)?)?;
    let (hour, minute, second) = match parts.get(4) {
        Some(hms) => parse_hms(hms)?,
        None if !utc_form => (0, 0, 0),
        None => return None,
    };

    let offset = match parts.get(5) {
        Some(&"GMT") | Some(&"UTC") | Some(&"Z") => Some(0),
        Some(zone) => {
            let zone = zone.strip_prefix("GMT")?;
            let bytes = zone.as_bytes();
            let sign = match bytes.first()? {
                b'+' => 1,
                b'-' => -1,
                _ => return None,
            };
            let oh = digits(bytes, 1, 2)?;
            let om = digits(bytes, 3, 2)?;
            if bytes.len() != 5 || oh >= 24 || om >= 60 {
                return None;
            }
            Some(sign * (oh * 60 + om))
        }
        None if utc_form => return None,
        None => None,
    };
    // anything after the zone must be a parenthesised zone name
    if let Some(rest) = parts.get(6)
        && !rest.starts_with('(')
    {
        return None;
    }

    if day < 1 || day > days_in_month(year, month) || hour >= 24 || minute >= 60 || second >= 60 {
        return Some(f64::NAN);
    }
    let day_number = day_from_month(year, month) + day - 1;
    let local = (day_number * MS_PER_DAY + hour * MS_PER_HOUR + minute * MS_PER_MINUTE + second * 1000) as f64;
    let t = match offset {
        Some(minutes) => local - (minutes * MS_PER_MINUTE) as f64,
        None => tz.utc_time(local),
    };
    Some(time_clip(t))
}

/// `Date.parse`: the ISO format first, then the legacy string formats this
/// module produces. NaN when nothing matches.
pub fn parse_date(s: &str, tz: LocalTimeZone) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return f64::NAN;
    }
    if let Some(t) = parse_iso_match(s, tz) {
        return t;
    }
    parse_legacy(s, tz).unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const UTC: LocalTimeZone = LocalTimeZone::UTC;

    #[test]
    fn day_numbers() {
        assert_eq!(day_from_month(1970, 0), 0);
        assert_eq!(day_from_month(1972, 2), 790);
        assert_eq!(day_from_month(2000, 2), 11017);
        assert_eq!(day_from_month(1999, 12), day_from_month(2000, 0));
        assert_eq!(day_from_month(2000, -1), day_from_month(1999, 11));
        assert_eq!(days_in_month(1900, 1), 28);
        assert_eq!(days_in_month(2000, 1), 29);
        assert_eq!(days_in_month(-4, 1), 29);
        assert_eq!(days_in_month(-100, 1), 28);
    }

    #[test]
    fn decompose_known_instants() {
        let d = CalendarDate::from_time(-1.0).unwrap();
        assert_eq!((d.year, d.month, d.day, d.hour, d.millisecond), (1969, 11, 31, 23, 999));
        let d = CalendarDate::from_time(MAX_TIME).unwrap();
        assert_eq!((d.year, d.month, d.day, d.weekday), (275760, 8, 13, 6));
        let d = CalendarDate::from_time(-MAX_TIME).unwrap();
        assert_eq!((d.year, d.month, d.day, d.weekday), (-271821, 3, 20, 2));
        assert_eq!(CalendarDate::from_time(-3509827329600292.0).unwrap().month, 0);
        assert!(CalendarDate::from_time(f64::NAN).is_none());
        assert!(CalendarDate::from_time(MAX_TIME + 1.0).is_none());
        assert!(CalendarDate::from_time(-MAX_TIME - 1.0).is_none());
    }

    #[test]
    fn out_of_range_times_are_invalid() {
        for t in [MAX_TIME + 1.0, -MAX_TIME - 1.0, 1e16, 1e300] {
            assert!(matches!(to_iso_string(t), Err(JsError::Range(_))), "{t}");
            assert_eq!(to_utc_string(t), "Invalid Date");
            assert_eq!(to_date_string(t, UTC), "Invalid Date");
            assert_eq!(to_time_string(t, UTC), "Invalid Date");
            assert_eq!(to_date_time_string(t, UTC), "Invalid Date");
        }
        // the edge itself still formats, even when the local instant is past it
        let east = LocalTimeZone::Fixed { offset_minutes: 600 };
        assert_eq!(to_date_string(MAX_TIME, east), "Sat Sep 13 275760");
        assert_eq!(to_time_string(MAX_TIME, east), "10:00:00 GMT+1000");
    }

    #[test]
    fn iso_formatting() {
        assert_eq!(to_iso_string(-1.0).unwrap(), "1969-12-31T23:59:59.999Z");
        assert!(to_iso_string(-62198755200000.0).unwrap().starts_with("-000001-01-01"));
        assert_eq!(to_iso_string(1e15).unwrap(), "+033658-09-27T01:46:40.000Z");
        assert!(matches!(to_iso_string(f64::NAN), Err(JsError::Range(_))));
        assert!(to_iso_string(f64::INFINITY).is_err());
    }

    #[test]
    fn legacy_formatting() {
        let t = -1509842289600292.0;
        assert_eq!(to_utc_string(t), "Mon, 01 Jan -45875 11:59:59 GMT");
        assert_eq!(to_date_string(t, UTC), "Mon Jan 01 -45875");
        let east = LocalTimeZone::Fixed { offset_minutes: 780 };
        assert_eq!(to_date_string(t, east), "Tue Jan 02 -45875");
        let cet = LocalTimeZone::Fixed { offset_minutes: 60 };
        assert_eq!(to_date_time_string(1449662400000.0, cet), "Wed Dec 09 2015 13:00:00 GMT+0100");
        let west = LocalTimeZone::Fixed { offset_minutes: -330 };
        assert_eq!(to_time_string(0.0, west), "18:30:00 GMT-0530");
        assert_eq!(to_utc_string(f64::NAN), "Invalid Date");
        assert_eq!(to_date_time_string(f64::NAN, UTC), "Invalid Date");
        assert_eq!(to_utc_string(-62198755200000.0), "Fri, 01 Jan -0001 00:00:00 GMT");
    }

    #[test]
    fn iso_parsing() {
        assert_eq!(parse_iso("+033658-09-27T01:46:40.000Z", UTC), 1e15);
        assert_eq!(parse_iso("1970", UTC), 0.0);
        assert_eq!(parse_iso("1970-01-02", UTC), MS_PER_DAY as f64);
        assert_eq!(parse_iso("2000-01-01T00:00:00Z", UTC), 946684800000.0);
        assert_eq!(parse_iso("2000-01-01T01:00+01:00", UTC), 946684800000.0);
        assert_eq!(parse_iso("1970-01-01T00:00:00.1234Z", UTC), 123.0);
        assert_eq!(parse_iso("2012-04-04T24:00:00Z", UTC), parse_iso("2012-04-05", UTC));
        let cet = LocalTimeZone::Fixed { offset_minutes: 60 };
        assert_eq!(parse_iso("1970-01-01T01:00", cet), 0.0);
        // a date without a time is UTC even in a local zone
        assert_eq!(parse_iso("1970-01-01", cet), 0.0);
    }

    #[test]
    fn iso_rejects_invalid_fields() {
        for s in [
            "2012-04-04T24:00:00.500Z",
            "2012-11-31T23:59:59.000Z",
            "2012-12-31T23:59:60.000Z",
            "2013-02-29",
            "2012-13-01",
            "2012-00-01",
            "2012-01-01T12:00+24:00",
            "-000000-01-01",
            "+275760-09-13T00:00:00.001Z",
            "2012-1-01",
            "2012-01-01T12:00:00.Z",
            "2012-01-01 12:00",
            "12012",
        ] {
            assert!(parse_iso(s, UTC).is_nan(), "{s} should be rejected");
        }
    }

    #[test]
    fn parse_date_falls_back_to_legacy() {
        let t: f64 = -1509842289600292.0;
        let truncated = t - t.rem_euclid(1000.0);
        assert_eq!(parse_date(&to_utc_string(t), UTC), truncated);
        let cet = LocalTimeZone::Fixed { offset_minutes: 60 };
        let s = to_date_time_string(1449662400000.0, cet);
        assert_eq!(parse_date(&s, UTC), 1449662400000.0);
        assert_eq!(parse_date("Wed Dec 09 2015 13:00:00 GMT+0100 (CET)", UTC), 1449662400000.0);
        assert_eq!(parse_date("Thu Jan 01 1970", cet), -3_600_000.0);
        assert!(parse_date("not a date", UTC).is_nan());
        assert!(parse_date("Mon Feb 30 2015", UTC).is_nan());
        assert!(parse_date("", UTC).is_nan());
        // ISO-shaped but invalid strings do not fall through
        assert!(parse_date("2012-02-30", UTC).is_nan());
    }

    #[test]
    fn clip() {
        assert!(time_clip(8.64e15 + 1.0).is_nan());
        assert_eq!(time_clip(-0.0).to_bits(), 0.0f64.to_bits());
        assert_eq!(time_clip(1.7), 1.0);
    }

    proptest! {
        #[test]
        fn months_are_monotonic(year in -300_000i64..300_000, month in 0i64..12) {
            prop_assert!(day_from_month(year, month) < day_from_month(year, month + 1));
            prop_assert!(day_from_month(year, 11) < day_from_month(year + 1, 0));
        }

        #[test]
        fn february_matches_leap_rule(year in -300_000i64..300_000) {
            let leap = year.rem_euclid(4) == 0 && (year.rem_euclid(100) != 0 || year.rem_euclid(400) == 0);
            prop_assert_eq!(days_in_month(year, 1) == 29, leap);
        }

        #[test]
        fn iso_round_trip(t in -8.64e15f64..=8.64e15) {
            let t = t.floor();
            let s = to_iso_string(t).unwrap();
            prop_assert_eq!(parse_iso(&s, UTC), t);
        }

        #[test]
        fn fields_round_trip(t in -8.64e15f64..=8.64e15) {
            let t = t.floor();
            let d = CalendarDate::from_time(t).unwrap();
            prop_assert_eq!(d.to_time(), t);
            let rebuilt = CalendarDate::new(d.year, d.month, d.day, d.hour, d.minute, d.second, d.millisecond);
            prop_assert_eq!(rebuilt, d);
        }
    }
}
