//! RFC 3339 timestamp parsing and formatting.
//!
//! Converts between RFC 3339 strings and `(seconds, nanos)` pairs counted
//! from the Unix epoch (1970-01-01T00:00:00Z), the layout of
//! `google.protobuf.Timestamp`. Output is always UTC with 0, 3, 6 or 9
//! fractional digits.

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;
const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Seconds of 0001-01-01T00:00:00Z.
pub const MIN_TIMESTAMP_SECONDS: i64 = -62_135_596_800;

/// Seconds of 9999-12-31T23:59:59Z.
pub const MAX_TIMESTAMP_SECONDS: i64 = 253_402_300_799;

/// Error type for RFC 3339 parsing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTimeParseError {
    pub message: String,
}

impl DateTimeParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for DateTimeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DateTimeParseError {}

/// Parses a timezone offset (Z, +HH:MM, -HH:MM) into minutes east of UTC.
fn parse_timezone_offset(offset: &str) -> Result<i64, DateTimeParseError> {
    if offset == "Z" || offset == "z" {
        return Ok(0);
    }

    let invalid = || DateTimeParseError::new(format!("Invalid timezone offset: {}", offset));
    if offset.len() != 6 || offset.as_bytes()[3] != b':' {
        return Err(invalid());
    }
    let sign = match offset.as_bytes()[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return Err(invalid()),
    };
    let hours = parse_digits(&offset[1..3]).ok_or_else(invalid)?;
    let minutes = parse_digits(&offset[4..6]).ok_or_else(invalid)?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    Ok(sign * (hours * 60 + minutes))
}

/// Parses a run of ASCII digits. Signs and whitespace are rejected.
fn parse_digits(s: &str) -> Option<i64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Parses fractional seconds into nanoseconds. At most nine digits.
fn parse_fractional_nanos(frac: &str) -> Result<i32, DateTimeParseError> {
    if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DateTimeParseError::new(format!(
            "Invalid fractional seconds: .{}",
            frac
        )));
    }
    let mut padded = frac.to_string();
    while padded.len() < 9 {
        padded.push('0');
    }
    padded
        .parse()
        .map_err(|_| DateTimeParseError::new(format!("Invalid fractional seconds: .{}", frac)))
}

/// Formats nanoseconds with 0, 3, 6 or 9 digits.
pub fn format_fractional_nanos(nanos: i32) -> String {
    if nanos == 0 {
        String::new()
    } else if nanos % 1_000_000 == 0 {
        format!(".{:03}", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!(".{:06}", nanos / 1_000)
    } else {
        format!(".{:09}", nanos)
    }
}

fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

fn days_in_month(year: i64, month: i64) -> i64 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Days since the Unix epoch of a proleptic Gregorian date.
fn date_to_days(year: i64, month: i64, day: i64) -> i64 {
    // Howard Hinnant's days_from_civil
    let y = if month <= 2 { year - 1 } else { year };
    let m = if month <= 2 { month + 9 } else { month - 3 };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let doy = (153 * m + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Inverse of [`date_to_days`].
fn days_to_date(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// Parses an RFC 3339 timestamp into seconds and nanoseconds since the
/// Unix epoch. Offsets are folded into UTC.
pub fn parse_timestamp_rfc3339(s: &str) -> Result<(i64, i32), DateTimeParseError> {
    let invalid = || DateTimeParseError::new(format!("Invalid RFC 3339 timestamp: {}", s));
    if !s.is_ascii() || s.len() < 20 {
        return Err(invalid());
    }
    let b = s.as_bytes();
    if b[4] != b'-' || b[7] != b'-' || !matches!(b[10], b'T' | b't') || b[13] != b':' || b[16] != b':'
    {
        return Err(invalid());
    }

    let year = parse_digits(&s[..4]).ok_or_else(invalid)?;
    let month = parse_digits(&s[5..7]).ok_or_else(invalid)?;
    let day = parse_digits(&s[8..10]).ok_or_else(invalid)?;
    let hours = parse_digits(&s[11..13]).ok_or_else(invalid)?;
    let minutes = parse_digits(&s[14..16]).ok_or_else(invalid)?;
    let seconds = parse_digits(&s[17..19]).ok_or_else(invalid)?;

    if !(1..=12).contains(&month) {
        return Err(DateTimeParseError::new(format!("Invalid month in timestamp: {}", s)));
    }
    if day < 1 || day > days_in_month(year, month) {
        return Err(DateTimeParseError::new(format!("Invalid day in timestamp: {}", s)));
    }
    if hours > 23 || minutes > 59 || seconds > 59 {
        return Err(DateTimeParseError::new(format!("Invalid time in timestamp: {}", s)));
    }

    let rest = &s[19..];
    let (nanos, offset_str) = match rest.strip_prefix('.') {
        Some(frac_and_tz) => {
            let frac_end = frac_and_tz
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(frac_and_tz.len());
            (
                parse_fractional_nanos(&frac_and_tz[..frac_end])?,
                &frac_and_tz[frac_end..],
            )
        }
        None => (0, rest),
    };
    if offset_str.is_empty() {
        return Err(DateTimeParseError::new(format!("Missing timezone in timestamp: {}", s)));
    }
    let offset_min = parse_timezone_offset(offset_str)?;

    let local = date_to_days(year, month, day) * SECONDS_PER_DAY
        + hours * SECONDS_PER_HOUR
        + minutes * SECONDS_PER_MINUTE
        + seconds;
    // local = UTC + offset
    let utc = local - offset_min * SECONDS_PER_MINUTE;
    if !(MIN_TIMESTAMP_SECONDS..=MAX_TIMESTAMP_SECONDS).contains(&utc) {
        return Err(DateTimeParseError::new(format!("Timestamp out of range: {}", s)));
    }
    Ok((utc, nanos))
}

/// Formats seconds and nanoseconds since the Unix epoch as an RFC 3339 UTC
/// timestamp.
///
/// The caller checks the range; see [`check_timestamp`].
pub fn format_timestamp_rfc3339(seconds: i64, nanos: i32) -> String {
    let days = seconds.div_euclid(SECONDS_PER_DAY);
    let time = seconds.rem_euclid(SECONDS_PER_DAY);
    let (year, month, day) = days_to_date(days);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}{}Z",
        year,
        month,
        day,
        time / SECONDS_PER_HOUR,
        (time % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE,
        time % SECONDS_PER_MINUTE,
        format_fractional_nanos(nanos)
    )
}

/// Validates a timestamp against the representable range.
pub fn check_timestamp(seconds: i64, nanos: i32) -> Result<(), DateTimeParseError> {
    if !(MIN_TIMESTAMP_SECONDS..=MAX_TIMESTAMP_SECONDS).contains(&seconds) {
        return Err(DateTimeParseError::new(format!(
            "timestamp seconds {} outside 0001-01-01..9999-12-31",
            seconds
        )));
    }
    if nanos < 0 || i64::from(nanos) >= NANOS_PER_SECOND {
        return Err(DateTimeParseError::new(format!(
            "timestamp nanos {} outside [0, 1e9)",
            nanos
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_basic() {
        assert_eq!(parse_timestamp_rfc3339("1970-01-01T00:00:00Z").unwrap(), (0, 0));
        assert_eq!(
            parse_timestamp_rfc3339("2024-03-15T14:30:00Z").unwrap(),
            (1_710_513_000, 0)
        );
        assert_eq!(
            parse_timestamp_rfc3339("2024-03-15T14:30:00.123456789Z").unwrap(),
            (1_710_513_000, 123_456_789)
        );
        assert_eq!(
            parse_timestamp_rfc3339("2024-03-15T14:30:00.5Z").unwrap(),
            (1_710_513_000, 500_000_000)
        );
    }

    #[test]
    fn test_parse_timestamp_offset() {
        let (with_offset, _) = parse_timestamp_rfc3339("2024-03-15T14:30:00+05:30").unwrap();
        let (utc, _) = parse_timestamp_rfc3339("2024-03-15T09:00:00Z").unwrap();
        assert_eq!(with_offset, utc);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp_rfc3339(0, 0), "1970-01-01T00:00:00Z");
        assert_eq!(
            format_timestamp_rfc3339(1_710_513_000, 500_000_000),
            "2024-03-15T14:30:00.500Z"
        );
        assert_eq!(
            format_timestamp_rfc3339(1_710_513_000, 123_456_000),
            "2024-03-15T14:30:00.123456Z"
        );
        assert_eq!(
            format_timestamp_rfc3339(1_710_513_000, 1),
            "2024-03-15T14:30:00.000000001Z"
        );
        assert_eq!(format_timestamp_rfc3339(-1, 0), "1969-12-31T23:59:59Z");
    }

    #[test]
    fn test_timestamp_bounds() {
        assert_eq!(format_timestamp_rfc3339(MIN_TIMESTAMP_SECONDS, 0), "0001-01-01T00:00:00Z");
        assert_eq!(format_timestamp_rfc3339(MAX_TIMESTAMP_SECONDS, 0), "9999-12-31T23:59:59Z");
        assert!(check_timestamp(MAX_TIMESTAMP_SECONDS + 1, 0).is_err());
        assert!(check_timestamp(0, 1_000_000_000).is_err());
        assert!(check_timestamp(0, -1).is_err());
        assert!(check_timestamp(0, 999_999_999).is_ok());
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let stamps = [
            "1970-01-01T00:00:00Z",
            "2000-02-29T12:00:00.250Z",
            "1969-07-20T20:17:40Z",
            "0001-01-01T00:00:00Z",
            "9999-12-31T23:59:59.999999999Z",
        ];
        for stamp in stamps {
            let (seconds, nanos) = parse_timestamp_rfc3339(stamp).unwrap();
            assert_eq!(format_timestamp_rfc3339(seconds, nanos), stamp, "roundtrip of {}", stamp);
        }
    }

    #[test]
    fn test_invalid_timestamps() {
        assert!(parse_timestamp_rfc3339("2024-13-01T00:00:00Z").is_err());
        assert!(parse_timestamp_rfc3339("2023-02-29T00:00:00Z").is_err());
        assert!(parse_timestamp_rfc3339("2024-03-15T24:00:00Z").is_err());
        assert!(parse_timestamp_rfc3339("2024-03-15T14:30:00").is_err());
        assert!(parse_timestamp_rfc3339("2024-03-15T14:30:00.Z").is_err());
        assert!(parse_timestamp_rfc3339("2024-03-15T14:30:00.1234567891Z").is_err());
        assert!(parse_timestamp_rfc3339("0000-12-31T23:59:59Z").is_err());
        assert!(parse_timestamp_rfc3339("not a timestamp at all").is_err());
    }

    #[test]
    fn test_timezone_offset_edge_cases() {
        assert_eq!(parse_timezone_offset("-08:00").unwrap(), -480);
        assert!(parse_timezone_offset("+24:00").is_err());
        assert!(parse_timezone_offset("+05-30").is_err());
    }
}
