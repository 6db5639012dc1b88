use crate::error::{Error, Result};
use crate::hooks::WellKnownCodec;
use crate::model::{Amino, TypeDef, Value};
use crate::util::datetime::format_fractional_nanos;

use super::{decode_message, encode_message, join, json_str, split, DURATION};

/// Largest magnitude of [`Duration::seconds`], about 10,000 years.
pub const MAX_DURATION_SECONDS: i64 = 315_576_000_000;

const NANOS_PER_SECOND: i32 = 1_000_000_000;

/// A signed span of time. `seconds` and `nanos` never have opposite signs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration {
    pub seconds: i64,
    pub nanos: i32,
}

impl Duration {
    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    /// Parses the JSON string form, e.g. `"1.5s"` or `"-0.000001s"`.
    pub fn parse(s: &str) -> Result<Self> {
        let (seconds, nanos) = parse_duration(s)?;
        Ok(Self { seconds, nanos })
    }
}

impl std::fmt::Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_duration(self.seconds, self.nanos))
    }
}

impl Amino for Duration {
    fn type_def() -> TypeDef {
        TypeDef::named(DURATION)
    }

    fn to_value(&self) -> Value {
        join(self.seconds, self.nanos)
    }

    fn from_value(value: Value) -> Result<Self> {
        let (seconds, nanos) = split(DURATION, &value)?;
        Ok(Self { seconds, nanos })
    }
}

fn check_duration(seconds: i64, nanos: i32) -> Result<()> {
    if !(-MAX_DURATION_SECONDS..=MAX_DURATION_SECONDS).contains(&seconds) {
        return Err(Error::invalid(format!(
            "duration seconds {} out of range",
            seconds
        )));
    }
    if nanos <= -NANOS_PER_SECOND || nanos >= NANOS_PER_SECOND {
        return Err(Error::invalid(format!("duration nanos {} out of range", nanos)));
    }
    if (seconds < 0 && nanos > 0) || (seconds > 0 && nanos < 0) {
        return Err(Error::invalid(format!(
            "duration seconds {} and nanos {} have different signs",
            seconds, nanos
        )));
    }
    Ok(())
}

fn format_duration(seconds: i64, nanos: i32) -> String {
    let sign = if seconds < 0 || nanos < 0 { "-" } else { "" };
    format!(
        "{}{}{}s",
        sign,
        seconds.unsigned_abs(),
        format_fractional_nanos(nanos.abs())
    )
}

fn parse_duration(s: &str) -> Result<(i64, i32)> {
    let bad = || Error::invalid(format!("invalid duration {:?}", s));
    let body = s.strip_suffix('s').ok_or_else(bad)?;
    let (negative, body) = match body.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, body),
    };
    let (whole, frac) = match body.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (body, ""),
    };
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if whole.is_empty() || !all_digits(whole) || !all_digits(frac) || frac.len() > 9 {
        return Err(bad());
    }
    if body.ends_with('.') {
        return Err(bad());
    }

    let seconds: i64 = whole.parse().map_err(|_| bad())?;
    let nanos: i32 = if frac.is_empty() {
        0
    } else {
        format!("{:0<9}", frac).parse().map_err(|_| bad())?
    };
    let (seconds, nanos) = if negative { (-seconds, -nanos) } else { (seconds, nanos) };
    check_duration(seconds, nanos)?;
    Ok((seconds, nanos))
}

/// Hook for `google.protobuf.Duration`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DurationCodec;

impl WellKnownCodec for DurationCodec {
    fn encode_json(&self, value: &Value) -> Result<Option<serde_json::Value>> {
        let (seconds, nanos) = split(DURATION, value)?;
        check_duration(seconds, nanos)?;
        Ok(Some(serde_json::Value::String(format_duration(seconds, nanos))))
    }

    fn decode_json(&self, json: &serde_json::Value) -> Result<Option<Value>> {
        let Some(s) = json_str(DURATION, json)? else {
            return Ok(None);
        };
        let (seconds, nanos) = parse_duration(s)?;
        Ok(Some(join(seconds, nanos)))
    }

    fn encode_binary(&self, value: &Value) -> Result<Option<Vec<u8>>> {
        let (seconds, nanos) = split(DURATION, value)?;
        check_duration(seconds, nanos)?;
        Ok(Some(encode_message(seconds, nanos)))
    }

    fn decode_binary(&self, bz: &[u8]) -> Result<Option<Value>> {
        let (seconds, nanos) = decode_message(bz)?;
        check_duration(seconds, nanos)?;
        Ok(Some(join(seconds, nanos)))
    }
}
