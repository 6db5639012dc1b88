//! Utility modules.

pub mod datetime;

pub use datetime::{
    check_timestamp, format_timestamp_rfc3339, parse_timestamp_rfc3339, DateTimeParseError,
};
