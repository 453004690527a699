//! Event-time extraction used to order rows across sources.

use std::fmt;

use chrono::{
    format::{self, ParseResult, Parsed, StrftimeItems},
    Datelike, NaiveDate, NaiveDateTime, NaiveTime,
};
use thiserror::Error;

use crate::row::{Row, Value};

/// Errors raised while reading the event time out of a row.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimestampError {
    /// The configured timestamp field is not present in the row.
    #[error("timestamp field '{field}' is missing")]
    MissingField {
        /// Configured field name.
        field: String,
    },
    /// The field is present but `NULL`.
    #[error("timestamp field '{field}' is NULL")]
    Null {
        /// Configured field name.
        field: String,
    },
    /// The field holds a value that cannot represent a point in time.
    #[error("timestamp field '{field}' holds an unsupported value: {value}")]
    Unsupported {
        /// Configured field name.
        field: String,
        /// Rendered offending value.
        value: String,
    },
    /// The text did not match the configured format.
    #[error("cannot parse '{value}' with format '{format}': {source}")]
    Parse {
        /// Text that failed to parse.
        value: String,
        /// Format the text was parsed with.
        format: String,
        /// Underlying chrono error.
        #[source]
        source: chrono::ParseError,
    },
}

/// Date assumed when a format carries no date fields.
pub const DEFAULT_DATE: NaiveDate = match NaiveDate::from_ymd_opt(1900, 1, 1) {
    Some(date) => date,
    None => panic!("1900-01-01 is a valid date"),
};

/// Parsed, totally ordered event time of a row.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventTime(NaiveDateTime);

impl EventTime {
    /// Wrap an already-parsed datetime.
    #[inline]
    pub const fn new(at: NaiveDateTime) -> Self {
        Self(at)
    }

    /// Returns the underlying datetime.
    #[inline]
    pub const fn get(self) -> NaiveDateTime {
        self.0
    }

    /// Parse `text` with a `strftime`-style `format`.
    ///
    /// Fields the format does not carry take `strptime` defaults: a missing
    /// date is [`DEFAULT_DATE`], a missing month or day is 1 and missing time
    /// fields are 0. So `%Y-%m-%d` resolves to midnight, `%H:%M` to that time on
    /// [`DEFAULT_DATE`] and `%Y%m%d%H` to the top of the hour.
    pub fn parse(text: &str, format: &str) -> Result<Self, TimestampError> {
        let mut parsed = Parsed::new();
        format::parse(&mut parsed, text, StrftimeItems::new(format))
            .and_then(|()| fill_defaults(&mut parsed))
            .and_then(|()| parsed.to_naive_datetime_with_offset(0))
            .map(Self)
            .map_err(|source| TimestampError::Parse {
                value: text.to_owned(),
                format: format.to_owned(),
                source,
            })
    }

    /// Interpret a cell as an event time.
    ///
    /// Text and integers go through `format`; native dates and datetimes are
    /// taken as-is.
    pub fn from_value(field: &str, value: &Value, format: &str) -> Result<Self, TimestampError> {
        match value {
            Value::Text(text) => Self::parse(text, format),
            Value::Int(raw) => Self::parse(&raw.to_string(), format),
            Value::UInt(raw) => Self::parse(&raw.to_string(), format),
            Value::DateTime(at) => Ok(Self(*at)),
            Value::Date(date) => Ok(Self(date.and_time(NaiveTime::MIN))),
            Value::Null => Err(TimestampError::Null {
                field: field.to_owned(),
            }),
            other => Err(TimestampError::Unsupported {
                field: field.to_owned(),
                value: other.to_string(),
            }),
        }
    }

    /// Read `field` from `row` and interpret it with `format`.
    pub fn extract(row: &Row, field: &str, format: &str) -> Result<Self, TimestampError> {
        let value = row.get(field).ok_or_else(|| TimestampError::MissingField {
            field: field.to_owned(),
        })?;
        Self::from_value(field, value, format)
    }
}

/// Complete `parsed` the way `strptime` does. Only unset fields are touched,
/// and a parsed epoch timestamp already determines everything.
fn fill_defaults(parsed: &mut Parsed) -> ParseResult<()> {
    if parsed.timestamp().is_some() {
        return Ok(());
    }

    let has_year = parsed.year().is_some()
        || parsed.year_mod_100().is_some()
        || parsed.isoyear().is_some()
        || parsed.isoyear_mod_100().is_some();
    if !has_year {
        parsed.set_year(i64::from(DEFAULT_DATE.year()))?;
    }
    let week_or_ordinal = parsed.ordinal().is_some()
        || parsed.isoweek().is_some()
        || parsed.week_from_sun().is_some()
        || parsed.week_from_mon().is_some();
    if !week_or_ordinal {
        if parsed.month().is_none() {
            parsed.set_month(i64::from(DEFAULT_DATE.month()))?;
        }
        if parsed.day().is_none() {
            parsed.set_day(i64::from(DEFAULT_DATE.day()))?;
        }
    }

    match (parsed.hour_div_12(), parsed.hour_mod_12()) {
        (None, None) => parsed.set_hour(0)?,
        // `%I` without `%p` reads as AM.
        (None, Some(_)) => parsed.set_ampm(false)?,
        _ => {}
    }
    if parsed.minute().is_none() {
        parsed.set_minute(0)?;
    }
    if parsed.second().is_none() {
        parsed.set_second(0)?;
    }
    Ok(())
}

impl From<NaiveDateTime> for EventTime {
    fn from(value: NaiveDateTime) -> Self {
        Self(value)
    }
}

impl From<EventTime> for NaiveDateTime {
    fn from(ts: EventTime) -> Self {
        ts.0
    }
}

impl fmt::Debug for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventTime").field(&self.0).finish()
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
