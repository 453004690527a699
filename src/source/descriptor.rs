use std::{fmt, str::FromStr};

use thiserror::Error;

/// Registration input for one merged source.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceDescriptor {
    name: String,
    table: String,
    timestamp_field: String,
    timestamp_format: String,
}

impl SourceDescriptor {
    /// Describe a source named `name`, reading `table`, ordered by
    /// `timestamp_field` parsed with `timestamp_format`.
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        timestamp_field: impl Into<String>,
        timestamp_format: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            timestamp_field: timestamp_field.into(),
            timestamp_format: timestamp_format.into(),
        }
    }

    /// Logical name, unique within a registry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Physical table or feed identifier.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Field that carries the event time.
    pub fn timestamp_field(&self) -> &str {
        &self.timestamp_field
    }

    /// `strftime`-style format used to parse [`Self::timestamp_field`].
    pub fn timestamp_format(&self) -> &str {
        &self.timestamp_format
    }
}

/// Error returned when parsing the `name=table,field,format` form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorParseError {
    /// No `name=` prefix.
    #[error("missing '=' after source name in '{0}'")]
    MissingName(String),
    /// Fewer than three comma-separated parts after `=`.
    #[error("expected 'table,field,format' after '=' in '{0}'")]
    MissingParts(String),
    /// One of the parts is blank.
    #[error("empty {part} in '{input}'")]
    Empty {
        /// Which part was blank.
        part: &'static str,
        /// Full input text.
        input: String,
    },
}

impl FromStr for SourceDescriptor {
    type Err = DescriptorParseError;

    /// Parses `name=table,field,format`. Only the first two commas split, so
    /// the format may contain commas of its own.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (name, rest) = input
            .split_once('=')
            .ok_or_else(|| DescriptorParseError::MissingName(input.to_owned()))?;
        let mut parts = rest.splitn(3, ',');
        let (Some(table), Some(field), Some(format)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(DescriptorParseError::MissingParts(input.to_owned()));
        };

        for (part, value) in [
            ("name", name.trim()),
            ("table", table.trim()),
            ("field", field.trim()),
            ("format", format),
        ] {
            if value.is_empty() {
                return Err(DescriptorParseError::Empty {
                    part,
                    input: input.to_owned(),
                });
            }
        }

        Ok(Self::new(name.trim(), table.trim(), field.trim(), format))
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={},{},{}",
            self.name, self.table, self.timestamp_field, self.timestamp_format
        )
    }
}
