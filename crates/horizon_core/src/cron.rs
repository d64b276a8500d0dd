//! Calendar recurrence patterns.
//!
//! A [`CronPattern`] has three dash-separated fields, `Y-M-D`. Each field is
//! either `*` (matches anything), a literal integer, or a comma-separated
//! list of literals. A date matches when every field matches the
//! corresponding component: `*-*-25` fires on the 25th of every month,
//! `2000-01-01` on exactly one day.

use std::fmt;
use std::str::FromStr;

use jiff::civil::Date;

use crate::error::CronError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CronField {
    Any,
    Literals(Vec<i16>),
}

impl CronField {
    fn matches(&self, component: i16) -> bool {
        match self {
            CronField::Any => true,
            CronField::Literals(values) => values.contains(&component),
        }
    }
}

impl fmt::Display for CronField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CronField::Any => f.write_str("*"),
            CronField::Literals(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{v}")?;
                }
                Ok(())
            }
        }
    }
}

/// A `Y-M-D` recurrence pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronPattern {
    year: CronField,
    month: CronField,
    day: CronField,
}

impl CronPattern {
    /// Whether `day` matches all three fields.
    pub fn matches(&self, day: Date) -> bool {
        self.year.matches(day.year())
            && self.month.matches(day.month() as i16)
            && self.day.matches(day.day() as i16)
    }
}

fn parse_field(
    pattern: &str,
    field: &str,
    name: &'static str,
    range: std::ops::RangeInclusive<i16>,
) -> Result<CronField, CronError> {
    if field == "*" {
        return Ok(CronField::Any);
    }
    let mut values = Vec::new();
    for part in field.split(',') {
        let value: i16 = part.parse().map_err(|_| CronError::InvalidField {
            pattern: pattern.to_string(),
            field: field.to_string(),
        })?;
        if !range.contains(&value) {
            return Err(CronError::OutOfRange {
                pattern: pattern.to_string(),
                field: name,
                value,
            });
        }
        values.push(value);
    }
    Ok(CronField::Literals(values))
}

impl FromStr for CronPattern {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.splitn(3, '-');
        let (Some(year), Some(month), Some(day)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(CronError::FieldCount(s.to_string()));
        };
        Ok(CronPattern {
            year: parse_field(s, year, "year", 0..=9999)?,
            month: parse_field(s, month, "month", 1..=12)?,
            day: parse_field(s, day, "day", 1..=31)?,
        })
    }
}

impl fmt::Display for CronPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.year, self.month, self.day)
    }
}
