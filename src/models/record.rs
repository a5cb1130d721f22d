use crate::error::{AppError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Timestamp format used by record tables
pub const TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M";

/// Date format used for case closure dates
pub const DATE_FORMAT: &str = "%d-%m-%Y";

/// Formats accepted for prediction reference timestamps, tried in order
const REFERENCE_FORMATS: [&str; 3] = [TIMESTAMP_FORMAT, "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];

/// One observed crime event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CrimeRecord {
    /// When the event was reported
    #[serde(with = "timestamp")]
    pub date_reported: NaiveDateTime,

    /// When the event occurred
    #[serde(with = "timestamp")]
    pub date_of_occurrence: NaiveDateTime,

    /// City name
    #[validate(length(min = 1))]
    pub city: String,

    /// Area (neighbourhood) within the city
    #[validate(length(min = 1))]
    pub area: String,

    /// Crime category label
    #[serde(rename = "crime_description")]
    #[validate(length(min = 1))]
    pub crime_type: String,

    /// Weapon label
    pub weapon_used: String,

    /// Victim age in years
    pub victim_age: u32,

    /// Victim gender label (`M` / `F`)
    pub victim_gender: String,

    /// Case domain label
    pub crime_domain: String,

    /// Whether the case was closed
    #[serde(with = "yes_no")]
    pub case_closed: bool,

    /// Closure date, if closed
    #[serde(rename = "date_case_closed", default, with = "optional_date")]
    pub closure_date: Option<NaiveDate>,
}

impl CrimeRecord {
    /// Create a record with neutral demographic defaults
    pub fn new(
        date_of_occurrence: NaiveDateTime,
        city: impl Into<String>,
        area: impl Into<String>,
        crime_type: impl Into<String>,
    ) -> Self {
        Self {
            date_reported: date_of_occurrence,
            date_of_occurrence,
            city: city.into(),
            area: area.into(),
            crime_type: crime_type.into(),
            weapon_used: "Unknown".to_string(),
            victim_age: 30,
            victim_gender: "M".to_string(),
            crime_domain: "Other Crime".to_string(),
            case_closed: false,
            closure_date: None,
        }
    }

    pub fn with_reported(mut self, date_reported: NaiveDateTime) -> Self {
        self.date_reported = date_reported;
        self
    }

    pub fn with_victim(mut self, age: u32, gender: impl Into<String>) -> Self {
        self.victim_age = age;
        self.victim_gender = gender.into();
        self
    }

    pub fn with_weapon(mut self, weapon: impl Into<String>) -> Self {
        self.weapon_used = weapon.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.crime_domain = domain.into();
        self
    }

    pub fn with_closure(mut self, closure_date: Option<NaiveDate>) -> Self {
        self.case_closed = closure_date.is_some();
        self.closure_date = closure_date;
        self
    }
}

/// Parse a record timestamp (`dd-mm-YYYY HH:MM`)
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).map_err(|e| {
        AppError::Validation(format!(
            "Invalid timestamp '{}': {} (expected dd-mm-YYYY HH:MM)",
            raw, e
        ))
    })
}

/// Parse a prediction reference timestamp.
///
/// Accepts the record format, ISO `YYYY-mm-ddTHH:MM`, `YYYY-mm-dd HH:MM`
/// and a bare `YYYY-mm-dd`, which is read as midnight.
pub fn parse_reference_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    for format in REFERENCE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Invalid date '{}'. Use dd-mm-YYYY HH:MM or YYYY-mm-ddTHH:MM",
                raw
            ))
        })
}

pub(crate) mod timestamp {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod optional_date {
    use super::DATE_FORMAT;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => s.serialize_some(&date.format(DATE_FORMAT).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => NaiveDate::parse_from_str(value, DATE_FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

pub(crate) mod yes_no {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(if *value { "Yes" } else { "No" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        match Flag::deserialize(d)? {
            Flag::Bool(value) => Ok(value),
            Flag::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "yes" | "y" | "true" | "1" => Ok(true),
                "no" | "n" | "false" | "0" | "" => Ok(false),
                other => Err(serde::de::Error::custom(format!(
                    "invalid closure flag '{}'",
                    other
                ))),
            },
        }
    }
}
