use crate::models::CrimeRecord;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Feature vector columns, in the order every model consumes them
pub const FEATURE_COLUMNS: [&str; 17] = [
    "hour",
    "day_of_week",
    "month",
    "day_of_year",
    "is_weekend",
    "is_night",
    "is_morning",
    "is_afternoon",
    "is_evening",
    "victim_age",
    "crime_severity",
    "city",
    "area_type",
    "victim_gender",
    "weapon_used",
    "crime_domain",
    "victim_age_group",
];

/// Columns mapped through the encoder registry
pub const CATEGORICAL_COLUMNS: [&str; 9] = [
    "city",
    "crime_type",
    "area",
    "area_type",
    "victim_gender",
    "weapon_used",
    "crime_domain",
    "victim_age_group",
    "risk_level",
];

/// Severity used for categories missing from the table
pub const DEFAULT_SEVERITY: u32 = 5;

const SEVERITY_TABLE: [(&str, u32); 20] = [
    ("HOMICIDE", 10),
    ("KIDNAPPING", 9),
    ("ROBBERY", 8),
    ("ASSAULT", 7),
    ("BURGLARY", 6),
    ("THEFT", 5),
    ("FRAUD", 4),
    ("VANDALISM", 3),
    ("DRUG_OFFENSE", 6),
    ("DOMESTIC_VIOLENCE", 7),
    ("CYBER_CRIME", 4),
    ("MOTOR_VEHICLE_THEFT", 5),
    ("PUBLIC_DISORDER", 3),
    ("WEAPON_OFFENSE", 8),
    ("SEXUAL_OFFENSE", 9),
    ("EXTORTION", 7),
    ("FORGERY", 3),
    ("EMBEZZLEMENT", 4),
    ("ARSON", 6),
    ("IDENTITY_THEFT", 4),
];

const COMMERCIAL_AREAS: [&str; 5] = [
    "Connaught Place",
    "T. Nagar",
    "Koramangala",
    "Banjara Hills",
    "Bodakdev",
];

const RESIDENTIAL_AREAS: [&str; 7] = [
    "Dwarka",
    "Thane",
    "Velachery",
    "Whitefield",
    "Baner",
    "Gachibowli",
    "Satellite",
];

const INDUSTRIAL_AREAS: [&str; 6] = [
    "Noida",
    "Navi Mumbai",
    "Electronic City",
    "Hinjewadi",
    "HITEC City",
    "Vatva",
];

/// Land-use class of an area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
pub enum AreaType {
    Commercial,
    Residential,
    Industrial,
    Mixed,
}

/// Victim age bucket
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumString,
    Display,
)]
pub enum AgeGroup {
    Young,
    Adult,
    #[strum(serialize = "Middle-aged")]
    #[serde(rename = "Middle-aged")]
    MiddleAged,
    Senior,
}

/// Composite risk label
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumString,
    Display,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Day-phase flags for one hour.
///
/// Hour 6 sets both `night` and `morning`; every other hour sets exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayPhases {
    pub night: bool,
    pub morning: bool,
    pub afternoon: bool,
    pub evening: bool,
}

impl DayPhases {
    pub fn for_hour(hour: u32) -> Self {
        Self {
            night: hour >= 22 || hour <= 6,
            morning: (6..12).contains(&hour),
            afternoon: (12..18).contains(&hour),
            evening: (18..22).contains(&hour),
        }
    }
}

/// Calendar and clock features of one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalFeatures {
    pub hour: u32,
    /// 0 = Monday .. 6 = Sunday
    pub day_of_week: u32,
    pub month: u32,
    pub day_of_year: u32,
    pub is_weekend: bool,
    pub phases: DayPhases,
}

impl TemporalFeatures {
    pub fn from_timestamp(ts: &NaiveDateTime) -> Self {
        Self::for_date_and_hour(ts.date(), ts.hour())
    }

    /// Calendar features of `date` with the clock features of `hour`
    pub fn for_date_and_hour(date: NaiveDate, hour: u32) -> Self {
        let day_of_week = date.weekday().num_days_from_monday();
        Self {
            hour,
            day_of_week,
            month: date.month(),
            day_of_year: date.ordinal(),
            is_weekend: day_of_week >= 5,
            phases: DayPhases::for_hour(hour),
        }
    }
}

/// Classify an area by the static membership lists; unlisted areas are Mixed
pub fn classify_area(area: &str) -> AreaType {
    if COMMERCIAL_AREAS.contains(&area) {
        AreaType::Commercial
    } else if RESIDENTIAL_AREAS.contains(&area) {
        AreaType::Residential
    } else if INDUSTRIAL_AREAS.contains(&area) {
        AreaType::Industrial
    } else {
        AreaType::Mixed
    }
}

/// Bucket an age into [0,25) [25,35) [35,50) [50,100]; ages above 100 stay Senior
pub fn age_group(age: u32) -> AgeGroup {
    match age {
        0..=24 => AgeGroup::Young,
        25..=34 => AgeGroup::Adult,
        35..=49 => AgeGroup::MiddleAged,
        _ => AgeGroup::Senior,
    }
}

/// Severity score (3-10) of a crime category
pub fn severity_score(crime_type: &str) -> u32 {
    SEVERITY_TABLE
        .iter()
        .find(|(name, _)| *name == crime_type)
        .map(|(_, score)| *score)
        .unwrap_or(DEFAULT_SEVERITY)
}

/// Weighted risk score before thresholding
pub fn risk_score(night: bool, evening: bool, weekend: bool, area_type: AreaType, severity: u32) -> f64 {
    let mut score = 0.0;

    if night {
        score += 2.0;
    } else if evening {
        score += 1.0;
    }

    if weekend {
        score += 1.0;
    }

    match area_type {
        AreaType::Commercial => score += 1.0,
        AreaType::Industrial => score += 0.5,
        AreaType::Residential | AreaType::Mixed => {}
    }

    score + severity as f64 * 0.3
}

/// Threshold the risk score into a label
pub fn risk_level(night: bool, evening: bool, weekend: bool, area_type: AreaType, severity: u32) -> RiskLevel {
    let score = risk_score(night, evening, weekend, area_type, severity);
    if score >= 7.0 {
        RiskLevel::Critical
    } else if score >= 5.0 {
        RiskLevel::High
    } else if score >= 3.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Derived view of one record
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub temporal: TemporalFeatures,
    pub victim_age: u32,
    pub crime_severity: u32,
    pub city: String,
    pub crime_type: String,
    pub area: String,
    pub area_type: AreaType,
    pub victim_gender: String,
    pub weapon_used: String,
    pub crime_domain: String,
    pub victim_age_group: AgeGroup,
    pub risk_level: RiskLevel,
}

impl FeatureRow {
    /// String value of a categorical column
    pub fn categorical(&self, column: &str) -> Option<String> {
        let value = match column {
            "city" => self.city.clone(),
            "crime_type" => self.crime_type.clone(),
            "area" => self.area.clone(),
            "area_type" => self.area_type.to_string(),
            "victim_gender" => self.victim_gender.clone(),
            "weapon_used" => self.weapon_used.clone(),
            "crime_domain" => self.crime_domain.clone(),
            "victim_age_group" => self.victim_age_group.to_string(),
            "risk_level" => self.risk_level.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// Numeric (non-encoded) columns of the feature vector, in column order
    pub fn numeric_prefix(&self) -> [f64; 11] {
        let t = &self.temporal;
        [
            t.hour as f64,
            t.day_of_week as f64,
            t.month as f64,
            t.day_of_year as f64,
            flag(t.is_weekend),
            flag(t.phases.night),
            flag(t.phases.morning),
            flag(t.phases.afternoon),
            flag(t.phases.evening),
            self.victim_age as f64,
            self.crime_severity as f64,
        ]
    }
}

pub(crate) fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Turns raw records into feature rows; every derivation is row-local
pub struct FeatureDeriver;

impl FeatureDeriver {
    /// Derive the feature row of one record
    pub fn derive(record: &CrimeRecord) -> FeatureRow {
        let temporal = TemporalFeatures::from_timestamp(&record.date_of_occurrence);
        let area_type = classify_area(&record.area);
        let crime_severity = severity_score(&record.crime_type);
        let risk_level = risk_level(
            temporal.phases.night,
            temporal.phases.evening,
            temporal.is_weekend,
            area_type,
            crime_severity,
        );

        FeatureRow {
            temporal,
            victim_age: record.victim_age,
            crime_severity,
            city: record.city.clone(),
            crime_type: record.crime_type.clone(),
            area: record.area.clone(),
            area_type,
            victim_gender: record.victim_gender.clone(),
            weapon_used: record.weapon_used.clone(),
            crime_domain: record.crime_domain.clone(),
            victim_age_group: age_group(record.victim_age),
            risk_level,
        }
    }

    /// Derive feature rows for a batch of records
    pub fn derive_all(records: &[CrimeRecord]) -> Vec<FeatureRow> {
        records.iter().map(Self::derive).collect()
    }
}
