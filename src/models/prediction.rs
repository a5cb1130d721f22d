use crate::ml::models::Target;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request for `count` forward predictions for `city`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PredictionRequest {
    #[validate(length(min = 1, max = 100))]
    pub city: String,

    /// Reference timestamp; the current time when absent
    #[serde(default)]
    pub reference: Option<String>,

    #[validate(range(max = 1000))]
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_count() -> usize {
    10
}

impl PredictionRequest {
    pub fn new(city: impl Into<String>, count: usize) -> Self {
        Self {
            city: city.into(),
            reference: None,
            count,
        }
    }

    pub fn at(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// One synthesized forward prediction.
///
/// Only `crime_type`, `area`, `predicted_hour` and `risk_level` come from the
/// trained models; each is absent when its target has no usable model. Every
/// other field is presentation augmentation: sampled or derived from the
/// request index, never learned. `probability` and `confidence` in particular
/// are not calibrated model outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// `pred_{city}_{index}_{unix seconds of the reference}`
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crime_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_hour: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,

    /// Probe date (`YYYY-MM-DD`)
    pub date: String,

    /// Probe time (`HH:MM`)
    pub time: String,

    /// Probe hour fed to the models: (reference hour + 2 * index) mod 24
    pub hour: u32,

    pub location: String,
    pub coordinates: Coordinates,
    pub probability: f64,
    pub confidence: f64,
    pub victim_age: u32,
    pub victim_gender: String,
    pub weapon: String,
    pub police_needed: u32,
    pub factors: Vec<String>,
}

impl Prediction {
    /// Decoded model output for `target`, if any
    pub fn output(&self, target: Target) -> Option<&str> {
        match target {
            Target::CrimeType => self.crime_type.as_deref(),
            Target::Area => self.area.as_deref(),
            Target::Hour => self.predicted_hour.as_deref(),
            Target::RiskLevel => self.risk_level.as_deref(),
        }
    }

    pub(crate) fn set_output(&mut self, target: Target, value: String) {
        let slot = match target {
            Target::CrimeType => &mut self.crime_type,
            Target::Area => &mut self.area,
            Target::Hour => &mut self.predicted_hour,
            Target::RiskLevel => &mut self.risk_level,
        };
        *slot = Some(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_validation() {
        assert!(PredictionRequest::new("Delhi", 0).validate().is_ok());
        assert!(PredictionRequest::new("Delhi", 1000).validate().is_ok());
        assert!(PredictionRequest::new("Delhi", 1001).validate().is_err());
        assert!(PredictionRequest::new("", 5).validate().is_err());
        assert!(PredictionRequest::new("x".repeat(101), 5).validate().is_err());
    }

    #[test]
    fn test_request_defaults() {
        let request: PredictionRequest = serde_json::from_str(r#"{"city": "Pune"}"#).unwrap();
        assert_eq!(request.count, 10);
        assert!(request.reference.is_none());
    }

    #[test]
    fn test_missing_outputs_are_not_serialized() {
        let prediction = Prediction {
            id: "pred_Pune_0_0".to_string(),
            crime_type: Some("THEFT".to_string()),
            area: None,
            predicted_hour: None,
            risk_level: None,
            date: "1970-01-01".to_string(),
            time: "00:00".to_string(),
            hour: 0,
            location: "Baner".to_string(),
            coordinates: Coordinates { lat: 18.5, lng: 73.8 },
            probability: 0.5,
            confidence: 0.7,
            victim_age: 25,
            victim_gender: "M".to_string(),
            weapon: "Knife".to_string(),
            police_needed: 3,
            factors: Vec::new(),
        };

        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(json["crime_type"], "THEFT");
        assert!(json.get("area").is_none());
        assert_eq!(prediction.output(Target::CrimeType), Some("THEFT"));
        assert_eq!(prediction.output(Target::Hour), None);
    }
}
