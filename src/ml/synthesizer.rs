use crate::error::Result;
use crate::ml::engine::PredictionEngine;
use crate::ml::features::{flag, TemporalFeatures};
use crate::ml::models::SynthesisConfig;
use crate::models::{CityCatalog, Coordinates, Prediction};
use chrono::{Duration, NaiveDateTime, Timelike};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

const WEAPONS: [&str; 5] = ["Knife", "Blunt Object", "Hands/Feet", "Firearm", "Other"];

const FACTORS: [&str; 5] = [
    "Historical pattern analysis",
    "Temporal correlation",
    "Spatial clustering",
    "Demographic factors",
    "Weather conditions",
];

/// Half-width of the uniform jitter applied to city coordinates
const COORDINATE_JITTER: f64 = 0.05;

/// Builds probe vectors for hypothetical future instances and wraps the
/// model outputs in descriptive records
#[derive(Debug, Clone)]
pub struct PredictionSynthesizer {
    catalog: CityCatalog,
    config: SynthesisConfig,
}

impl PredictionSynthesizer {
    pub fn new(catalog: CityCatalog, config: SynthesisConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &CityCatalog {
        &self.catalog
    }

    /// Probe hour for index `i`: two hours apart, wrapping at midnight
    pub fn probe_hour(reference: &NaiveDateTime, i: usize) -> u32 {
        ((reference.hour() as usize + 2 * (i % 12)) % 24) as u32
    }

    /// Unscaled probe feature vector for index `i`
    pub fn probe_vector(engine: &PredictionEngine, city: &str, reference: &NaiveDateTime, i: usize) -> Vec<f64> {
        let t = TemporalFeatures::for_date_and_hour(reference.date(), Self::probe_hour(reference, i));
        let city_code = engine.encoders().lookup("city", city).unwrap_or(0);

        vec![
            t.hour as f64,
            t.day_of_week as f64,
            t.month as f64,
            t.day_of_year as f64,
            flag(t.is_weekend),
            flag(t.phases.night),
            flag(t.phases.morning),
            flag(t.phases.afternoon),
            flag(t.phases.evening),
            (35 + 5 * i) as f64,
            (5 + i % 3) as f64,
            city_code as f64,
            (i % 4) as f64,
            (i % 2) as f64,
            (i % 5) as f64,
            (i % 4) as f64,
            (i % 4) as f64,
        ]
    }

    /// Produce exactly `count` predictions for `city`, in index order
    pub fn synthesize(
        &self,
        engine: &PredictionEngine,
        city: &str,
        reference: NaiveDateTime,
        count: usize,
    ) -> Result<Vec<Prediction>> {
        let timestamp = reference.and_utc().timestamp();
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(timestamp as u64)),
            None => StdRng::from_entropy(),
        };

        let city_info = self.catalog.get(city);
        let (lat, lng) = self.catalog.reference_point(city).unwrap_or((0.0, 0.0));

        let mut predictions = Vec::with_capacity(count);
        for i in 0..count {
            let probe = Self::probe_vector(engine, city, &reference, i);
            let outputs = engine.forward(&probe)?;

            let when = i64::try_from(i)
                .ok()
                .and_then(|i| reference.checked_add_signed(Duration::hours(2 * i)))
                .unwrap_or(reference);

            let location = city_info
                .and_then(|c| c.areas.choose(&mut rng))
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string());

            let coordinates = Coordinates {
                lat: lat + rng.gen_range(-COORDINATE_JITTER..COORDINATE_JITTER),
                lng: lng + rng.gen_range(-COORDINATE_JITTER..COORDINATE_JITTER),
            };
            let probability = rng.gen_range(0.3..0.95);
            let confidence = rng.gen_range(0.6..0.9);
            let weapon = WEAPONS.choose(&mut rng).copied().unwrap_or("Other");

            let mut prediction = Prediction {
                id: format!("pred_{}_{}_{}", city, i, timestamp),
                crime_type: None,
                area: None,
                predicted_hour: None,
                risk_level: None,
                date: when.format("%Y-%m-%d").to_string(),
                time: when.format("%H:%M").to_string(),
                hour: Self::probe_hour(&reference, i),
                location,
                coordinates,
                probability,
                confidence,
                victim_age: 25 + 5 * i as u32,
                victim_gender: if i % 2 == 0 { "M" } else { "F" }.to_string(),
                weapon: weapon.to_string(),
                police_needed: 3 + (i % 8) as u32,
                factors: FACTORS.iter().map(|f| f.to_string()).collect(),
            };

            for (target, value) in outputs {
                prediction.set_output(target, value);
            }
            predictions.push(prediction);
        }

        debug!("Synthesized {} predictions for {}", predictions.len(), city);
        Ok(predictions)
    }
}
