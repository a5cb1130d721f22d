use crate::error::{AppError, Result};
use crate::ml::classifier::CandidateModel;
use crate::ml::encoding::EncoderRegistry;
use crate::ml::features::{FeatureDeriver, FeatureRow, CATEGORICAL_COLUMNS, FEATURE_COLUMNS};
use crate::ml::models::{PerformanceRecord, Target, TrainingConfig, TrainingReport};
use crate::ml::scaler::StandardScaler;
use crate::ml::store::ModelStore;
use crate::ml::trainer::{EnsembleTrainer, ModelRegistry};
use crate::models::CrimeRecord;
use chrono::{DateTime, Utc};
use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Encoded columns of the feature vector, after the numeric prefix
const ENCODED_FEATURES: [&str; 6] = [
    "city",
    "area_type",
    "victim_gender",
    "weapon_used",
    "crime_domain",
    "victim_age_group",
];

/// One complete trained state: encoders, scaler and per-target models
#[derive(Debug, Default)]
pub struct PredictionEngine {
    registry: ModelRegistry,
    encoders: EncoderRegistry,
    scaler: Option<StandardScaler>,
    feature_columns: Vec<String>,
    target_columns: Vec<Target>,
    performance: BTreeMap<Target, PerformanceRecord>,
    trained_at: Option<DateTime<Utc>>,
}

impl PredictionEngine {
    /// Engine with no trained state
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        registry: ModelRegistry,
        encoders: EncoderRegistry,
        scaler: Option<StandardScaler>,
        feature_columns: Vec<String>,
        target_columns: Vec<Target>,
        performance: BTreeMap<Target, PerformanceRecord>,
        trained_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            registry,
            encoders,
            scaler,
            feature_columns,
            target_columns,
            performance,
            trained_at,
        }
    }

    /// Derive features, fit encoders and scaler, and train every target
    pub fn train(records: &[CrimeRecord], config: &TrainingConfig) -> Result<(Self, TrainingReport)> {
        if records.is_empty() {
            return Err(AppError::Training("Cannot train on an empty dataset".to_string()));
        }

        let start = Instant::now();
        info!("Deriving features for {} records", records.len());
        let rows = FeatureDeriver::derive_all(records);

        let mut encoders = EncoderRegistry::new();
        for column in CATEGORICAL_COLUMNS {
            let values: Vec<String> = rows.iter().filter_map(|r| r.categorical(column)).collect();
            let encoder = encoders.fit(column, &values)?;
            debug!("Encoder '{}' fitted with {} classes", column, encoder.len());
        }

        let matrix = feature_matrix(&rows, &encoders)?;
        let scaler = StandardScaler::fit(&matrix)?;
        let x = scaler.transform(&matrix)?;

        let trainer = EnsembleTrainer::new(config.clone());
        let mut registry = ModelRegistry::new();
        let mut performance = BTreeMap::new();
        let mut target_reports = Vec::with_capacity(Target::ALL.len());

        for target in Target::ALL {
            let labels = target_labels(target, &rows, &encoders)?;
            let (models, report) = trainer.train_target(target, &x, &labels)?;

            if let Some(best) = &report.best {
                performance.insert(target, best.clone());
            }
            registry.insert(target, models);
            target_reports.push(report);
        }

        let trained_at = Utc::now();
        let report = TrainingReport {
            n_records: records.len(),
            feature_columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            targets: target_reports,
            trained_at,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "✅ Training completed in {} ms ({} of {} targets have a best model)",
            report.duration_ms,
            performance.len(),
            Target::ALL.len()
        );

        let engine = Self {
            registry,
            encoders,
            scaler: Some(scaler),
            feature_columns: report.feature_columns.clone(),
            target_columns: Target::ALL.to_vec(),
            performance,
            trained_at: Some(trained_at),
        };

        Ok((engine, report))
    }

    /// Run every target's best model on one unscaled feature vector.
    ///
    /// Targets without a best model, or whose model fails, are omitted.
    /// Codes the encoders cannot map back are rendered as the raw number.
    pub fn forward(&self, features: &[f64]) -> Result<BTreeMap<Target, String>> {
        let scaled = match &self.scaler {
            Some(scaler) => scaler.transform_row(features)?,
            None => {
                warn!("No scaler loaded; feeding unscaled features");
                features.to_vec()
            }
        };

        let mut outputs = BTreeMap::new();
        for (target, models) in self.registry.iter() {
            let Some(model) = models.best() else {
                continue;
            };

            match model.predict_one(&scaled) {
                Ok(code) => {
                    outputs.insert(target, self.decode_output(target, code));
                }
                Err(e) => warn!("Model for '{}' failed: {}", target, e),
            }
        }

        Ok(outputs)
    }

    fn decode_output(&self, target: Target, code: usize) -> String {
        let Some(feature) = target.encoder() else {
            return code.to_string();
        };

        match self.encoders.decode(feature, &[code]) {
            Ok(mut values) if !values.is_empty() => values.swap_remove(0),
            Ok(_) => code.to_string(),
            Err(e) => {
                debug!("Decode failed for '{}': {}", target, e);
                code.to_string()
            }
        }
    }

    /// Persist the full state to `dir`
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        ModelStore::new(dir.as_ref()).save(self)
    }

    /// Load a previously saved state from `dir`
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        ModelStore::new(dir.as_ref()).load()
    }

    /// Whether any target has a usable model
    pub fn has_models(&self) -> bool {
        self.registry.iter().any(|(_, m)| m.best().is_some())
    }

    /// Best model for `target`
    pub fn best_model(&self, target: Target) -> Option<&CandidateModel> {
        self.registry.best(target)
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn encoders(&self) -> &EncoderRegistry {
        &self.encoders
    }

    pub fn scaler(&self) -> Option<&StandardScaler> {
        self.scaler.as_ref()
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn target_columns(&self) -> &[Target] {
        &self.target_columns
    }

    pub fn performance(&self) -> &BTreeMap<Target, PerformanceRecord> {
        &self.performance
    }

    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        self.trained_at
    }
}

/// Feature vector of one derived row, in `FEATURE_COLUMNS` order
fn feature_vector(row: &FeatureRow, encoders: &EncoderRegistry) -> Result<Vec<f64>> {
    let mut vector = Vec::with_capacity(FEATURE_COLUMNS.len());
    vector.extend_from_slice(&row.numeric_prefix());

    for column in ENCODED_FEATURES {
        let value = row
            .categorical(column)
            .ok_or_else(|| AppError::Internal(format!("Row has no column '{}'", column)))?;
        let code = encoders.lookup(column, &value).ok_or_else(|| {
            AppError::Internal(format!("Value '{}' missing from encoder '{}'", value, column))
        })?;
        vector.push(code as f64);
    }

    Ok(vector)
}

fn feature_matrix(rows: &[FeatureRow], encoders: &EncoderRegistry) -> Result<Array2<f64>> {
    let mut data = Vec::with_capacity(rows.len() * FEATURE_COLUMNS.len());
    for row in rows {
        data.extend(feature_vector(row, encoders)?);
    }

    Array2::from_shape_vec((rows.len(), FEATURE_COLUMNS.len()), data)
        .map_err(|e| AppError::Training(format!("Failed to build feature matrix: {}", e)))
}

fn target_labels(target: Target, rows: &[FeatureRow], encoders: &EncoderRegistry) -> Result<Vec<usize>> {
    let Some(feature) = target.encoder() else {
        return Ok(rows.iter().map(|r| r.temporal.hour as usize).collect());
    };

    rows.iter()
        .map(|row| {
            let value = row
                .categorical(feature)
                .ok_or_else(|| AppError::Internal(format!("Row has no column '{}'", feature)))?;
            encoders.lookup(feature, &value).ok_or_else(|| {
                AppError::Internal(format!("Value '{}' missing from encoder '{}'", value, feature))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::classifier::Classifier;
    use crate::models::parse_timestamp;

    fn fast_config() -> TrainingConfig {
        let mut config = TrainingConfig::default();
        config.random_forest.n_trees = 5;
        config.random_forest.max_depth = 4;
        config.gradient_boosting.n_estimators = 3;
        config.gradient_boosting.max_depth = 3;
        config.cv_folds = 3;
        config
    }

    fn records(n: usize) -> Vec<CrimeRecord> {
        let crimes = ["THEFT", "ROBBERY", "FRAUD"];
        let areas = ["Connaught Place", "Dwarka", "Noida"];
        (0..n)
            .map(|i| {
                let ts = parse_timestamp(&format!("{:02}-03-2024 {:02}:15", 1 + i % 28, (i * 5) % 24)).unwrap();
                CrimeRecord::new(ts, "Delhi", areas[i % 3], crimes[i % 3])
                    .with_victim(18 + (i % 50) as u32, if i % 2 == 0 { "M" } else { "F" })
                    .with_weapon(if i % 4 == 0 { "Knife" } else { "None" })
            })
            .collect()
    }

    #[test]
    fn test_empty_dataset_is_rejected() {
        assert!(matches!(
            PredictionEngine::train(&[], &fast_config()),
            Err(AppError::Training(_))
        ));
    }

    #[test]
    fn test_train_fits_every_encoder_and_target() {
        let (engine, report) = PredictionEngine::train(&records(60), &fast_config()).unwrap();

        assert_eq!(engine.encoders().len(), CATEGORICAL_COLUMNS.len());
        assert_eq!(engine.feature_columns().len(), FEATURE_COLUMNS.len());
        assert_eq!(engine.target_columns(), &Target::ALL);
        assert_eq!(report.targets.len(), Target::ALL.len());
        assert_eq!(report.n_records, 60);
        assert!(engine.scaler().is_some());
        assert!(engine.has_models());

        for (target, record) in engine.performance() {
            assert_eq!(engine.best_model(*target).unwrap().algorithm(), record.best_model);
        }
    }

    #[test]
    fn test_forward_decodes_outputs() {
        let (engine, _) = PredictionEngine::train(&records(60), &fast_config()).unwrap();
        let probe = vec![10.0, 1.0, 3.0, 61.0, 0.0, 0.0, 1.0, 0.0, 0.0, 40.0, 5.0, 0.0, 1.0, 0.0, 1.0, 0.0, 2.0];

        let outputs = engine.forward(&probe).unwrap();
        if let Some(crime) = outputs.get(&Target::CrimeType) {
            assert!(["THEFT", "ROBBERY", "FRAUD"].contains(&crime.as_str()));
        }
        if let Some(hour) = outputs.get(&Target::Hour) {
            assert!(hour.parse::<u32>().unwrap() < 24);
        }
    }

    #[test]
    fn test_forward_rejects_wrong_width() {
        let (engine, _) = PredictionEngine::train(&records(30), &fast_config()).unwrap();
        assert!(engine.forward(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_empty_engine_forwards_nothing() {
        let engine = PredictionEngine::empty();
        assert!(!engine.has_models());
        assert!(engine.forward(&[0.0; 17]).unwrap().is_empty());
    }

    #[test]
    fn test_hour_labels_are_raw() {
        let rows = FeatureDeriver::derive_all(&records(5));
        let labels = target_labels(Target::Hour, &rows, &EncoderRegistry::new()).unwrap();
        assert_eq!(labels, vec![0, 5, 10, 15, 20]);
    }
}
