use crate::error::{AppError, Result};
use crate::ml::classifier::{CandidateModel, Classifier};
use crate::ml::encoding::{EncoderRegistry, LabelEncoder};
use crate::ml::engine::PredictionEngine;
use crate::ml::models::{Algorithm, PerformanceRecord, Target};
use crate::ml::scaler::StandardScaler;
use crate::ml::trainer::{ModelRegistry, TargetModels};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

const METADATA_FILE: &str = "model_metadata.json";
const SCALER_FILE: &str = "scaler__features.bin";
const MODEL_PREFIX: &str = "model__";
const ENCODER_PREFIX: &str = "encoder__";

/// Contents of `model_metadata.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub feature_columns: Vec<String>,
    pub target_columns: Vec<Target>,
    pub model_performance: BTreeMap<Target, PerformanceRecord>,
    pub saved_at: DateTime<Utc>,
}

/// Directory bundle holding one engine's artifacts
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    fn staging_dir(&self) -> PathBuf {
        let name = self
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "models".to_string());
        self.dir.with_file_name(format!(".{}.staging", name))
    }

    /// Write every artifact of `engine`.
    ///
    /// Artifacts go to a sibling staging directory and are moved into `dir`
    /// only after all of them were written. Bundle files left by an earlier
    /// save are replaced; any other file in `dir` is kept.
    pub fn save(&self, engine: &PredictionEngine) -> Result<()> {
        let staging = self.staging_dir();
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        if let Err(e) = write_bundle(&staging, engine) {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!("Failed to remove staging directory {:?}: {}", staging, cleanup);
            }
            return Err(e);
        }

        if self.dir.is_dir() {
            for (path, name) in self.entries()? {
                if is_bundle_file(&name) {
                    fs::remove_file(path)?;
                }
            }
            for entry in fs::read_dir(&staging)? {
                let entry = entry?;
                fs::rename(entry.path(), self.dir.join(entry.file_name()))?;
            }
            fs::remove_dir(&staging)?;
        } else {
            fs::rename(&staging, &self.dir)?;
        }

        info!("💾 Models saved to {:?}", self.dir);
        Ok(())
    }

    /// Rebuild an engine from the bundle.
    ///
    /// Only a missing directory is an error; missing artifacts leave their
    /// part of the state empty.
    pub fn load(&self) -> Result<PredictionEngine> {
        if !self.dir.is_dir() {
            return Err(AppError::NotFound(format!(
                "Model directory {:?} does not exist",
                self.dir
            )));
        }

        let metadata = self.read_metadata()?;
        let scaler = self.read_scaler()?;
        let encoders = self.read_encoders()?;
        let mut candidates = self.read_models()?;

        let mut registry = ModelRegistry::new();
        let performance = metadata
            .as_ref()
            .map(|m| m.model_performance.clone())
            .unwrap_or_default();

        for target in Target::ALL {
            let Some(mut models) = candidates.remove(&target) else {
                continue;
            };
            models.sort_by_key(|m| m.algorithm());

            let best = performance.get(&target).and_then(|record| {
                let index = models.iter().position(|m| m.algorithm() == record.best_model);
                if index.is_none() {
                    warn!(
                        "Best model {} for '{}' is not on disk; target has no best model",
                        record.best_model, target
                    );
                }
                index
            });
            registry.insert(target, TargetModels::new(models, best));
        }

        let (feature_columns, target_columns, saved_at) = match metadata {
            Some(m) => (m.feature_columns, m.target_columns, Some(m.saved_at)),
            None => (Vec::new(), Vec::new(), None),
        };

        info!(
            "Loaded {} target(s) with models and {} encoder(s) from {:?}",
            registry.len(),
            encoders.len(),
            self.dir
        );

        Ok(PredictionEngine::from_parts(
            registry,
            encoders,
            scaler,
            feature_columns,
            target_columns,
            performance,
            saved_at,
        ))
    }

    fn read_metadata(&self) -> Result<Option<StoreMetadata>> {
        let path = self.dir.join(METADATA_FILE);
        if !path.is_file() {
            warn!("No {} in {:?}", METADATA_FILE, self.dir);
            return Ok(None);
        }
        let metadata = serde_json::from_reader(BufReader::new(fs::File::open(path)?))?;
        Ok(Some(metadata))
    }

    fn read_scaler(&self) -> Result<Option<StandardScaler>> {
        let path = self.dir.join(SCALER_FILE);
        if !path.is_file() {
            warn!("No scaler in {:?}", self.dir);
            return Ok(None);
        }
        let scaler = bincode::deserialize_from(BufReader::new(fs::File::open(path)?))?;
        Ok(Some(scaler))
    }

    fn read_encoders(&self) -> Result<EncoderRegistry> {
        let mut encoders = EncoderRegistry::new();
        for (path, name) in self.entries()? {
            let Some(feature) = name
                .strip_prefix(ENCODER_PREFIX)
                .and_then(|rest| rest.strip_suffix(".json"))
            else {
                continue;
            };
            let encoder: LabelEncoder = serde_json::from_reader(BufReader::new(fs::File::open(&path)?))?;
            debug!("Loaded encoder '{}' ({} classes)", feature, encoder.len());
            encoders.insert(feature, encoder);
        }
        Ok(encoders)
    }

    fn read_models(&self) -> Result<BTreeMap<Target, Vec<CandidateModel>>> {
        let mut models: BTreeMap<Target, Vec<CandidateModel>> = BTreeMap::new();
        for (path, name) in self.entries()? {
            let Some(stem) = name
                .strip_prefix(MODEL_PREFIX)
                .and_then(|rest| rest.strip_suffix(".bin"))
            else {
                continue;
            };
            let Some((target, algorithm)) = parse_model_stem(stem) else {
                warn!("Ignoring unrecognised model artifact {:?}", path);
                continue;
            };

            let model: CandidateModel = bincode::deserialize_from(BufReader::new(fs::File::open(&path)?))?;
            if model.algorithm() != algorithm {
                return Err(AppError::Serialization(format!(
                    "{:?} holds a {} model",
                    path,
                    model.algorithm()
                )));
            }
            debug!("Loaded {} model for '{}'", algorithm, target);
            models.entry(target).or_default().push(model);
        }
        Ok(models)
    }

    /// Files in the bundle with their names, sorted by name
    fn entries(&self) -> Result<Vec<(PathBuf, String)>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                entries.push((entry.path(), name.to_string()));
            }
        }
        entries.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(entries)
    }
}

/// Whether `name` is one of the artifacts `save` writes
fn is_bundle_file(name: &str) -> bool {
    name == METADATA_FILE
        || name == SCALER_FILE
        || name.starts_with(MODEL_PREFIX)
        || name.starts_with(ENCODER_PREFIX)
}

/// File name of a candidate artifact
pub fn model_file_name(target: Target, algorithm: Algorithm) -> String {
    format!("{}{}__{}.bin", MODEL_PREFIX, target, algorithm)
}

fn parse_model_stem(stem: &str) -> Option<(Target, Algorithm)> {
    let (target, algorithm) = stem.split_once("__")?;
    Some((Target::from_str(target).ok()?, Algorithm::from_str(algorithm).ok()?))
}

fn write_bincode<T: Serialize>(path: PathBuf, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    bincode::serialize_into(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn write_json<T: Serialize>(path: PathBuf, value: &T, pretty: bool) -> Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    if pretty {
        serde_json::to_writer_pretty(&mut writer, value)?;
    } else {
        serde_json::to_writer(&mut writer, value)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_bundle(dir: &Path, engine: &PredictionEngine) -> Result<()> {
    for (target, models) in engine.registry().iter() {
        for model in models.candidates() {
            write_bincode(dir.join(model_file_name(target, model.algorithm())), model)?;
        }
    }

    for (feature, encoder) in engine.encoders().iter() {
        write_json(dir.join(format!("{}{}.json", ENCODER_PREFIX, feature)), encoder, false)?;
    }

    if let Some(scaler) = engine.scaler() {
        write_bincode(dir.join(SCALER_FILE), scaler)?;
    }

    let metadata = StoreMetadata {
        feature_columns: engine.feature_columns().to_vec(),
        target_columns: engine.target_columns().to_vec(),
        model_performance: engine.performance().clone(),
        saved_at: Utc::now(),
    };
    write_json(dir.join(METADATA_FILE), &metadata, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_file_names_round_trip() {
        let name = model_file_name(Target::RiskLevel, Algorithm::GradientBoosting);
        assert_eq!(name, "model__risk_level__gradient_boosting.bin");

        let stem = name
            .strip_prefix(MODEL_PREFIX)
            .and_then(|s| s.strip_suffix(".bin"))
            .unwrap();
        assert_eq!(
            parse_model_stem(stem),
            Some((Target::RiskLevel, Algorithm::GradientBoosting))
        );
        assert_eq!(parse_model_stem("risk_level_gradient_boosting"), None);
        assert_eq!(parse_model_stem("weather__naive_bayes"), None);
    }

    #[test]
    fn test_missing_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("absent"));
        assert!(!store.exists());
        assert!(matches!(store.load(), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_empty_directory_loads_empty_engine() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ModelStore::new(dir.path()).load().unwrap();

        assert!(!engine.has_models());
        assert!(engine.encoders().is_empty());
        assert!(engine.scaler().is_none());
        assert!(engine.feature_columns().is_empty());
    }

    #[test]
    fn test_save_empty_engine_writes_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("bundle");
        ModelStore::new(&target).save(&PredictionEngine::empty()).unwrap();

        assert!(target.join(METADATA_FILE).is_file());
        assert!(!target.join(SCALER_FILE).exists());
        assert!(!ModelStore::new(&target).staging_dir().exists());
    }

    #[test]
    fn test_save_replaces_previous_bundle_only() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("bundle");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("crimes.csv"), "date_reported,city").unwrap();
        fs::write(target.join(SCALER_FILE), "old").unwrap();
        fs::write(target.join("encoder__weather.json"), "[]").unwrap();
        fs::write(target.join(model_file_name(Target::Hour, Algorithm::NaiveBayes)), "old").unwrap();

        ModelStore::new(&target).save(&PredictionEngine::empty()).unwrap();

        assert_eq!(fs::read_to_string(target.join("crimes.csv")).unwrap(), "date_reported,city");
        assert!(target.join(METADATA_FILE).is_file());
        assert!(!target.join(SCALER_FILE).exists());
        assert!(!target.join("encoder__weather.json").exists());
        assert!(!target.join(model_file_name(Target::Hour, Algorithm::NaiveBayes)).exists());
        assert!(!ModelStore::new(&target).staging_dir().exists());
    }

    #[test]
    fn test_metadata_scores_reload_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let record = PerformanceRecord {
            best_model: Algorithm::RandomForest,
            best_score: 0.9079651941097723,
            cv_std: 0.1 + 0.2,
        };
        let metadata = StoreMetadata {
            feature_columns: vec!["hour".to_string()],
            target_columns: vec![Target::Hour],
            model_performance: BTreeMap::from([(Target::Hour, record.clone())]),
            saved_at: Utc::now(),
        };
        write_json(dir.path().join(METADATA_FILE), &metadata, true).unwrap();

        let loaded = ModelStore::new(dir.path()).read_metadata().unwrap().unwrap();
        let reloaded = &loaded.model_performance[&Target::Hour];
        assert_eq!(reloaded.best_score.to_bits(), record.best_score.to_bits());
        assert_eq!(reloaded.cv_std.to_bits(), record.cv_std.to_bits());
    }
}
