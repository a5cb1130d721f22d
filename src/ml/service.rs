use crate::error::{AppError, Result};
use crate::ml::engine::PredictionEngine;
use crate::ml::models::{MLConfig, PerformanceRecord, Target, TrainingReport};
use crate::ml::synthesizer::PredictionSynthesizer;
use crate::models::{parse_reference_timestamp, CityCatalog, Dataset, Prediction, PredictionRequest};
use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use validator::Validate;

/// Async façade over the prediction engine.
///
/// Requests run against an immutable engine snapshot; a retrain or reload
/// builds a fresh engine off-lock and swaps it in once complete.
pub struct PredictionService {
    /// Configuration
    config: MLConfig,

    synthesizer: PredictionSynthesizer,

    /// Current engine snapshot
    engine: Arc<RwLock<Arc<PredictionEngine>>>,

    /// Completed training runs
    trainings: Arc<RwLock<u64>>,

    /// Predictions returned to callers
    predictions_served: Arc<RwLock<u64>>,
}

impl PredictionService {
    /// Create a service with an empty engine
    pub fn new(config: MLConfig, catalog: CityCatalog) -> Self {
        let synthesizer = PredictionSynthesizer::new(catalog, config.synthesis.clone());

        Self {
            config,
            synthesizer,
            engine: Arc::new(RwLock::new(Arc::new(PredictionEngine::empty()))),
            trainings: Arc::new(RwLock::new(0)),
            predictions_served: Arc::new(RwLock::new(0)),
        }
    }

    pub fn config(&self) -> &MLConfig {
        &self.config
    }

    pub fn catalog(&self) -> &CityCatalog {
        self.synthesizer.catalog()
    }

    /// Current engine snapshot; the lock is released before returning
    pub async fn snapshot(&self) -> Arc<PredictionEngine> {
        Arc::clone(&*self.engine.read().await)
    }

    async fn swap(&self, engine: PredictionEngine) {
        *self.engine.write().await = Arc::new(engine);
    }

    /// Train a new engine on `dataset` and swap it in
    pub async fn train(&self, dataset: Dataset) -> Result<TrainingReport> {
        info!("Training prediction engine on {} records", dataset.len());
        let config = self.config.training.clone();

        let (engine, report) = tokio::task::spawn_blocking(move || {
            PredictionEngine::train(dataset.records(), &config)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Training task failed: {}", e)))??;

        self.swap(engine).await;
        *self.trainings.write().await += 1;

        info!("✅ New engine swapped in");
        Ok(report)
    }

    /// Predict `count` records for `city` from a reference timestamp string
    pub async fn predict(&self, city: &str, reference: &str, count: usize) -> Result<Vec<Prediction>> {
        self.ensure_supported(city)?;
        let reference = parse_reference_timestamp(reference)?;
        self.predict_at(city, reference, count).await
    }

    /// Predict `count` records for `city` from a parsed reference
    pub async fn predict_at(
        &self,
        city: &str,
        reference: NaiveDateTime,
        count: usize,
    ) -> Result<Vec<Prediction>> {
        self.ensure_supported(city)?;

        let engine = self.snapshot().await;
        if !engine.has_models() {
            return Err(AppError::NotFound(
                "No trained models are loaded".to_string(),
            ));
        }

        let predictions = self.synthesizer.synthesize(&engine, city, reference, count)?;
        *self.predictions_served.write().await += predictions.len() as u64;

        debug!("Served {} predictions for {}", predictions.len(), city);
        Ok(predictions)
    }

    /// Validate and serve a prediction request
    pub async fn predict_request(&self, request: &PredictionRequest) -> Result<Vec<Prediction>> {
        request.validate()?;

        match &request.reference {
            Some(reference) => self.predict(&request.city, reference, request.count).await,
            None => self.predict_at(&request.city, default_reference(), request.count).await,
        }
    }

    fn ensure_supported(&self, city: &str) -> Result<()> {
        if self.catalog().contains(city) {
            return Ok(());
        }
        Err(AppError::Configuration(format!(
            "City '{}' is not supported. Available: {}",
            city,
            self.catalog().names().join(", ")
        )))
    }

    /// Save the current engine to the configured model path
    pub async fn save(&self) -> Result<()> {
        self.save_to(PathBuf::from(&self.config.model_path)).await
    }

    pub async fn save_to(&self, dir: impl AsRef<Path>) -> Result<()> {
        let engine = self.snapshot().await;
        let dir = dir.as_ref().to_path_buf();

        tokio::task::spawn_blocking(move || engine.save(dir))
            .await
            .map_err(|e| AppError::Internal(format!("Save task failed: {}", e)))?
    }

    /// Load the engine from the configured model path
    pub async fn load(&self) -> Result<()> {
        self.load_from(PathBuf::from(&self.config.model_path)).await
    }

    pub async fn load_from(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref().to_path_buf();
        let engine = tokio::task::spawn_blocking(move || PredictionEngine::load(dir))
            .await
            .map_err(|e| AppError::Internal(format!("Load task failed: {}", e)))??;

        if !engine.has_models() {
            warn!("Loaded engine has no usable models");
        }
        self.swap(engine).await;
        Ok(())
    }

    /// Winning algorithm and score per target
    pub async fn performance(&self) -> BTreeMap<Target, PerformanceRecord> {
        self.snapshot().await.performance().clone()
    }

    /// Get service statistics
    pub async fn get_stats(&self) -> ServiceStats {
        let engine = self.snapshot().await;

        ServiceStats {
            models_loaded: engine.has_models(),
            targets_with_models: Target::ALL
                .iter()
                .filter(|t| engine.best_model(**t).is_some())
                .count(),
            n_candidates: engine.registry().iter().map(|(_, m)| m.candidates().len()).sum(),
            n_encoders: engine.encoders().len(),
            trained_at: engine.trained_at(),
            trainings: *self.trainings.read().await,
            predictions_served: *self.predictions_served.read().await,
        }
    }
}

/// Reference used when a request names none: the next hour from now, to the minute
fn default_reference() -> NaiveDateTime {
    let next = Utc::now().naive_utc() + Duration::hours(1);
    next.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(next)
}

/// Prediction service statistics
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ServiceStats {
    pub models_loaded: bool,
    pub targets_with_models: usize,
    pub n_candidates: usize,
    pub n_encoders: usize,
    pub trained_at: Option<DateTime<Utc>>,
    pub trainings: u64,
    pub predictions_served: u64,
}
