/// Crime prediction pipeline
///
/// - Feature derivation from raw records
/// - Categorical encoding with growable domains
/// - Global standardisation
/// - Per-target candidate training, cross-validation and best-model selection
/// - Forward prediction synthesis for a city and time window
/// - Directory bundle persistence

pub mod boosting;
pub mod classifier;
pub mod encoding;
pub mod engine;
pub mod features;
pub mod models;
pub mod scaler;
pub mod service;
pub mod store;
pub mod synthesizer;
pub mod trainer;

pub use classifier::{CandidateModel, Classifier};
pub use encoding::{DecodeError, EncoderError, EncoderRegistry, LabelEncoder};
pub use engine::PredictionEngine;
pub use features::{
    AgeGroup, AreaType, DayPhases, FeatureDeriver, FeatureRow, RiskLevel, TemporalFeatures,
    CATEGORICAL_COLUMNS, FEATURE_COLUMNS,
};
pub use models::{
    Algorithm, CandidateReport, CrossValidationScore, MLConfig, ModelMetrics, PerformanceRecord,
    SynthesisConfig, Target, TargetReport, TrainingConfig, TrainingReport,
};
pub use scaler::StandardScaler;
pub use service::{PredictionService, ServiceStats};
pub use store::{ModelStore, StoreMetadata};
pub use synthesizer::PredictionSynthesizer;
pub use trainer::{EnsembleTrainer, ModelRegistry, TargetModels};
