use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum::{Display, EnumString};

/// ML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLConfig {
    /// Model store directory
    #[serde(default = "default_model_path")]
    pub model_path: String,

    /// Training configuration
    #[serde(default)]
    pub training: TrainingConfig,

    /// Prediction synthesis configuration
    #[serde(default)]
    pub synthesis: SynthesisConfig,
}

impl Default for MLConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            training: TrainingConfig::default(),
            synthesis: SynthesisConfig::default(),
        }
    }
}

fn default_model_path() -> String {
    "./data/models".to_string()
}

/// Ensemble training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Seed for splits, folds and seeded learners
    pub seed: u64,

    /// Fraction of rows held out for the holdout metrics (0.0 - 1.0)
    pub test_size: f64,

    /// Number of cross-validation folds
    pub cv_folds: usize,

    /// Fit candidates on the rayon pool
    pub parallel: bool,

    pub random_forest: RandomForestConfig,
    pub gradient_boosting: GradientBoostingConfig,
    pub logistic_regression: LogisticRegressionConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            test_size: 0.2,
            cv_folds: 5,
            parallel: true,
            random_forest: RandomForestConfig::default(),
            gradient_boosting: GradientBoostingConfig::default(),
            logistic_regression: LogisticRegressionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestConfig {
    pub n_trees: u16,
    pub max_depth: u16,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingConfig {
    /// Boosting rounds
    pub n_estimators: usize,
    pub max_depth: u16,
    pub learning_rate: f64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 6,
            learning_rate: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticRegressionConfig {
    /// L2 regularisation strength
    pub alpha: f64,
}

impl Default for LogisticRegressionConfig {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

/// Prediction synthesis configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Seed for the descriptive-field sampler; entropy when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Predicted attribute
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Target {
    CrimeType,
    Area,
    Hour,
    RiskLevel,
}

impl Target {
    /// All targets in training order
    pub const ALL: [Target; 4] = [Target::CrimeType, Target::Area, Target::Hour, Target::RiskLevel];

    /// Encoder holding this target's label codes; the hour is used raw
    pub fn encoder(&self) -> Option<&'static str> {
        match self {
            Target::CrimeType => Some("crime_type"),
            Target::Area => Some("area"),
            Target::Hour => None,
            Target::RiskLevel => Some("risk_level"),
        }
    }
}

/// Candidate algorithm
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Algorithm {
    /// Bagged decision trees
    RandomForest,

    /// Boosted regression trees on the multinomial deviance
    GradientBoosting,

    /// Linear baseline
    LogisticRegression,

    /// Probabilistic baseline
    NaiveBayes,
}

impl Algorithm {
    /// Candidate slate in training order; earlier entries win CV ties
    pub const SLATE: [Algorithm; 4] = [
        Algorithm::RandomForest,
        Algorithm::GradientBoosting,
        Algorithm::LogisticRegression,
        Algorithm::NaiveBayes,
    ];

    /// Human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            Algorithm::RandomForest => "Random Forest",
            Algorithm::GradientBoosting => "Gradient Boosting",
            Algorithm::LogisticRegression => "Logistic Regression",
            Algorithm::NaiveBayes => "Naive Bayes",
        }
    }
}

/// Model evaluation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy
    pub accuracy: f64,

    /// Macro-averaged precision
    pub precision: f64,

    /// Macro-averaged recall
    pub recall: f64,

    /// Macro-averaged F1 score
    pub f1_score: f64,

    /// Per-class metrics keyed by label code
    pub per_class_metrics: BTreeMap<usize, ClassMetrics>,
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            per_class_metrics: BTreeMap::new(),
        }
    }

    /// Compute metrics over every label seen in either vector
    pub fn from_predictions(y_true: &[usize], y_pred: &[usize]) -> Self {
        let n_samples = y_true.len();
        if n_samples == 0 {
            return Self::new();
        }

        let accuracy = accuracy(y_true, y_pred);

        let classes: BTreeSet<usize> = y_true.iter().chain(y_pred.iter()).copied().collect();
        let mut per_class = BTreeMap::new();

        for &class in &classes {
            let pairs = || y_true.iter().zip(y_pred.iter());
            let tp = pairs().filter(|(t, p)| **t == class && **p == class).count();
            let fp = pairs().filter(|(t, p)| **p == class && **t != class).count();
            let fn_count = pairs().filter(|(t, p)| **t == class && **p != class).count();

            let precision = if tp + fp > 0 {
                tp as f64 / (tp + fp) as f64
            } else {
                0.0
            };

            let recall = if tp + fn_count > 0 {
                tp as f64 / (tp + fn_count) as f64
            } else {
                0.0
            };

            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            per_class.insert(
                class,
                ClassMetrics {
                    precision,
                    recall,
                    f1_score: f1,
                    support: y_true.iter().filter(|&&t| t == class).count(),
                },
            );
        }

        let n_classes = classes.len() as f64;
        Self {
            accuracy,
            precision: per_class.values().map(|m| m.precision).sum::<f64>() / n_classes,
            recall: per_class.values().map(|m| m.recall).sum::<f64>() / n_classes,
            f1_score: per_class.values().map(|m| m.f1_score).sum::<f64>() / n_classes,
            per_class_metrics: per_class,
        }
    }
}

impl Default for ModelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Fraction of positions where the two label vectors agree
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t == p)
        .count();
    correct as f64 / y_true.len() as f64
}

/// K-fold cross-validation accuracy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationScore {
    pub mean: f64,

    /// Population standard deviation across folds
    pub std: f64,

    pub fold_scores: Vec<f64>,
}

impl CrossValidationScore {
    pub fn from_folds(fold_scores: Vec<f64>) -> Self {
        let n = fold_scores.len().max(1) as f64;
        let mean = fold_scores.iter().sum::<f64>() / n;
        let variance = fold_scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std: variance.sqrt(),
            fold_scores,
        }
    }
}

/// Outcome of training one candidate for one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateReport {
    pub algorithm: Algorithm,

    /// Metrics on the stratified holdout partition
    pub holdout: Option<ModelMetrics>,

    pub cross_validation: Option<CrossValidationScore>,

    pub fit_duration_ms: u64,

    /// Set when the candidate failed and was excluded from selection
    pub error: Option<String>,
}

impl CandidateReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Winning candidate for a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub best_model: Algorithm,
    pub best_score: f64,
    pub cv_std: f64,
}

/// Training outcome for one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: Target,
    pub n_classes: usize,
    pub candidates: Vec<CandidateReport>,
    pub best: Option<PerformanceRecord>,
}

/// Outcome of a full training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub n_records: usize,
    pub feature_columns: Vec<String>,
    pub targets: Vec<TargetReport>,
    pub trained_at: chrono::DateTime<chrono::Utc>,
    pub duration_ms: u64,
}

impl TrainingReport {
    pub fn target(&self, target: Target) -> Option<&TargetReport> {
        self.targets.iter().find(|t| t.target == target)
    }

    /// Winning algorithm per target, for targets that have one
    pub fn best_algorithms(&self) -> BTreeMap<Target, Algorithm> {
        self.targets
            .iter()
            .filter_map(|t| t.best.as_ref().map(|b| (t.target, b.best_model)))
            .collect()
    }
}
