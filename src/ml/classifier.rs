use crate::error::{AppError, Result};
use crate::ml::boosting::GradientBoostingClassifier;
use crate::ml::models::{Algorithm, TrainingConfig};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::logistic_regression::{LogisticRegression, LogisticRegressionParameters};

/// Capability shared by every candidate algorithm
pub trait Classifier: Send + Sync {
    /// Fit on a feature matrix and parallel label codes
    fn fit(&mut self, x: &Array2<f64>, y: &[usize]) -> Result<()>;

    /// Predict one label code per row
    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>>;

    fn algorithm(&self) -> Algorithm;

    fn is_trained(&self) -> bool;
}

pub(crate) fn to_dense_matrix(arr: &Array2<f64>) -> DenseMatrix<f64> {
    let shape = arr.shape();
    let data: Vec<f64> = arr.iter().copied().collect();
    DenseMatrix::new(shape[0], shape[1], data, false)
}

fn to_i32_labels(labels: &[usize]) -> Result<Vec<i32>> {
    labels
        .iter()
        .map(|&l| {
            i32::try_from(l).map_err(|_| AppError::Training(format!("Label {} out of range", l)))
        })
        .collect()
}

fn check_shape(x: &Array2<f64>, y: &[usize]) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(AppError::Training(format!(
            "Feature rows ({}) and labels ({}) differ",
            x.nrows(),
            y.len()
        )));
    }
    Ok(())
}

/// Bagged decision trees
#[derive(Debug, Serialize, Deserialize)]
pub struct RandomForestWrapper {
    n_trees: u16,
    max_depth: u16,
    seed: u64,
    model: Option<RandomForestClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>>,
}

impl RandomForestWrapper {
    pub fn new(n_trees: u16, max_depth: u16, seed: u64) -> Self {
        Self {
            n_trees,
            max_depth,
            seed,
            model: None,
        }
    }
}

impl Classifier for RandomForestWrapper {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize]) -> Result<()> {
        check_shape(x, y)?;
        let params = RandomForestClassifierParameters::default()
            .with_n_trees(self.n_trees)
            .with_max_depth(self.max_depth)
            .with_seed(self.seed);

        let model = RandomForestClassifier::fit(&to_dense_matrix(x), &to_i32_labels(y)?, params)
            .map_err(|e| AppError::Training(format!("Failed to train random forest: {}", e)))?;

        self.model = Some(model);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| AppError::Internal("Model not trained".to_string()))?;

        let predictions = model
            .predict(&to_dense_matrix(x))
            .map_err(|e| AppError::Internal(format!("Prediction failed: {}", e)))?;

        Ok(predictions.iter().map(|&p| p.max(0) as usize).collect())
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::RandomForest
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }
}

/// Multinomial logistic regression
#[derive(Debug, Serialize, Deserialize)]
pub struct LogisticRegressionClassifier {
    alpha: f64,
    model: Option<LogisticRegression<f64, i32, DenseMatrix<f64>, Vec<i32>>>,
}

impl LogisticRegressionClassifier {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, model: None }
    }
}

impl Classifier for LogisticRegressionClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize]) -> Result<()> {
        check_shape(x, y)?;
        let params = LogisticRegressionParameters::default().with_alpha(self.alpha);

        let model = LogisticRegression::fit(&to_dense_matrix(x), &to_i32_labels(y)?, params)
            .map_err(|e| {
                AppError::Training(format!("Failed to train logistic regression: {}", e))
            })?;

        self.model = Some(model);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| AppError::Internal("Model not trained".to_string()))?;

        let predictions = model
            .predict(&to_dense_matrix(x))
            .map_err(|e| AppError::Internal(format!("Prediction failed: {}", e)))?;

        Ok(predictions.iter().map(|&p| p.max(0) as usize).collect())
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::LogisticRegression
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }
}

/// Relative variance floor, applied as a fraction of the largest column variance
const VAR_SMOOTHING: f64 = 1e-9;

/// Gaussian naive Bayes.
///
/// Per-class variances are floored by `VAR_SMOOTHING` times the largest
/// column variance, so columns that are constant within a class keep a
/// finite likelihood.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NaiveBayesClassifier {
    classes: Vec<usize>,
    log_priors: Vec<f64>,
    means: Vec<Vec<f64>>,
    variances: Vec<Vec<f64>>,
}

impl NaiveBayesClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn joint_log_likelihood(&self, row: ndarray::ArrayView1<f64>, class: usize) -> f64 {
        let mut ll = self.log_priors[class];
        for ((v, m), var) in row.iter().zip(&self.means[class]).zip(&self.variances[class]) {
            ll -= 0.5 * (2.0 * std::f64::consts::PI * var).ln() + (v - m).powi(2) / (2.0 * var);
        }
        ll
    }
}

fn population_variance(column: ndarray::ArrayView1<f64>) -> f64 {
    let n = column.len().max(1) as f64;
    let mean = column.sum() / n;
    column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

impl Classifier for NaiveBayesClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize]) -> Result<()> {
        check_shape(x, y)?;
        if y.is_empty() {
            return Err(AppError::Training(
                "Failed to train Naive Bayes: no rows".to_string(),
            ));
        }

        let mut classes = y.to_vec();
        classes.sort_unstable();
        classes.dedup();

        let n_features = x.ncols();
        let epsilon = VAR_SMOOTHING * x.columns().into_iter().map(population_variance).fold(1e-12, f64::max);

        let mut log_priors = Vec::with_capacity(classes.len());
        let mut means = Vec::with_capacity(classes.len());
        let mut variances = Vec::with_capacity(classes.len());

        for &class in &classes {
            let rows: Vec<usize> = (0..y.len()).filter(|&i| y[i] == class).collect();
            let subset = x.select(ndarray::Axis(0), &rows);
            let n = rows.len() as f64;

            let mean: Vec<f64> = (0..n_features).map(|j| subset.column(j).sum() / n).collect();
            let var: Vec<f64> = (0..n_features)
                .map(|j| population_variance(subset.column(j)) + epsilon)
                .collect();

            log_priors.push((n / y.len() as f64).ln());
            means.push(mean);
            variances.push(var);
        }

        self.classes = classes;
        self.log_priors = log_priors;
        self.means = means;
        self.variances = variances;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        if self.classes.is_empty() {
            return Err(AppError::Internal("Model not trained".to_string()));
        }
        if x.ncols() != self.means[0].len() {
            return Err(AppError::Internal(format!(
                "Prediction failed: expected {} features, got {}",
                self.means[0].len(),
                x.ncols()
            )));
        }

        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                let mut best_ll = f64::NEG_INFINITY;
                for class in 0..self.classes.len() {
                    let ll = self.joint_log_likelihood(row, class);
                    if ll > best_ll {
                        best = class;
                        best_ll = ll;
                    }
                }
                self.classes[best]
            })
            .collect())
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::NaiveBayes
    }

    fn is_trained(&self) -> bool {
        !self.classes.is_empty()
    }
}

impl Classifier for GradientBoostingClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize]) -> Result<()> {
        GradientBoostingClassifier::fit(self, x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        GradientBoostingClassifier::predict(self, x)
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::GradientBoosting
    }

    fn is_trained(&self) -> bool {
        self.is_fitted()
    }
}

/// One candidate of the slate; the closed set of persistable models
#[derive(Debug, Serialize, Deserialize)]
pub enum CandidateModel {
    RandomForest(RandomForestWrapper),
    GradientBoosting(GradientBoostingClassifier),
    LogisticRegression(LogisticRegressionClassifier),
    NaiveBayes(NaiveBayesClassifier),
}

impl CandidateModel {
    /// Untrained candidate configured from the training hyper-parameters
    pub fn new(algorithm: Algorithm, config: &TrainingConfig) -> Self {
        match algorithm {
            Algorithm::RandomForest => CandidateModel::RandomForest(RandomForestWrapper::new(
                config.random_forest.n_trees,
                config.random_forest.max_depth,
                config.seed,
            )),
            Algorithm::GradientBoosting => CandidateModel::GradientBoosting(
                GradientBoostingClassifier::new(&config.gradient_boosting),
            ),
            Algorithm::LogisticRegression => CandidateModel::LogisticRegression(
                LogisticRegressionClassifier::new(config.logistic_regression.alpha),
            ),
            Algorithm::NaiveBayes => CandidateModel::NaiveBayes(NaiveBayesClassifier::new()),
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            CandidateModel::RandomForest(m) => m,
            CandidateModel::GradientBoosting(m) => m,
            CandidateModel::LogisticRegression(m) => m,
            CandidateModel::NaiveBayes(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Classifier {
        match self {
            CandidateModel::RandomForest(m) => m,
            CandidateModel::GradientBoosting(m) => m,
            CandidateModel::LogisticRegression(m) => m,
            CandidateModel::NaiveBayes(m) => m,
        }
    }

    /// Predict the label code of a single feature vector
    pub fn predict_one(&self, features: &[f64]) -> Result<usize> {
        let x = Array2::from_shape_vec((1, features.len()), features.to_vec())
            .map_err(|e| AppError::Internal(format!("Failed to create feature array: {}", e)))?;

        self.predict(&x)?
            .first()
            .copied()
            .ok_or_else(|| AppError::Internal("Model returned no prediction".to_string()))
    }
}

impl Classifier for CandidateModel {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize]) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        self.inner().predict(x)
    }

    fn algorithm(&self) -> Algorithm {
        self.inner().algorithm()
    }

    fn is_trained(&self) -> bool {
        self.inner().is_trained()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::accuracy;

    fn test_config() -> TrainingConfig {
        let mut config = TrainingConfig::default();
        config.random_forest.n_trees = 10;
        config.random_forest.max_depth = 20;
        config.gradient_boosting.n_estimators = 10;
        config.gradient_boosting.max_depth = 3;
        config
    }

    /// Three well separated blobs
    fn create_test_data(n_samples: usize) -> (Array2<f64>, Vec<usize>) {
        let mut data = Vec::with_capacity(n_samples * 3);
        let mut labels = Vec::with_capacity(n_samples);
        for i in 0..n_samples {
            let label = i % 3;
            let jitter = (i % 7) as f64 * 0.05;
            data.push(label as f64 * 3.0 + jitter);
            data.push(-(label as f64) * 2.0 + jitter);
            data.push(jitter);
            labels.push(label);
        }
        (Array2::from_shape_vec((n_samples, 3), data).unwrap(), labels)
    }

    #[test]
    fn test_every_candidate_learns_separable_data() {
        let (x, y) = create_test_data(90);
        let config = test_config();

        for algorithm in Algorithm::SLATE {
            let mut model = CandidateModel::new(algorithm, &config);
            assert!(!model.is_trained());
            assert_eq!(model.algorithm(), algorithm);

            model.fit(&x, &y).unwrap();
            assert!(model.is_trained());

            let predictions = model.predict(&x).unwrap();
            assert!(
                accuracy(&y, &predictions) > 0.9,
                "{} underfits separable data",
                algorithm
            );
        }
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let (x, _) = create_test_data(3);
        for algorithm in Algorithm::SLATE {
            let model = CandidateModel::new(algorithm, &test_config());
            assert!(model.predict(&x).is_err(), "{}", algorithm);
        }
    }

    #[test]
    fn test_predict_one() {
        let (x, y) = create_test_data(60);
        let mut model = CandidateModel::new(Algorithm::NaiveBayes, &test_config());
        model.fit(&x, &y).unwrap();

        let label = model.predict_one(&[6.0, -4.0, 0.0]).unwrap();
        assert_eq!(label, 2);
    }

    #[test]
    fn test_shape_mismatch_fails() {
        let (x, _) = create_test_data(10);
        let mut model = CandidateModel::new(Algorithm::RandomForest, &test_config());
        assert!(model.fit(&x, &[0, 1]).is_err());
    }

    #[test]
    fn test_trained_candidate_survives_bincode() {
        let (x, y) = create_test_data(60);
        let mut model = CandidateModel::new(Algorithm::RandomForest, &test_config());
        model.fit(&x, &y).unwrap();

        let bytes = bincode::serialize(&model).unwrap();
        let restored: CandidateModel = bincode::deserialize(&bytes).unwrap();

        assert_eq!(restored.algorithm(), Algorithm::RandomForest);
        assert_eq!(restored.predict(&x).unwrap(), model.predict(&x).unwrap());
    }
}
