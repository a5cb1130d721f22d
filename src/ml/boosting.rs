use crate::error::{AppError, Result};
use crate::ml::classifier::to_dense_matrix;
use crate::ml::models::GradientBoostingConfig;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};
use tracing::debug;

type RegressionTree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Multiclass gradient boosting on the multinomial deviance.
///
/// Each round fits one regression tree per class to the residual
/// `onehot - softmax(F)` and adds `learning_rate * tree(x)` to that class's
/// raw score. Scores start at the log class priors.
#[derive(Debug, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    n_estimators: usize,
    max_depth: u16,
    learning_rate: f64,

    /// Observed labels, sorted; score column `k` belongs to `classes[k]`
    classes: Vec<usize>,

    /// Log prior per class
    init: Vec<f64>,

    /// `rounds[r][k]`: tree of round `r` for class `k`
    rounds: Vec<Vec<RegressionTree>>,
}

impl GradientBoostingClassifier {
    pub fn new(config: &GradientBoostingConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            max_depth: config.max_depth,
            learning_rate: config.learning_rate,
            classes: Vec::new(),
            init: Vec::new(),
            rounds: Vec::new(),
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.classes.is_empty()
    }

    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &[usize]) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(AppError::Training(format!(
                "Feature rows ({}) and labels ({}) differ",
                x.nrows(),
                y.len()
            )));
        }
        if y.is_empty() {
            return Err(AppError::Training(
                "Cannot fit gradient boosting on zero rows".to_string(),
            ));
        }

        let mut classes = y.to_vec();
        classes.sort_unstable();
        classes.dedup();

        let n = y.len();
        let k = classes.len();
        let y_idx: Vec<usize> = y
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or(0))
            .collect();

        let mut counts = vec![0usize; k];
        for &c in &y_idx {
            counts[c] += 1;
        }
        let init: Vec<f64> = counts.iter().map(|&c| (c as f64 / n as f64).ln()).collect();

        self.classes = classes;
        self.init = init.clone();
        self.rounds = Vec::new();

        // One class: the prior alone decides
        if k == 1 {
            return Ok(());
        }

        let matrix = to_dense_matrix(x);
        let params = DecisionTreeRegressorParameters::default().with_max_depth(self.max_depth);
        let mut scores: Vec<Vec<f64>> = vec![init; n];

        for round in 0..self.n_estimators {
            let probs: Vec<Vec<f64>> = scores.iter().map(|s| softmax(s)).collect();
            let mut trees = Vec::with_capacity(k);

            for class in 0..k {
                let residual: Vec<f64> = (0..n)
                    .map(|i| {
                        let target = if y_idx[i] == class { 1.0 } else { 0.0 };
                        target - probs[i][class]
                    })
                    .collect();

                let tree = RegressionTree::fit(&matrix, &residual, params.clone()).map_err(|e| {
                    AppError::Training(format!(
                        "Boosting round {} failed for class {}: {}",
                        round, class, e
                    ))
                })?;
                let step = tree
                    .predict(&matrix)
                    .map_err(|e| AppError::Training(format!("Boosting round {} failed: {}", round, e)))?;

                for (score, delta) in scores.iter_mut().zip(step.iter()) {
                    score[class] += self.learning_rate * delta;
                }
                trees.push(tree);
            }

            self.rounds.push(trees);
        }

        debug!(
            "Gradient boosting fitted: {} classes, {} rounds",
            k,
            self.rounds.len()
        );
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        if !self.is_fitted() {
            return Err(AppError::Internal("Model not trained".to_string()));
        }

        let n = x.nrows();
        if self.classes.len() == 1 || n == 0 {
            return Ok(vec![self.classes[0]; n]);
        }

        let matrix = to_dense_matrix(x);
        let mut scores: Vec<Vec<f64>> = vec![self.init.clone(); n];

        for trees in &self.rounds {
            for (class, tree) in trees.iter().enumerate() {
                let step = tree
                    .predict(&matrix)
                    .map_err(|e| AppError::Internal(format!("Prediction failed: {}", e)))?;
                for (score, delta) in scores.iter_mut().zip(step.iter()) {
                    score[class] += self.learning_rate * delta;
                }
            }
        }

        Ok(scores
            .iter()
            .map(|s| self.classes[argmax(s)])
            .collect())
    }
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest score; the first wins ties
fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, s) in scores.iter().enumerate() {
        if *s > scores[best] {
            best = i;
        }
    }
    best
}
