use crate::error::{AppError, Result};
use crate::ml::classifier::{CandidateModel, Classifier};
use crate::ml::models::{
    accuracy, Algorithm, CandidateReport, CrossValidationScore, ModelMetrics, PerformanceRecord,
    Target, TargetReport, TrainingConfig,
};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Trained candidates for one target plus the designated best
#[derive(Debug)]
pub struct TargetModels {
    candidates: Vec<CandidateModel>,
    best: Option<usize>,
}

impl TargetModels {
    /// `best` is dropped unless it indexes one of `candidates`
    pub fn new(candidates: Vec<CandidateModel>, best: Option<usize>) -> Self {
        let best = best.filter(|&i| i < candidates.len());
        Self { candidates, best }
    }

    pub fn candidates(&self) -> &[CandidateModel] {
        &self.candidates
    }

    pub fn best(&self) -> Option<&CandidateModel> {
        self.best.and_then(|i| self.candidates.get(i))
    }

    pub fn best_index(&self) -> Option<usize> {
        self.best
    }

    /// Position of the candidate trained with `algorithm`
    pub fn position(&self, algorithm: Algorithm) -> Option<usize> {
        self.candidates.iter().position(|c| c.algorithm() == algorithm)
    }
}

/// Target → trained candidates
#[derive(Debug, Default)]
pub struct ModelRegistry {
    targets: BTreeMap<Target, TargetModels>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: Target, models: TargetModels) {
        self.targets.insert(target, models);
    }

    pub fn get(&self, target: Target) -> Option<&TargetModels> {
        self.targets.get(&target)
    }

    /// Best model for `target`, if one was designated
    pub fn best(&self, target: Target) -> Option<&CandidateModel> {
        self.targets.get(&target).and_then(TargetModels::best)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Target, &TargetModels)> {
        self.targets.iter().map(|(t, m)| (*t, m))
    }

    /// Number of targets with at least one trained candidate
    pub fn len(&self) -> usize {
        self.targets.values().filter(|m| !m.candidates.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stratified train/test partition.
///
/// Classes with fewer than two rows cannot be split and stay entirely in
/// training. Every other class contributes `round(n * test_size)` rows to
/// the test side, clamped to `1..n`.
pub fn stratified_split(labels: &[usize], test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for (class, mut rows) in group_by_class(labels) {
        if rows.len() < 2 {
            warn!(
                "Class {} has {} row(s); kept in the training partition",
                class,
                rows.len()
            );
            train.extend(rows);
            continue;
        }

        rows.shuffle(&mut rng);
        let n = rows.len();
        let n_test = ((n as f64 * test_size).round() as usize).clamp(1, n - 1);
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Stratified k-fold test indices.
///
/// Each class's shuffled rows are dealt round-robin across folds, the deal
/// continuing from class to class so fold sizes differ by at most one.
pub fn stratified_folds(labels: &[usize], k: usize, seed: u64) -> Vec<Vec<usize>> {
    let k = k.min(labels.len()).max(2);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut folds = vec![Vec::new(); k];
    let mut next = 0;

    for (_, mut rows) in group_by_class(labels) {
        rows.shuffle(&mut rng);
        for row in rows {
            folds[next].push(row);
            next = (next + 1) % k;
        }
    }

    for fold in &mut folds {
        fold.sort_unstable();
    }
    folds
}

fn group_by_class(labels: &[usize]) -> BTreeMap<usize, Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, &label) in labels.iter().enumerate() {
        groups.entry(label).or_default().push(row);
    }
    groups
}

fn take_rows(x: &Array2<f64>, rows: &[usize]) -> Array2<f64> {
    x.select(Axis(0), rows)
}

fn take_labels(y: &[usize], rows: &[usize]) -> Vec<usize> {
    rows.iter().map(|&i| y[i]).collect()
}

/// Trains the candidate slate per target and designates the best
pub struct EnsembleTrainer {
    config: TrainingConfig,
}

impl EnsembleTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train every candidate for one target
    pub fn train_target(
        &self,
        target: Target,
        x: &Array2<f64>,
        y: &[usize],
    ) -> Result<(TargetModels, TargetReport)> {
        if x.nrows() != y.len() {
            return Err(AppError::Training(format!(
                "Target {}: {} feature rows but {} labels",
                target,
                x.nrows(),
                y.len()
            )));
        }

        let n_classes = group_by_class(y).len();
        info!(
            "Training {} candidates for target '{}' ({} rows, {} classes)",
            Algorithm::SLATE.len(),
            target,
            y.len(),
            n_classes
        );

        let (train_rows, test_rows) = stratified_split(y, self.config.test_size, self.config.seed);
        let folds = stratified_folds(y, self.config.cv_folds, self.config.seed);

        let outcomes: Vec<(Option<CandidateModel>, CandidateReport)> = if self.config.parallel {
            Algorithm::SLATE[..]
                .par_iter()
                .map(|&algorithm| self.train_candidate(algorithm, target, x, y, &train_rows, &test_rows, &folds))
                .collect()
        } else {
            Algorithm::SLATE
                .iter()
                .map(|&algorithm| self.train_candidate(algorithm, target, x, y, &train_rows, &test_rows, &folds))
                .collect()
        };

        let mut candidates = Vec::new();
        let mut reports = Vec::with_capacity(outcomes.len());
        let mut best: Option<(usize, PerformanceRecord)> = None;

        for (model, report) in outcomes {
            if let (Some(model), Some(cv)) = (model, report.cross_validation.as_ref()) {
                let index = candidates.len();
                candidates.push(model);

                let better = match &best {
                    Some((_, current)) => cv.mean > current.best_score,
                    None => true,
                };
                if better {
                    best = Some((
                        index,
                        PerformanceRecord {
                            best_model: report.algorithm,
                            best_score: cv.mean,
                            cv_std: cv.std,
                        },
                    ));
                }
            }
            reports.push(report);
        }

        match &best {
            Some((_, record)) => info!(
                "Best model for '{}': {} (CV accuracy {:.4} ± {:.4})",
                target,
                record.best_model.label(),
                record.best_score,
                record.cv_std
            ),
            None => warn!("Every candidate failed for target '{}'; it will be omitted", target),
        }

        let report = TargetReport {
            target,
            n_classes,
            candidates: reports,
            best: best.as_ref().map(|(_, record)| record.clone()),
        };

        Ok((TargetModels::new(candidates, best.map(|(i, _)| i)), report))
    }

    #[allow(clippy::too_many_arguments)]
    fn train_candidate(
        &self,
        algorithm: Algorithm,
        target: Target,
        x: &Array2<f64>,
        y: &[usize],
        train_rows: &[usize],
        test_rows: &[usize],
        folds: &[Vec<usize>],
    ) -> (Option<CandidateModel>, CandidateReport) {
        let start = Instant::now();
        let mut model = CandidateModel::new(algorithm, &self.config);

        let holdout = model
            .fit(&take_rows(x, train_rows), &take_labels(y, train_rows))
            .and_then(|_| {
                if test_rows.is_empty() {
                    return Ok(None);
                }
                let predicted = model.predict(&take_rows(x, test_rows))?;
                Ok(Some(ModelMetrics::from_predictions(
                    &take_labels(y, test_rows),
                    &predicted,
                )))
            });
        let fit_duration_ms = start.elapsed().as_millis() as u64;

        let outcome = holdout.and_then(|holdout| {
            let cv = self.cross_validate(algorithm, target, x, y, folds)?;
            Ok((holdout, cv))
        });

        match outcome {
            Ok((holdout, cv)) => {
                info!(
                    "{} for '{}': holdout accuracy {}, CV {:.4} ± {:.4}",
                    algorithm.label(),
                    target,
                    holdout
                        .as_ref()
                        .map(|m| format!("{:.4}", m.accuracy))
                        .unwrap_or_else(|| "n/a".to_string()),
                    cv.mean,
                    cv.std
                );
                let report = CandidateReport {
                    algorithm,
                    holdout,
                    cross_validation: Some(cv),
                    fit_duration_ms,
                    error: None,
                };
                (Some(model), report)
            }
            Err(e) => {
                warn!("Skipping {} for '{}': {}", algorithm.label(), target, e);
                let report = CandidateReport {
                    algorithm,
                    holdout: None,
                    cross_validation: None,
                    fit_duration_ms,
                    error: Some(e.to_string()),
                };
                (None, report)
            }
        }
    }

    fn cross_validate(
        &self,
        algorithm: Algorithm,
        target: Target,
        x: &Array2<f64>,
        y: &[usize],
        folds: &[Vec<usize>],
    ) -> Result<CrossValidationScore> {
        let mut scores = Vec::with_capacity(folds.len());

        for (i, test_rows) in folds.iter().enumerate() {
            let train_rows: Vec<usize> = (0..y.len())
                .filter(|row| test_rows.binary_search(row).is_err())
                .collect();

            let mut model = CandidateModel::new(algorithm, &self.config);
            model.fit(&take_rows(x, &train_rows), &take_labels(y, &train_rows))?;
            let predicted = model.predict(&take_rows(x, test_rows))?;
            let score = accuracy(&take_labels(y, test_rows), &predicted);

            debug!("{} '{}' fold {}: accuracy {:.4}", algorithm, target, i, score);
            scores.push(score);
        }

        Ok(CrossValidationScore::from_folds(scores))
    }
}
