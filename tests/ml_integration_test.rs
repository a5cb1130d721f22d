/// Integration tests for the prediction pipeline
///
/// These tests verify the complete flow:
/// - Feature derivation and encoding over a realistic dataset
/// - Ensemble training and best-model selection per target
/// - Prediction synthesis through the engine and the async service

mod common;

use common::{fast_ml_config, fast_training_config, scenario_catalog, scenario_dataset, scenario_records, CATEGORIES};
use crime_predictor::{
    ml::{
        Algorithm, Classifier, PredictionEngine, PredictionService, PredictionSynthesizer, SynthesisConfig,
        Target,
    },
    models::{parse_reference_timestamp, PredictionRequest},
    AppError,
};
use std::collections::HashSet;
use std::sync::Arc;

#[test]
fn test_scenario_probe_hours() {
    let records = scenario_records(1000, 42);
    let (engine, report) = PredictionEngine::train(&records, &fast_training_config()).unwrap();

    assert_eq!(report.n_records, 1000);
    assert_eq!(report.targets.len(), 4);
    for target_report in &report.targets {
        assert_eq!(target_report.candidates.len(), Algorithm::SLATE.len());
    }

    let synthesizer = PredictionSynthesizer::new(scenario_catalog(), SynthesisConfig { seed: Some(1) });
    let reference = parse_reference_timestamp("2024-01-02T10:00").unwrap();
    let predictions = synthesizer.synthesize(&engine, "CityA", reference, 5).unwrap();

    assert_eq!(predictions.len(), 5);
    let hours: Vec<u32> = predictions.iter().map(|p| p.hour).collect();
    assert_eq!(hours, vec![10, 12, 14, 16, 18]);

    for p in &predictions {
        if let Some(crime) = p.output(Target::CrimeType) {
            assert!(CATEGORIES.contains(&crime), "unexpected category {}", crime);
        }
        if let Some(area) = p.output(Target::Area) {
            assert!(["Koramangala", "Whitefield", "Thane", "Bandra"].contains(&area));
        }
        if let Some(risk) = p.output(Target::RiskLevel) {
            assert!(["LOW", "MEDIUM", "HIGH", "CRITICAL"].contains(&risk));
        }
        if let Some(hour) = p.output(Target::Hour) {
            assert!(hour.parse::<u32>().unwrap() < 24);
        }
    }
}

#[test]
fn test_every_target_gets_a_best_model() {
    let records = scenario_records(400, 7);
    let (engine, report) = PredictionEngine::train(&records, &fast_training_config()).unwrap();

    for target in Target::ALL {
        let target_report = report.target(target).unwrap();
        let best = target_report.best.as_ref().expect("best model");

        assert_eq!(engine.best_model(target).unwrap().algorithm(), best.best_model);
        assert!((0.0..=1.0).contains(&best.best_score));

        let best_candidate = target_report
            .candidates
            .iter()
            .find(|c| c.algorithm == best.best_model)
            .unwrap();
        assert!(best_candidate.holdout.is_some());
    }
}

#[test]
fn test_training_is_deterministic() {
    let records = scenario_records(300, 3);
    let config = fast_training_config();

    let (_, first) = PredictionEngine::train(&records, &config).unwrap();
    let (_, second) = PredictionEngine::train(&records, &config).unwrap();

    assert_eq!(first.best_algorithms(), second.best_algorithms());
}

#[test]
fn test_zero_predictions() {
    let (engine, _) = PredictionEngine::train(&scenario_records(200, 5), &fast_training_config()).unwrap();
    let synthesizer = PredictionSynthesizer::new(scenario_catalog(), SynthesisConfig::default());
    let reference = parse_reference_timestamp("2024-01-02T10:00").unwrap();

    assert!(synthesizer.synthesize(&engine, "CityA", reference, 0).unwrap().is_empty());
}

#[test]
fn test_unseen_city_gets_unique_predictions() {
    let (engine, _) = PredictionEngine::train(&scenario_records(200, 9), &fast_training_config()).unwrap();
    let synthesizer = PredictionSynthesizer::new(scenario_catalog(), SynthesisConfig::default());
    let reference = parse_reference_timestamp("05-03-2024 08:30").unwrap();

    let predictions = synthesizer.synthesize(&engine, "CityC", reference, 30).unwrap();
    assert_eq!(predictions.len(), 30);

    let ids: HashSet<&str> = predictions.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids.len(), 30);
    assert!(predictions.iter().all(|p| p.id.starts_with("pred_CityC_")));
    assert!(predictions.iter().all(|p| p.location == "Unknown"));
}

#[test]
fn test_encoders_do_not_grow_at_inference() {
    let (engine, _) = PredictionEngine::train(&scenario_records(200, 11), &fast_training_config()).unwrap();
    let before = engine.encoders().classes("city").unwrap().to_vec();

    let synthesizer = PredictionSynthesizer::new(scenario_catalog(), SynthesisConfig::default());
    let reference = parse_reference_timestamp("2024-06-01").unwrap();
    synthesizer.synthesize(&engine, "CityC", reference, 3).unwrap();

    assert_eq!(engine.encoders().classes("city").unwrap(), before.as_slice());
    assert_eq!(before, vec!["CityA".to_string(), "CityB".to_string()]);
}

#[test]
fn test_untrainable_targets_are_omitted_from_predictions() {
    let records = scenario_records(1, 4);
    let (engine, report) = PredictionEngine::train(&records, &fast_training_config()).unwrap();

    for target_report in &report.targets {
        assert!(target_report.best.is_none(), "{} has a best model", target_report.target);
        assert!(target_report.candidates.iter().all(|c| c.error.is_some()));
    }
    assert!(!engine.has_models());

    let synthesizer = PredictionSynthesizer::new(scenario_catalog(), SynthesisConfig { seed: Some(2) });
    let reference = parse_reference_timestamp("2024-01-02T10:00").unwrap();
    let predictions = synthesizer.synthesize(&engine, "CityA", reference, 4).unwrap();

    assert_eq!(predictions.len(), 4);
    for p in &predictions {
        for target in Target::ALL {
            assert!(p.output(target).is_none());
        }
    }
}

#[tokio::test]
async fn test_service_end_to_end() {
    let service = Arc::new(PredictionService::new(fast_ml_config(Some(3)), scenario_catalog()));

    let report = service.train(scenario_dataset(300, 21)).await.unwrap();
    assert_eq!(report.targets.len(), 4);

    let request = PredictionRequest::new("CityB", 6).at("2024-01-02T22:00");
    let predictions = service.predict_request(&request).await.unwrap();

    let hours: Vec<u32> = predictions.iter().map(|p| p.hour).collect();
    assert_eq!(hours, vec![22, 0, 2, 4, 6, 8]);
    assert_eq!(predictions[1].date, "2024-01-03");

    // concurrent readers share one snapshot
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.predict("CityA", "2024-01-02T10:00", 3).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().len(), 3);
    }

    assert_eq!(service.get_stats().await.predictions_served, 18);
}

#[tokio::test]
async fn test_service_rejects_unsupported_city() {
    let service = PredictionService::new(fast_ml_config(None), scenario_catalog());
    service.train(scenario_dataset(150, 2)).await.unwrap();

    let err = service.predict("Gotham", "2024-01-02T10:00", 3).await.unwrap_err();
    assert!(matches!(err, AppError::Configuration(_)));
    assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
}
