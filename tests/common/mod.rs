//! Shared fixtures for the pipeline integration tests

#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use crime_predictor::{
    ml::{MLConfig, TrainingConfig},
    models::{CityCatalog, CityInfo, CrimeRecord, Dataset},
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

pub const CATEGORIES: [&str; 3] = ["THEFT", "ROBBERY", "FRAUD"];

/// Small hyper-parameters so the full slate trains in test time
pub fn fast_training_config() -> TrainingConfig {
    let mut config = TrainingConfig::default();
    config.random_forest.n_trees = 10;
    config.random_forest.max_depth = 6;
    config.gradient_boosting.n_estimators = 8;
    config.gradient_boosting.max_depth = 3;
    config.cv_folds = 3;
    config
}

pub fn fast_ml_config(synthesis_seed: Option<u64>) -> MLConfig {
    let mut config = MLConfig::default();
    config.training = fast_training_config();
    config.synthesis.seed = synthesis_seed;
    config
}

/// Catalog holding the two scenario cities plus one never seen in training
pub fn scenario_catalog() -> CityCatalog {
    CityCatalog::empty()
        .with_city(CityInfo::new("CityA", 12.97, 77.59).with_areas(["Koramangala", "Whitefield"]))
        .with_city(CityInfo::new("CityB", 19.07, 72.87).with_areas(["Thane", "Bandra"]))
        .with_city(CityInfo::new("CityC", 28.61, 77.20))
}

/// `n` seeded records over three categories and two cities.
///
/// Category tracks the hour band loosely so the models have some signal.
pub fn scenario_records(n: usize, seed: u64) -> Vec<CrimeRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = NaiveDate::from_ymd_opt(2023, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap();
    let areas = [("CityA", ["Koramangala", "Whitefield"]), ("CityB", ["Thane", "Bandra"])];
    let weapons = ["Knife", "Firearm", "None"];
    let domains = ["Violent Crime", "Other Crime", "Fire Accident"];

    (0..n)
        .map(|i| {
            let (city, city_areas) = areas[i % 2];
            let hour = rng.gen_range(0..24);
            let category = if rng.gen_bool(0.7) {
                CATEGORIES[hour as usize / 8]
            } else {
                CATEGORIES[rng.gen_range(0..3)]
            };
            let occurred = start + Duration::days(rng.gen_range(0..365)) + Duration::hours(hour);

            CrimeRecord::new(occurred, city, *city_areas.choose(&mut rng).unwrap(), category)
                .with_victim(rng.gen_range(10..80), if rng.gen_bool(0.5) { "M" } else { "F" })
                .with_weapon(*weapons.choose(&mut rng).unwrap())
                .with_domain(*domains.choose(&mut rng).unwrap())
        })
        .collect()
}

pub fn scenario_dataset(n: usize, seed: u64) -> Dataset {
    Dataset::new(scenario_records(n, seed))
}
