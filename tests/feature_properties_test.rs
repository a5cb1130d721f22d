//! Property tests for feature derivation and categorical encoding

use chrono::{Duration, NaiveDate};
use crime_predictor::{
    ml::{
        features::{age_group, risk_level, risk_score},
        AgeGroup, AreaType, DayPhases, EncoderRegistry, FeatureDeriver, TemporalFeatures,
    },
    models::CrimeRecord,
};
use proptest::prelude::*;

fn age_rank(group: AgeGroup) -> u8 {
    match group {
        AgeGroup::Young => 0,
        AgeGroup::Adult => 1,
        AgeGroup::MiddleAged => 2,
        AgeGroup::Senior => 3,
    }
}

fn area_type() -> impl Strategy<Value = AreaType> {
    prop_oneof![
        Just(AreaType::Commercial),
        Just(AreaType::Residential),
        Just(AreaType::Industrial),
        Just(AreaType::Mixed),
    ]
}

proptest! {
    #[test]
    fn day_phases_cover_every_hour(hour in 0u32..24) {
        let p = DayPhases::for_hour(hour);
        let set = [p.night, p.morning, p.afternoon, p.evening].iter().filter(|f| **f).count();

        if hour == 6 {
            prop_assert_eq!(set, 2);
            prop_assert!(p.night && p.morning);
        } else {
            prop_assert_eq!(set, 1);
        }
    }

    #[test]
    fn temporal_features_are_in_range(days in 0i64..3650, hour in 0u32..24) {
        let date = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap() + Duration::days(days);
        let t = TemporalFeatures::for_date_and_hour(date, hour);

        prop_assert!(t.day_of_week < 7);
        prop_assert!((1..=12).contains(&t.month));
        prop_assert!((1..=366).contains(&t.day_of_year));
        prop_assert_eq!(t.is_weekend, t.day_of_week >= 5);
        prop_assert_eq!(t.hour, hour);
    }

    #[test]
    fn age_groups_are_monotonic(a in 0u32..150, b in 0u32..150) {
        let (young, old) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(age_rank(age_group(young)) <= age_rank(age_group(old)));
    }

    #[test]
    fn risk_level_is_a_pure_function(
        night in any::<bool>(),
        evening in any::<bool>(),
        weekend in any::<bool>(),
        area in area_type(),
        severity in 3u32..=10,
    ) {
        let first = risk_level(night, evening, weekend, area, severity);
        prop_assert_eq!(first, risk_level(night, evening, weekend, area, severity));

        let score = risk_score(night, evening, weekend, area, severity);
        prop_assert!(score >= 0.9 - 1e-9 && score <= 7.0 + 1e-9);
    }

    #[test]
    fn derived_rows_match_record_fields(age in 0u32..110, hour in 0u32..24) {
        let occurred = NaiveDate::from_ymd_opt(2024, 2, 29)
            .and_then(|d| d.and_hms_opt(hour, 15, 0))
            .unwrap();
        let record = CrimeRecord::new(occurred, "Pune", "Hinjewadi", "ROBBERY").with_victim(age, "F");
        let row = FeatureDeriver::derive(&record);

        prop_assert_eq!(row.victim_age, age);
        prop_assert_eq!(row.victim_age_group, age_group(age));
        prop_assert_eq!(row.temporal, TemporalFeatures::from_timestamp(&occurred));
        prop_assert_eq!(row.numeric_prefix().len(), 11);
    }

    #[test]
    fn encoding_round_trips_and_codes_stay_stable(
        initial in prop::collection::vec("[a-e]{1,3}", 1..20),
        extra in prop::collection::vec("[a-h]{1,3}", 0..20),
    ) {
        let mut registry = EncoderRegistry::new();
        registry.fit("f", &initial).unwrap();
        let before = registry.encode("f", &initial).unwrap();
        let size = registry.get("f").unwrap().len();

        let extra_codes = registry.encode("f", &extra).unwrap();
        prop_assert_eq!(registry.decode("f", &extra_codes).unwrap(), extra.clone());

        // growth never moves an existing code
        prop_assert_eq!(registry.encode("f", &initial).unwrap(), before.clone());
        prop_assert_eq!(registry.decode("f", &before).unwrap(), initial.clone());

        let classes = registry.classes("f").unwrap();
        prop_assert!(classes.len() >= size);
        for (code, value) in classes.iter().enumerate() {
            prop_assert_eq!(registry.lookup("f", value), Some(code));
        }
    }
}
