use crate::ml::models::MLConfig;
use crate::models::{CityCatalog, CityInfo};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Training, persistence and synthesis
    #[serde(default)]
    pub ml: MLConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Cities added to (or replacing entries of) the default catalog
    #[serde(default)]
    pub cities: Vec<CityInfo>,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/local.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: CRIME_PRED_)
            .add_source(
                config::Environment::with_prefix("CRIME_PRED")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Default catalog extended with the configured cities
    pub fn catalog(&self) -> Result<CityCatalog, validator::ValidationErrors> {
        let mut catalog = CityCatalog::default();
        for city in &self.cities {
            city.validate()?;
            catalog.insert(city.clone());
        }
        Ok(catalog)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(raw: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_embedded_defaults_parse() {
        let config = from_toml(include_str!("../config/default.toml"));

        assert_eq!(config.ml.training.seed, 42);
        assert_eq!(config.ml.training.cv_folds, 5);
        assert_eq!(config.ml.training.random_forest.n_trees, 100);
        assert_eq!(config.observability.log_level, "info");
        assert!(config.cities.is_empty());
    }

    #[test]
    fn test_partial_sections_fall_back_to_defaults() {
        let config = from_toml(
            r#"
            [ml.training]
            cv_folds = 3

            [ml.synthesis]
            seed = 5
            "#,
        );

        assert_eq!(config.ml.training.cv_folds, 3);
        assert_eq!(config.ml.training.test_size, 0.2);
        assert_eq!(config.ml.synthesis.seed, Some(5));
        assert_eq!(config.ml.model_path, "./data/models");
        assert!(!config.observability.json_logs);
    }

    #[test]
    fn test_extra_cities_extend_catalog() {
        let config = from_toml(
            r#"
            [[cities]]
            name = "Kolkata"
            latitude = 22.57
            longitude = 88.36
            areas = ["Salt Lake", "Park Street"]
            "#,
        );

        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.cities().len(), 8);
        assert_eq!(catalog.get("Kolkata").unwrap().areas.len(), 2);
    }

    #[test]
    fn test_invalid_city_is_rejected() {
        let mut config = Config::default();
        config.cities.push(CityInfo::new("Nowhere", 95.0, 0.0));
        assert!(config.catalog().is_err());
    }
}
