use anyhow::Context;
use clap::{Parser, Subcommand};
use crime_predictor::{
    config::Config,
    ml::{PredictionService, Target},
    models::{Dataset, PredictionRequest},
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "crime-predictor")]
#[command(about = "Train crime prediction ensembles and synthesize forward predictions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train every target on a dataset and save the models
    Train {
        /// CSV or JSON record file
        #[arg(short, long)]
        dataset: PathBuf,

        /// Model directory (defaults to the configured model path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Synthesize predictions for a city
    Predict {
        #[arg(short, long)]
        city: String,

        /// Reference timestamp (dd-mm-YYYY HH:MM or YYYY-mm-ddTHH:MM); an hour from now when omitted
        #[arg(short, long)]
        date: Option<String>,

        #[arg(short = 'n', long, default_value = "10")]
        count: usize,

        /// Model directory (defaults to the configured model path)
        #[arg(short, long)]
        models: Option<PathBuf>,
    },

    /// Show model performance and service statistics
    Status {
        #[arg(short, long)]
        models: Option<PathBuf>,
    },

    /// List supported cities
    Cities,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize tracing
    let json_logs = config.observability.json_logs;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("crime_predictor={}", config.observability.log_level).into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    let catalog = config.catalog().context("Invalid city configuration")?;
    let service = PredictionService::new(config.ml.clone(), catalog);

    if let Err(e) = run(cli.command, &service, &config).await {
        tracing::error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(command: Commands, service: &PredictionService, config: &Config) -> anyhow::Result<()> {
    let model_dir = |dir: Option<PathBuf>| dir.unwrap_or_else(|| PathBuf::from(&config.ml.model_path));

    match command {
        Commands::Train { dataset, output } => {
            let dataset = Dataset::load(&dataset)
                .with_context(|| format!("Failed to load dataset {:?}", dataset))?;
            tracing::info!("Loaded {} records", dataset.len());

            let report = service.train(dataset).await?;
            let dir = model_dir(output);
            service.save_to(&dir).await?;
            tracing::info!("✅ Models saved to {:?}", dir);

            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Predict {
            city,
            date,
            count,
            models,
        } => {
            service.load_from(model_dir(models)).await?;

            let mut request = PredictionRequest::new(city, count);
            if let Some(date) = date {
                request = request.at(date);
            }
            let predictions = service.predict_request(&request).await?;

            println!("{}", serde_json::to_string_pretty(&predictions)?);
        }

        Commands::Status { models } => {
            let dir = model_dir(models);
            if let Err(e) = service.load_from(&dir).await {
                tracing::warn!("⚠️  No models loaded from {:?}: {}", dir, e);
            }

            let performance = service.performance().await;
            for target in Target::ALL {
                match performance.get(&target) {
                    Some(record) => println!(
                        "{:<12} {:<20} CV accuracy {:.4} ± {:.4}",
                        target,
                        record.best_model.label(),
                        record.best_score,
                        record.cv_std
                    ),
                    None => println!("{:<12} no model", target),
                }
            }
            println!();
            println!("{}", serde_json::to_string_pretty(&service.get_stats().await)?);
        }

        Commands::Cities => {
            for city in service.catalog().cities() {
                println!(
                    "{:<12} ({:.4}, {:.4})  {} areas",
                    city.name,
                    city.latitude,
                    city.longitude,
                    city.areas.len()
                );
            }
        }
    }

    Ok(())
}
