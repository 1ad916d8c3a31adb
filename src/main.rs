use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use waqi_etl::{download_sources, load_manifest, Pipeline, PipelineConfig};

#[derive(Parser)]
#[command(name = "waqi-etl")]
#[command(about = "Clean, aggregate and enrich WAQI air-quality exports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import, reshape and enrich the measurement exports of a directory
    Run(RunArgs),

    /// Fetch the raw source files listed in a JSON manifest
    Download {
        #[arg(short, long, help = "JSON object mapping file names to URLs")]
        manifest: PathBuf,

        #[arg(short, long, default_value = "./data")]
        target_dir: PathBuf,

        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(short, long, help = "JSON config file; flags below override its values")]
    config: Option<PathBuf>,

    #[arg(short, long)]
    source_dir: Option<PathBuf>,

    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    #[arg(long, help = "First day of weather observations (YYYY-MM-DD)")]
    start: Option<NaiveDate>,

    #[arg(long, help = "Last day of weather observations (YYYY-MM-DD)")]
    end: Option<NaiveDate>,

    #[arg(long, help = "Drop weather columns with a larger missing fraction")]
    missing_threshold: Option<f64>,

    #[arg(long)]
    cache_dir: Option<PathBuf>,

    #[arg(long, help = "Keep only the city with the most rows per country")]
    representative_cities: bool,

    #[arg(long)]
    no_geo: bool,

    #[arg(long)]
    no_weather: bool,

    #[arg(long)]
    no_population: bool,
}

impl RunArgs {
    fn into_config(self) -> Result<PipelineConfig, waqi_etl::PipelineError> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(dir) = self.source_dir {
            config.source_directory = dir;
        }
        if let Some(dir) = self.output_dir {
            config.output_directory = dir;
        }
        if let Some(start) = self.start {
            config.date_range_start = start;
        }
        if let Some(end) = self.end {
            config.date_range_end = end;
        }
        if let Some(threshold) = self.missing_threshold {
            config.missing_threshold = threshold;
        }
        if self.cache_dir.is_some() {
            config.cache_directory = self.cache_dir;
        }
        config.select_representative_cities |= self.representative_cities;
        config.enrich_geo &= !self.no_geo;
        config.enrich_weather &= !self.no_weather;
        config.enrich_population &= !self.no_population;
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let config = args.into_config()?;
            let pipeline = Pipeline::new(config).await?;
            match pipeline.run().await? {
                Some(output) => info!(
                    "Wrote {} rows to {}",
                    output.table.height(),
                    output.output_path.display()
                ),
                None => warn!(
                    "No measurement files found in {}",
                    pipeline.config().source_directory.display()
                ),
            }
        }
        Commands::Download {
            manifest,
            target_dir,
            timeout_secs,
        } => {
            let manifest = load_manifest(&manifest)?;
            let client = Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()?;
            let written = download_sources(&manifest, &target_dir, &client).await?;
            info!("Downloaded {} of {} files", written.len(), manifest.len());
        }
    }
    Ok(())
}
