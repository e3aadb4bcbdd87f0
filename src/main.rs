//! Station-Scan - space station equipment detection pipeline
//!
//! Sends an uploaded image to the external detector service, enriches the
//! raw detections (validation, overlap resolution, contextual annotation)
//! and persists the resulting record for later queries and chat.

mod chat;
mod config;
mod detect;
mod generate;
mod pipeline;
mod storage;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::chat::ChatService;
use crate::config::AppConfig;
use crate::detect::HttpDetector;
use crate::generate::{HttpGenerator, TextGenerator};
use crate::pipeline::{DetectionPipeline, DetectionRecord, DetectionStats, ScanOutcome};
use crate::storage::DetectionStore;

/// Station-Scan - detection enrichment over station imagery
#[derive(Parser, Debug)]
#[command(name = "station-scan")]
#[command(about = "Detect and annotate space station equipment in images")]
struct Args {
    /// Path to a configuration file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run detection on an image and store the enriched record
    Scan {
        /// Image file to analyze
        image: PathBuf,
        /// Skip persistence; print the enriched record only
        #[arg(long)]
        no_store: bool,
    },
    /// List recent detection records
    List {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show a stored detection record with its statistics
    Show { id: i64 },
    /// Free-form technical analysis of a component label
    Annotate {
        label: String,
        /// Known issue to fold into the analysis
        #[arg(long)]
        issue: Option<String>,
    },
    /// Ask the assistant about a stored detection record
    Chat { id: i64, message: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_or_create_config(args.config.as_deref())?;

    match args.command {
        Command::Scan { image, no_store } => run_scan(&config, &image, no_store),
        Command::List { limit } => run_list(&config, limit),
        Command::Show { id } => run_show(&config, id),
        Command::Annotate { label, issue } => run_annotate(&config, &label, issue.as_deref()),
        Command::Chat { id, message } => run_chat(&config, id, &message),
    }
}

/// Load configuration from file or create default
fn load_or_create_config(path: Option<&std::path::Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        let config = config::load_config(path)
            .with_context(|| format!("failed to load configuration from {:?}", path))?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_dir) = storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            if let Ok(config) = config::load_config(&config_path) {
                info!("Loaded configuration from {:?}", config_path);
                return Ok(config);
            }
        }
    }

    info!("Using default configuration");
    Ok(AppConfig::default())
}

fn open_store(config: &AppConfig) -> Result<DetectionStore> {
    let path = match &config.storage.database_path {
        Some(path) => path.clone(),
        None => storage::get_data_dir()?.join("detections.db"),
    };

    DetectionStore::open(&path).with_context(|| format!("failed to open store at {:?}", path))
}

fn build_generator(config: &AppConfig) -> Result<Option<HttpGenerator>> {
    match &config.generation.endpoint {
        Some(endpoint) => Ok(Some(HttpGenerator::new(endpoint.clone())?)),
        None => Ok(None),
    }
}

fn run_scan(config: &AppConfig, image: &PathBuf, no_store: bool) -> Result<()> {
    let image_bytes = std::fs::read(image)
        .with_context(|| format!("failed to read image {:?}", image))?;

    let uploads_dir = match &config.storage.uploads_dir {
        Some(dir) => dir.clone(),
        None => storage::get_data_dir()?.join("uploads"),
    };
    let upload = storage::store_upload(&image_bytes, &uploads_dir)?;

    let detector = HttpDetector::new(
        config.detector.endpoint.clone(),
        Duration::from_secs(config.detector.timeout_secs),
    )?;
    let generator = build_generator(config)?;
    let generator_ref = generator.as_ref().map(|g| g as &dyn TextGenerator);
    let pipeline = DetectionPipeline::new(config, &detector, generator_ref);

    let store = if no_store {
        None
    } else {
        Some(open_store(config)?)
    };

    let outcome = pipeline.process_image(&image_bytes, &upload.url, store.as_ref())?;
    print_outcome(&outcome);

    if let Some(err) = &outcome.persistence_error {
        // Results above were still delivered; the record just isn't durable.
        anyhow::bail!("detection record could not be stored: {err}");
    }

    Ok(())
}

fn run_list(config: &AppConfig, limit: usize) -> Result<()> {
    let store = open_store(config)?;
    let records = store.list(limit)?;

    if records.is_empty() {
        println!("No detection records stored yet.");
        return Ok(());
    }

    for record in records {
        println!(
            "[{}] {} - {} objects at {}",
            record.id.unwrap_or_default(),
            record.image_url,
            record.objects.len(),
            record.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        );
    }

    Ok(())
}

fn run_show(config: &AppConfig, id: i64) -> Result<()> {
    let store = open_store(config)?;
    let record = store.get(id)?;
    let stats = pipeline::record::compute_stats(&record.objects, &config.pipeline.priority_labels);

    print_record(&record, &stats);

    let messages = store.list_messages(id)?;
    if !messages.is_empty() {
        println!("\nChat log:");
        for message in messages {
            println!("  [{}] {}", message.role.as_str(), message.content);
        }
    }

    Ok(())
}

fn run_annotate(config: &AppConfig, label: &str, issue: Option<&str>) -> Result<()> {
    let detector = HttpDetector::new(
        config.detector.endpoint.clone(),
        Duration::from_secs(config.detector.timeout_secs),
    )?;
    let generator = build_generator(config)?;
    let generator_ref = generator.as_ref().map(|g| g as &dyn TextGenerator);
    let pipeline = DetectionPipeline::new(config, &detector, generator_ref);

    println!("{}", pipeline.annotate_component(label, issue));

    Ok(())
}

fn run_chat(config: &AppConfig, id: i64, message: &str) -> Result<()> {
    let store = open_store(config)?;
    let generator = build_generator(config)?;
    let generator_ref = generator.as_ref().map(|g| g as &dyn TextGenerator);

    let service = ChatService::new(
        &store,
        generator_ref,
        Duration::from_secs(config.generation.timeout_secs),
        config.generation.max_tokens,
    );

    let reply = service.send(id, message, &config.pipeline.priority_labels)?;
    println!("{}", reply.content);

    Ok(())
}

fn print_outcome(outcome: &ScanOutcome) {
    print_record(&outcome.record, &outcome.stats);

    match outcome.record.id {
        Some(id) => println!("\nStored as record {id}"),
        None => println!("\nRecord not stored"),
    }
}

fn print_record(record: &DetectionRecord, stats: &DetectionStats) {
    println!(
        "{} ({}x{}) - {} objects",
        record.image_url, record.image_width, record.image_height, stats.total_objects
    );

    for (index, object) in record.objects.iter().enumerate() {
        println!(
            "  {}. {} ({:.0}%) - {}",
            index + 1,
            object.label,
            object.confidence * 100.0,
            object.context
        );
        if let Some(issue) = &object.issue {
            println!("     issue: {issue}");
        }
    }

    if stats.total_objects > 0 {
        println!("Average confidence: {:.0}%", stats.average_confidence * 100.0);
        println!("Priority equipment: {}", stats.priority_objects_detected);
        if let Some(best) = &stats.highest_confidence_object {
            println!("Strongest detection: {} ({:.0}%)", best.label, best.confidence * 100.0);
        }
    }
}
