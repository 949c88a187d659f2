use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use rx_lens_core::{
    open_chat, open_pharmacy_finder, ChatTurn, Config, Coordinates, Pipeline, PharmacyFinder,
    RawImage,
};

#[derive(Parser)]
#[command(name = "rx-lens")]
#[command(about = "Prescription image resolution and medication tracking")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a prescription image (png, jpg, jpeg, pdf)
    Process {
        image: PathBuf,
        /// Prescription date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Look up brand alternatives and store them
    Alternatives {
        /// Drug names
        #[arg(required_unless_present = "text", conflicts_with = "text")]
        drugs: Vec<String>,
        /// Free prescription text to pull drug names from
        #[arg(long)]
        text: Option<String>,
    },
    /// Show stored alternatives for one drug
    AlternativesFor { drug: String },
    /// List stored records
    List { kind: RecordKind },
    /// Mark a reminder completed
    CompleteReminder { id: u64 },
    /// Delete a reminder
    DeleteReminder { id: u64 },
    /// Delete a medication from the catalog
    DeleteMedication { id: u64 },
    /// Ask the assistant a question
    Chat {
        message: String,
        /// JSON file holding the history returned by an earlier reply
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Find pharmacies near a position
    Pharmacies {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RecordKind {
    Prescriptions,
    Medications,
    Reminders,
    Alternatives,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rx_lens=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("reading configuration")?;

    match cli.command {
        Commands::Process { image, date } => {
            let pipeline = Pipeline::from_config(&config)?;
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let upload = RawImage::new(&image.to_string_lossy(), bytes);
            let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            info!(image = %image.display(), %date, "Processing prescription");
            print_json(&pipeline.process_upload(&upload, date)?)?;
        }
        Commands::Alternatives { drugs, text } => {
            let pipeline = Pipeline::from_config(&config)?;
            let found = match text {
                Some(text) => pipeline.resolve_alternatives_in_text(&text)?,
                None => pipeline.resolve_alternatives(&drugs)?,
            };
            print_json(&found)?;
        }
        Commands::AlternativesFor { drug } => {
            let records = config.open_records()?;
            print_json(&json!({ "drug": drug, "brands": records.alternatives_for(&drug)? }))?;
        }
        Commands::List { kind } => {
            let records = config.open_records()?;
            match kind {
                RecordKind::Prescriptions => print_json(&records.prescriptions()?)?,
                RecordKind::Medications => print_json(&records.medications()?)?,
                RecordKind::Reminders => print_json(&records.reminders()?)?,
                RecordKind::Alternatives => print_json(&records.alternatives()?)?,
            }
        }
        Commands::CompleteReminder { id } => {
            let records = config.open_records()?;
            report("Reminder", id, records.complete_reminder(id)?)?;
        }
        Commands::DeleteReminder { id } => {
            let records = config.open_records()?;
            report("Reminder", id, records.delete_reminder(id)?)?;
        }
        Commands::DeleteMedication { id } => {
            let records = config.open_records()?;
            report("Medication", id, records.delete_medication(id)?)?;
        }
        Commands::Chat { message, history } => {
            let session = open_chat(&config)?;
            let history = match history {
                Some(path) => read_history(&path)?,
                None => Vec::new(),
            };
            print_json(&session.send(&message, history)?)?;
        }
        Commands::Pharmacies { lat, lon } => {
            let finder = open_pharmacy_finder(&config)?;
            print_json(&finder.nearby(Coordinates::new(lat, lon)?)?)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_history(path: &Path) -> Result<Vec<ChatTurn>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing chat history {}", path.display()))
}

fn report(kind: &str, id: u64, found: bool) -> Result<()> {
    if !found {
        bail!("{} {} not found", kind, id);
    }
    print_json(&json!({ "status": "success", "id": id }))
}
