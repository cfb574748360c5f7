use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stimdedup::config::PipelineConfig;
use stimdedup::core::{Frame, ManualOverrideTable, MeanPoolProvider, VideoAsset};
use stimdedup::services::{PipelinePhase, SubjectPipeline};
use tokio::sync::mpsc;

/// One video as stored in the corpus file: row-major frames of a fixed shape.
#[derive(Serialize, Deserialize, Debug)]
struct CorpusVideo {
    id: String,
    subject_id: String,
    rows: usize,
    cols: usize,
    frames: Vec<Vec<f32>>,
}

#[derive(Parser, Debug)]
#[command(name = "stimdedup", version, about = "Deduplicate stimulus video corpora")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full pipeline and write per-subject metadata
    Run {
        /// Corpus JSON file
        #[arg(short, long, value_name = "FILE")]
        corpus: PathBuf,
        /// Manual override table (JSON list of entries)
        #[arg(long, value_name = "FILE")]
        overrides: Option<PathBuf>,
        /// Pipeline configuration (JSON); defaults to reference thresholds
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Directory for combined_metadata_<subject>.json files
        #[arg(short, long, value_name = "DIR")]
        out: PathBuf,
    },

    /// Summarize a corpus file without running the pipeline
    Inspect {
        /// Corpus JSON file
        #[arg(short, long, value_name = "FILE")]
        corpus: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            corpus,
            overrides,
            config,
            out,
        } => {
            let config = load_config(config.as_deref())?;
            let overrides = load_overrides(overrides.as_deref())?;
            let subjects = load_corpus(&corpus)?;
            println!(
                "▶ Loaded {} subject(s) from {}",
                subjects.len(),
                corpus.display()
            );

            fs::create_dir_all(&out)
                .with_context(|| format!("Failed to create output directory {:?}", out))?;

            let provider = Arc::new(MeanPoolProvider::new(config.embedding_dimension));
            let (tx, rx) = mpsc::unbounded_channel();
            let pipeline = SubjectPipeline::new(config, provider)
                .with_overrides(overrides)
                .with_progress_sender(tx);

            let spinner = spawn_progress_spinner(rx);
            let reports = benchmark("pipeline", || pipeline.run_all(&subjects))?;
            drop(pipeline);
            if let Ok(spinner) = spinner.join() {
                spinner.finish_with_message("Pipeline complete");
            }

            for report in &reports {
                let summary = report.metadata.summary();
                println!(
                    "\n✨ Subject {}: {} video(s), {} unique, {} repeated",
                    report.subject_id, summary.total, summary.unique, summary.repeated
                );
                for warning in &report.warnings {
                    eprintln!("   ⚠️  {:?}", warning);
                }

                let path = out.join(format!("combined_metadata_{}.json", report.subject_id));
                let json = report
                    .metadata
                    .to_json()
                    .with_context(|| format!("Failed to serialize metadata for {}", report.subject_id))?;
                fs::write(&path, json)
                    .with_context(|| format!("Failed to write {:?}", path))?;
                println!("   💾 Wrote {}", path.display());
            }

            println!("\n✅ Wrote {} metadata file(s) to {}", reports.len(), out.display());
        }

        Commands::Inspect { corpus } => {
            let subjects = load_corpus(&corpus)?;
            println!("🗂️  Corpus {}:", corpus.display());
            let mut total = 0;
            for (subject_id, videos) in &subjects {
                let frames: usize = videos.iter().map(|v| v.frame_count()).sum();
                println!(
                    "   {} → {} video(s), {} valid frame(s)",
                    subject_id,
                    videos.len(),
                    frames
                );
                total += videos.len();
            }
            println!("   {} video(s) across {} subject(s)", total, subjects.len());
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {:?}", path))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse config file {:?}", path))
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn load_overrides(path: Option<&Path>) -> Result<ManualOverrideTable> {
    match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read override file {:?}", path))?;
            ManualOverrideTable::from_json_str(&raw)
                .with_context(|| format!("Invalid override table {:?}", path))
        }
        None => Ok(ManualOverrideTable::default()),
    }
}

/// Loads the corpus file and groups validated videos by subject.
fn load_corpus(path: &Path) -> Result<BTreeMap<String, Vec<VideoAsset>>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus file {:?}", path))?;
    let entries: Vec<CorpusVideo> =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse corpus {:?}", path))?;

    let mut subjects: BTreeMap<String, Vec<VideoAsset>> = BTreeMap::new();
    for entry in entries {
        let frames = entry
            .frames
            .into_iter()
            .enumerate()
            .map(|(index, data)| {
                Frame::new(entry.rows, entry.cols, data).with_context(|| {
                    format!(
                        "Video {} frame {} does not match {}x{}",
                        entry.id, index, entry.rows, entry.cols
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let video = VideoAsset::new(entry.id, entry.subject_id, frames)?;
        subjects.entry(video.subject_id.clone()).or_default().push(video);
    }

    Ok(subjects)
}

/// Drains pipeline progress on a separate thread and feeds an indicatif
/// spinner. Returns the spinner so the caller can finish it after join.
fn spawn_progress_spinner(
    mut rx: mpsc::UnboundedReceiver<stimdedup::services::PipelineProgress>,
) -> std::thread::JoinHandle<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));

    std::thread::spawn(move || {
        while let Some(progress) = rx.blocking_recv() {
            let message = match progress.phase {
                PipelinePhase::Complete => "Finalizing metadata…".to_string(),
                _ => format!(
                    "{:?}: {} ({}/{})",
                    progress.phase, progress.current, progress.processed, progress.total
                ),
            };
            spinner.set_message(message);
        }
        spinner
    })
}

/// Run `f()`, print how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    println!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
