//! Cadence - self-calibrating tempo, key and loudness analyzer
//!
//! Command line front end: analyze files, manage ground truth, and run
//! calibration against the persisted profile.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cadence_calibration::{
    AnalysisResult, BatchAnalyzer, BatchProgress, CalibratedAnalyzer, Calibrator, GroundTruth,
    GroundTruthEntry, RawAnalyzer, SharedProfile,
};
use cadence_library::{
    expand_paths, AnalyzerConfig, KeyValueStore, ScanConfig, SqliteStore, SymphoniaDecoder,
};

/// Store key of the accumulated ground truth document
const GROUND_TRUTH_KEY: &str = "ground_truth";

#[derive(Parser)]
#[command(name = "cadence", version, about = "Self-calibrating tempo, key and loudness analyzer")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database holding the calibration profile
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze audio files or directories
    Analyze {
        /// Files or directories to analyze
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Skip calibration and print raw detector output
        #[arg(long)]
        raw: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Number of parallel workers (0 = one per core)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,
    },

    /// Add one ground truth track
    Add {
        /// Audio file with known values
        path: PathBuf,

        /// True tempo
        #[arg(long)]
        bpm: f32,

        /// True key (e.g. "Am", "F# major", "8A")
        #[arg(long)]
        key: String,

        /// True integrated loudness
        #[arg(long)]
        lufs: Option<f32>,

        #[arg(long)]
        genre: Option<String>,
    },

    /// Import a ground truth exchange document
    Import {
        /// JSON document written by `export`
        file: PathBuf,
    },

    /// Export the stored ground truth
    Export {
        /// Output file (stdout when omitted)
        out: Option<PathBuf>,
    },

    /// Learn a correction profile from the stored ground truth
    Calibrate {
        /// Additional ground truth document to import first
        #[arg(long)]
        ground_truth: Option<PathBuf>,
    },

    /// Show the current calibration status
    Status,

    /// Restore the default profile and forget all ground truth
    Reset,

    /// Show the effective configuration
    Config {
        /// Write a default config file if none exists yet
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Config { init } = cli.command {
        return config_command(cli.config.as_deref(), init);
    }

    let config = match &cli.config {
        Some(path) => AnalyzerConfig::load_from(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => AnalyzerConfig::load(),
    };

    let store_path = cli.store.clone().unwrap_or_else(|| config.store_path.clone());
    info!("Store: {}", store_path.display());
    let store: Arc<dyn KeyValueStore> =
        Arc::new(SqliteStore::open(&store_path).context("Failed to open store")?);

    match cli.command {
        Commands::Analyze {
            paths,
            raw,
            json,
            jobs,
        } => analyze(&config, store, &paths, raw, json, jobs),

        Commands::Add {
            path,
            bpm,
            key,
            lufs,
            genre,
        } => {
            let mut entry = GroundTruthEntry::new(path.to_string_lossy(), bpm, key);
            if let Some(lufs) = lufs {
                entry = entry.with_lufs(lufs);
            }
            if let Some(genre) = genre {
                entry = entry.with_genre(genre);
            }

            let mut ground_truth = load_ground_truth(store.as_ref())?;
            if !ground_truth.add(entry) {
                anyhow::bail!("Ground truth needs a path, a positive tempo and a key");
            }
            save_ground_truth(store.as_ref(), &ground_truth)?;
            println!("{} ground truth tracks stored", ground_truth.len());
            Ok(())
        }

        Commands::Import { file } => {
            let mut ground_truth = load_ground_truth(store.as_ref())?;
            let imported = import_file(&mut ground_truth, &file)?;
            save_ground_truth(store.as_ref(), &ground_truth)?;
            println!(
                "Imported {} tracks ({} stored)",
                imported,
                ground_truth.len()
            );
            Ok(())
        }

        Commands::Export { out } => {
            let json = load_ground_truth(store.as_ref())?.export_json()?;
            match out {
                Some(path) => {
                    fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Wrote {}", path.display());
                }
                None => println!("{}", json),
            }
            Ok(())
        }

        Commands::Calibrate { ground_truth } => {
            let mut stored = load_ground_truth(store.as_ref())?;
            if let Some(file) = ground_truth {
                import_file(&mut stored, &file)?;
                save_ground_truth(store.as_ref(), &stored)?;
            }

            let profile = SharedProfile::load(store.as_ref());
            let calibrator = Calibrator::new(Arc::clone(&store), profile)
                .with_min_entries(config.min_ground_truth);
            calibrator.import_ground_truth(stored.entries().to_vec());

            let raw = RawAnalyzer::from_config(decoder(&config), &config);
            calibrator
                .calibrate(&raw)
                .context("Calibration failed")?;
            println!("{}", serde_json::to_string_pretty(&calibrator.status())?);
            Ok(())
        }

        Commands::Status => {
            let profile = SharedProfile::load(store.as_ref()).snapshot();
            println!("{}", serde_json::to_string_pretty(&profile.status())?);
            Ok(())
        }

        // Handled before the store is opened
        Commands::Config { .. } => Ok(()),

        Commands::Reset => {
            let profile = SharedProfile::load(store.as_ref());
            let calibrator = Calibrator::new(Arc::clone(&store), profile);
            calibrator.reset().context("Reset failed")?;
            save_ground_truth(store.as_ref(), &GroundTruth::new())?;
            println!("Calibration reset");
            Ok(())
        }
    }
}

fn config_command(path: Option<&Path>, init: bool) -> Result<()> {
    let path = path.map_or_else(AnalyzerConfig::config_path, Path::to_path_buf);

    if init {
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }
        AnalyzerConfig::default()
            .save_to(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let config = if path.exists() {
        AnalyzerConfig::load_from(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?
    } else {
        AnalyzerConfig::default()
    };
    println!("# {}", path.display());
    println!("{:#?}", config);
    Ok(())
}

fn decoder(config: &AnalyzerConfig) -> Arc<SymphoniaDecoder> {
    Arc::new(SymphoniaDecoder::with_sample_rate(config.sample_rate))
}

fn analyze(
    config: &AnalyzerConfig,
    store: Arc<dyn KeyValueStore>,
    paths: &[PathBuf],
    raw: bool,
    json: bool,
    jobs: usize,
) -> Result<()> {
    let files = expand_paths(paths, &ScanConfig::default());
    if files.is_empty() {
        anyhow::bail!("No audio files found");
    }

    let profile = if raw {
        SharedProfile::default()
    } else {
        SharedProfile::load(store.as_ref())
    };
    let analyzer = CalibratedAnalyzer::new(
        Arc::new(RawAnalyzer::from_config(decoder(config), config)),
        profile,
    );
    let mut batch = BatchAnalyzer::new(analyzer);
    if jobs > 0 {
        batch = batch.with_max_threads(jobs);
    }

    let (tx, rx) = crossbeam_channel::unbounded();
    let progress = std::thread::spawn(move || {
        for event in rx {
            if let BatchProgress::Analyzed {
                current,
                total,
                path,
                ..
            } = event
            {
                info!("[{}/{}] {}", current, total, path.display());
            }
        }
    });
    let items = batch.analyze_all(files, Some(tx));
    let _ = progress.join();

    if json {
        let documents: Vec<serde_json::Value> = items
            .iter()
            .map(|item| {
                serde_json::json!({
                    "path": item.path,
                    "result": item.result,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&documents)?);
    } else {
        for item in &items {
            println!("{}  {}", item.path.display(), describe(&item.result));
        }
    }
    Ok(())
}

fn describe(result: &AnalysisResult) -> String {
    if let Some(error) = &result.error {
        return format!("error: {}", error);
    }

    let bpm = result
        .bpm
        .map_or_else(|| "--- BPM".to_string(), |b| format!("{} BPM", b));
    let key = match (&result.key, &result.camelot) {
        (Some(key), Some(camelot)) => format!("{} ({})", key, camelot),
        (Some(key), None) => key.clone(),
        _ => "no key".to_string(),
    };
    let lufs = result
        .lufs
        .map_or_else(|| "--- LUFS".to_string(), |l| format!("{:.1} LUFS", l));
    format!("{:>8}  {:<10}  {}", bpm, key, lufs)
}

fn load_ground_truth(store: &dyn KeyValueStore) -> Result<GroundTruth> {
    let mut ground_truth = GroundTruth::new();
    if let Some(json) = store.get(GROUND_TRUTH_KEY)? {
        ground_truth
            .import_json(&json)
            .context("Stored ground truth is corrupt")?;
    }
    Ok(ground_truth)
}

fn save_ground_truth(store: &dyn KeyValueStore, ground_truth: &GroundTruth) -> Result<()> {
    store.set(GROUND_TRUTH_KEY, &ground_truth.export_json()?)?;
    Ok(())
}

fn import_file(ground_truth: &mut GroundTruth, file: &Path) -> Result<usize> {
    let json = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    ground_truth
        .import_json(&json)
        .with_context(|| format!("{} is not a ground truth document", file.display()))
}
