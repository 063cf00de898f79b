// ringscan CLI - run the fraud-network engine over configured datasets

mod exit_codes;
mod load;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use ringscan_engine::{Engine, Report, RiskLevel};

use exit_codes::{EXIT_ERROR, EXIT_FINDINGS, EXIT_INPUT, EXIT_INVALID_CONFIG, EXIT_SUCCESS};
use load::{load_datasets, ScanConfig, ScanError};

#[derive(Parser)]
#[command(name = "ringscan")]
#[command(about = "Entity resolution and anomaly scoring over public-record datasets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load datasets, analyze them and report risk assessments
    #[command(after_help = "\
Examples:
  ringscan run scan.toml
  ringscan run scan.toml --json
  ringscan run scan.toml --output report.json --top 25
  ringscan run scan.toml --fail-on high")]
    Run {
        /// Path to the scan .toml file
        config: PathBuf,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Number of ranked records in the human summary
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Exit with code 5 when any record reaches this level
        #[arg(long, value_enum)]
        fail_on: Option<LevelArg>,
    },

    /// Validate a scan config without loading data
    #[command(after_help = "\
Examples:
  ringscan validate scan.toml")]
    Validate {
        /// Path to the scan .toml file
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LevelArg {
    Low,
    Moderate,
    High,
    Critical,
}

impl From<LevelArg> for RiskLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Low => RiskLevel::Low,
            LevelArg::Moderate => RiskLevel::Moderate,
            LevelArg::High => RiskLevel::High,
            LevelArg::Critical => RiskLevel::Critical,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            json,
            output,
            top,
            fail_on,
        } => cmd_run(config, json, output, top, fail_on.map(RiskLevel::from)),
        Commands::Validate { config } => cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            hint: None,
        }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ScanError> for CliError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Config(_) => CliError::new(EXIT_INVALID_CONFIG, err.to_string()),
            ScanError::MissingColumn { .. } => CliError::new(EXIT_INPUT, err.to_string())
                .with_hint("check [datasets.<name>.columns] against the file header"),
            ScanError::Io(_) | ScanError::Parse(_) => CliError::new(EXIT_INPUT, err.to_string()),
        }
    }
}

// ============================================================================
// validate
// ============================================================================

fn read_scan(config_path: &Path) -> Result<ScanConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        CliError::new(
            EXIT_INVALID_CONFIG,
            format!("cannot read config {}: {e}", config_path.display()),
        )
    })?;
    Ok(ScanConfig::from_toml(&config_str)?)
}

fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let scan = read_scan(&config_path)?;
    eprintln!(
        "config OK: '{}', {} dataset(s), {} cross reference(s)",
        scan.engine.name,
        scan.datasets.len(),
        scan.engine.cross_refs.len()
    );
    Ok(())
}

// ============================================================================
// run
// ============================================================================

fn cmd_run(
    config_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
    top: usize,
    fail_on: Option<RiskLevel>,
) -> Result<(), CliError> {
    let scan = read_scan(&config_path)?;

    // Resolve dataset paths relative to the config file's directory
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let records = load_datasets(&scan, base_dir)?;
    info!("loaded {} records from {} dataset(s)", records.len(), scan.datasets.len());

    let engine = Engine::new(scan.engine).map_err(|e| CliError::new(EXIT_INVALID_CONFIG, e.to_string()))?;
    let report = engine.analyze(&records);

    let json_str = serde_json::to_string_pretty(&report)
        .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::new(EXIT_ERROR, format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    } else {
        print_summary(&report, top);
    }

    if let Some(threshold) = fail_on {
        let flagged = report.assessments.iter().filter(|a| a.level >= threshold).count();
        if flagged > 0 {
            return Err(CliError::new(
                EXIT_FINDINGS,
                format!("{flagged} record(s) at or above {threshold}"),
            ));
        }
    }

    Ok(())
}

/// Human summary to stderr.
fn print_summary(report: &Report<'_>, top: usize) {
    let s = &report.summary;
    eprintln!(
        "{}: {} records scored, {} groups, {} bursts, {} cross matches",
        report.meta.config_name, s.records_scored, s.total_groups, s.bursts, s.cross_matches,
    );

    let levels: Vec<String> = [RiskLevel::Critical, RiskLevel::High, RiskLevel::Moderate, RiskLevel::Low]
        .iter()
        .map(|level| format!("{} {}", s.level_counts.get(level).copied().unwrap_or(0), level))
        .collect();
    eprintln!("levels: {}", levels.join(", "));

    for a in report.ranked().into_iter().take(top).filter(|a| a.score > 0) {
        let flags: Vec<&str> = a.flags.iter().map(|f| f.kind.as_str()).collect();
        eprintln!(
            "  {:>4}  {:<8}  {}:{}  {}",
            a.score,
            a.level.to_string(),
            a.record_kind,
            a.record_id,
            flags.join(",")
        );
    }
}
