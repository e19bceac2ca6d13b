//! casepivot CLI - seven-day pivot of daily case/death reports
//!
//! # Main Commands
//!
//! ```bash
//! casepivot pivot us-counties.csv            # CSV in, one 22-column row per state out
//! casepivot pivot in.csv --key county -o out.json --format json
//! casepivot serve                            # Start HTTP server (port 3000)
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! casepivot parse in.csv                     # Typed rows as JSON
//! casepivot aggregate in.csv --key fips      # Per-(key, date) observations
//! casepivot group groups.json                # Pivot already-grouped JSON
//! ```

use clap::{Args, Parser, Subcommand};
use casepivot::{
    aggregate, config::port_from_env, log_info, log_info_indent, log_success, log_warning,
    parse_csv_file_auto, pivot_entry_groups, run_file, set_quiet, write_json_value,
    write_outcome, GroupKey, InvalidKeyPolicy, KeyGroupEntry, OutputFormat, PipelineConfig,
    PipelineError, PipelineOutcome, DEFAULT_PORT,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "casepivot")]
#[command(about = "Pivot daily per-region case/death reports into seven-day windows", long_about = None)]
struct Cli {
    /// Only print errors on stderr
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: CSV to one flat seven-day record per key
    Pivot {
        /// Input CSV file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Parse a CSV file and output typed rows as JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// Key column the rows must carry
        #[arg(short, long, value_enum)]
        key: Option<GroupKey>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Sum rows into one observation per (key, date)
    Aggregate {
        /// Input CSV file
        input: PathBuf,

        #[arg(short, long, value_enum)]
        key: Option<GroupKey>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Pivot already-grouped JSON: `[{"key", "observations": [{date, cases, deaths}]}]`
    Group {
        /// Input JSON file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: CASEPIVOT_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        #[command(flatten)]
        run: RunArgs,
    },
}

/// Pipeline knobs; each one overrides its `CASEPIVOT_*` variable.
#[derive(Args)]
struct RunArgs {
    /// Column to group by
    #[arg(short, long, value_enum)]
    key: Option<GroupKey>,

    /// Worker threads for the pivot stage
    #[arg(short, long)]
    workers: Option<usize>,

    /// Quarantine keys that fail instead of aborting
    #[arg(long)]
    skip_invalid: bool,

    /// Skip window validation
    #[arg(long)]
    no_validate: bool,
}

impl RunArgs {
    fn config(&self) -> Result<PipelineConfig, PipelineError> {
        let mut config = PipelineConfig::from_env()?;
        if let Some(key) = self.key {
            config.group_key = key;
        }
        if self.workers.is_some() {
            config.workers = self.workers;
        }
        if self.skip_invalid {
            config.invalid_key_policy = InvalidKeyPolicy::Skip;
        }
        if self.no_validate {
            config.validate = false;
        }
        config.check()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    set_quiet(cli.quiet);

    let result = match cli.command {
        Commands::Pivot {
            input,
            output,
            format,
            run,
        } => cmd_pivot(&input, output.as_deref(), format, &run),

        Commands::Parse { input, key, output } => cmd_parse(&input, key, output.as_deref()),

        Commands::Aggregate { input, key, output } => cmd_aggregate(&input, key, output.as_deref()),

        Commands::Group {
            input,
            output,
            format,
            run,
        } => cmd_group(&input, output.as_deref(), format, &run),

        Commands::Serve { port, run } => cmd_serve(port, &run).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_pivot(
    input: &Path,
    output: Option<&Path>,
    format: OutputFormat,
    run: &RunArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = run.config()?;
    let outcome = run_file(input, &config)?;
    report(&outcome);
    write_outcome(&outcome, format, output)?;
    written(output);
    Ok(())
}

fn cmd_parse(input: &Path, key: Option<GroupKey>, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let key = resolve_key(key)?;
    let result = parse_csv_file_auto(input, key)?;

    if !result.row_errors.is_empty() {
        log_warning(format!("{} rows skipped", result.row_errors.len()));
        for err in result.row_errors.iter().take(5) {
            log_info_indent(err.to_string(), 1);
        }
    }
    if !result.cell_warnings.is_empty() {
        log_warning(format!("{} cells read as null", result.cell_warnings.len()));
    }
    log_success(format!("Parsed {} rows", result.rows.len()));

    write_json_value(&result.rows, output)?;
    written(output);
    Ok(())
}

fn cmd_aggregate(
    input: &Path,
    key: Option<GroupKey>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = resolve_key(key)?;
    let result = parse_csv_file_auto(input, key)?;
    let observations = aggregate(&result.rows, key);
    log_success(format!(
        "{} rows → {} observations by {}",
        result.rows.len(),
        observations.len(),
        key.column_name()
    ));

    write_json_value(&observations, output)?;
    written(output);
    Ok(())
}

fn cmd_group(
    input: &Path,
    output: Option<&Path>,
    format: OutputFormat,
    run: &RunArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = run.config()?;
    let content = fs::read_to_string(input)?;
    let groups: Vec<KeyGroupEntry> = serde_json::from_str(&content).map_err(PipelineError::from)?;
    log_info(format!("📦 {} groups", groups.len()));

    let outcome = pivot_entry_groups(groups, &config)?;
    report(&outcome);
    write_outcome(&outcome, format, output)?;
    written(output);
    Ok(())
}

async fn cmd_serve(port: Option<u16>, run: &RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = run.config()?;
    let port = port.or_else(port_from_env).unwrap_or(DEFAULT_PORT);
    casepivot::server::start_server(port, config).await
}

/// `--key`, else `CASEPIVOT_KEY`, else the default.
fn resolve_key(key: Option<GroupKey>) -> Result<GroupKey, PipelineError> {
    match key {
        Some(key) => Ok(key),
        None => Ok(PipelineConfig::from_env()?.group_key),
    }
}

fn report(outcome: &PipelineOutcome) {
    log_info("📊 Summary");
    log_info_indent(format!("Keys pivoted:    {}", outcome.records.len()), 1);
    log_info_indent(format!("Quarantined:     {}", outcome.quarantined.len()), 1);
    log_info_indent(format!("Rows skipped:    {}", outcome.row_errors.len()), 1);
    log_info_indent(format!("Cells nulled:    {}", outcome.cell_warnings.len()), 1);
    log_info_indent(format!("Invalid windows: {}", outcome.validation_errors.len()), 1);
}

fn written(path: Option<&Path>) {
    if let Some(p) = path {
        log_success(format!("💾 Output written to: {}", p.display()));
    }
}
