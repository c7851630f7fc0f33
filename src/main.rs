use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tax_revenue::config::{parse_precision, AppConfig, PipelineConfig};
use tax_revenue::error::AppError;
use tax_revenue::etl::gold::{GoldManifest, GoldStore};
use tax_revenue::etl::{self, bronze};
use tax_revenue::telemetry;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "tax-etl",
    about = "Build and inspect the Bronze/Silver/Gold tax revenue dataset",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate Bronze, rebuild Silver and publish a new Gold generation
    Run(RunArgs),
    /// Replace the Bronze extract with a downloaded file and record its metadata
    Import(ImportArgs),
    /// Show the published Gold generation
    Status(StatusArgs),
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Bronze extract to read (defaults to ETL_BRONZE_PATH)
    #[arg(long)]
    bronze: Option<PathBuf>,
    /// Silver table to write (defaults to ETL_SILVER_PATH)
    #[arg(long)]
    silver: Option<PathBuf>,
    /// Gold store directory (defaults to ETL_GOLD_DIR)
    #[arg(long)]
    gold_dir: Option<PathBuf>,
    /// Decimals kept on composition shares, 0 to 4 (defaults to ETL_SHARE_PRECISION)
    #[arg(long, value_parser = parse_precision)]
    precision: Option<u32>,
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Downloaded CSV extract
    #[arg(long = "from")]
    source: PathBuf,
    /// Human-readable description of the upstream query
    #[arg(long)]
    query: String,
    /// Bronze location to overwrite (defaults to ETL_BRONZE_PATH)
    #[arg(long)]
    bronze: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct StatusArgs {
    /// Gold store directory (defaults to ETL_GOLD_DIR)
    #[arg(long)]
    gold_dir: Option<PathBuf>,
    /// Print the raw manifest as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(err) = run_cli() {
        eprintln!("application error: {err} [{}]", err.kind());
        std::process::exit(1);
    }
}

fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let lines = match cli.command {
        Command::Run(args) => run_pipeline(config.pipeline, args)?,
        Command::Import(args) => import_extract(config.pipeline, args)?,
        Command::Status(args) => status(config.pipeline, args)?,
    };
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

fn run_pipeline(mut pipeline: PipelineConfig, args: RunArgs) -> Result<Vec<String>, AppError> {
    if let Some(bronze) = args.bronze {
        pipeline.bronze_path = bronze;
    }
    if let Some(silver) = args.silver {
        pipeline.silver_path = silver;
    }
    if let Some(gold_dir) = args.gold_dir {
        pipeline.gold_dir = gold_dir;
    }
    if let Some(precision) = args.precision {
        pipeline.share_precision = precision;
    }

    let manifest = etl::run(&pipeline)?;
    let mut lines = vec![format!(
        "Published Gold generation {} to {}",
        manifest.generation,
        pipeline.gold_dir.display()
    )];
    lines.extend(describe_manifest(&manifest));
    Ok(lines)
}

fn import_extract(mut pipeline: PipelineConfig, args: ImportArgs) -> Result<Vec<String>, AppError> {
    if let Some(bronze) = args.bronze {
        pipeline.bronze_path = bronze;
    }

    let metadata = bronze::import_extract(
        &args.source,
        &pipeline.bronze_path,
        &pipeline.bronze_meta_path(),
        &args.query,
        Utc::now(),
    )?;
    info!(source = %args.source.display(), "bronze import finished");

    Ok(vec![
        format!(
            "Imported {} into {}",
            args.source.display(),
            pipeline.bronze_path.display()
        ),
        format!("Snapshot timestamp: {}", metadata.snapshot_timestamp),
        format!("Query: {}", metadata.query_description),
    ])
}

fn status(pipeline: PipelineConfig, args: StatusArgs) -> Result<Vec<String>, AppError> {
    let gold_dir = args.gold_dir.unwrap_or(pipeline.gold_dir);
    let store = GoldStore::new(&gold_dir, pipeline.gold_retain);

    let Some(manifest) = store.manifest()? else {
        return Ok(vec![format!(
            "Gold dataset not yet built in {}",
            gold_dir.display()
        )]);
    };

    if args.json {
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
        return Ok(vec![json]);
    }
    Ok(describe_manifest(&manifest))
}

fn describe_manifest(manifest: &GoldManifest) -> Vec<String> {
    let mut lines = vec![
        format!("Generation: {}", manifest.generation),
        format!("Built at: {}", manifest.built_at),
    ];
    match manifest.snapshot_timestamp {
        Some(snapshot) => lines.push(format!("Bronze snapshot: {snapshot}")),
        None => lines.push("Bronze snapshot: unknown".to_string()),
    }
    if let Some(query) = &manifest.query_description {
        lines.push(format!("Query: {query}"));
    }
    let stats = &manifest.stats;
    lines.push(format!(
        "Rows: bronze {}, silver {}, tax_to_gdp {}, composition {} ({} country-years, shares at {} decimals)",
        stats.bronze_rows,
        stats.silver_rows,
        stats.tax_to_gdp_rows,
        stats.composition_rows,
        stats.groups,
        manifest.share_precision
    ));
    lines
}
