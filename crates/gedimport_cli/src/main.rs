//! `gedimport` command-line entry point.
//!
//! # Responsibility
//! - Map flags and `GEDIMPORT_*` variables onto `ImportOptions`.
//! - Run one import and print the final run record as JSON.
//! - List stored import runs.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use gedimport_core::db::open_db;
use gedimport_core::{
    default_log_level, init_logging, DatasetId, ImportCoordinator, ImportOptions, ImportRun,
    MemoryAuditLog, MemoryImportStore, RunStatus, SqliteImportRunRepository, SqliteImportStore,
};
use log::info;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "gedimport")]
#[command(about = "Import GEDCOM genealogy files into a SQLite dataset")]
#[command(version)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, default_value = "gedimport.db", env = "GEDIMPORT_DB")]
    db: PathBuf,

    /// Directory for rolling log files; logging is off when unset
    #[arg(long, global = true, env = "GEDIMPORT_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// trace|debug|info|warn|error
    #[arg(long, global = true, env = "GEDIMPORT_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import one GEDCOM file
    Import(ImportArgs),
    /// Print stored import runs, newest first
    Runs {
        /// Only runs for this dataset
        #[arg(long, env = "GEDIMPORT_DATASET")]
        dataset: Option<String>,
    },
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// GEDCOM file to import
    file: PathBuf,

    /// Target dataset identifier
    #[arg(long, env = "GEDIMPORT_DATASET")]
    dataset: String,

    /// JSON file with import options; flags override it
    #[arg(long, env = "GEDIMPORT_OPTIONS")]
    options: Option<PathBuf>,

    /// Drop failing records instead of aborting the run
    #[arg(long, env = "GEDIMPORT_TOLERANT")]
    tolerant: bool,

    /// Skip SOUR records and citations
    #[arg(long, env = "GEDIMPORT_NO_SOURCES")]
    no_sources: bool,

    /// Skip OBJE records
    #[arg(long, env = "GEDIMPORT_NO_MEDIA")]
    no_media: bool,

    /// Records per storage batch
    #[arg(long, env = "GEDIMPORT_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Import into memory only; nothing is written to the database
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir).context("failed to initialize logging")?;
    }

    match cli.command {
        Command::Import(args) => import(&cli.db, args),
        Command::Runs { dataset } => list_runs(&cli.db, dataset.as_deref()),
    }
}

fn import(db_path: &Path, args: ImportArgs) -> Result<ExitCode> {
    let dataset = DatasetId::parse(&args.dataset)?;
    let options = build_options(&args)?;

    let file = File::open(&args.file)
        .with_context(|| format!("cannot open `{}`", args.file.display()))?;
    let source_file = args.file.display().to_string();
    let reader = BufReader::new(file);

    let run = if args.dry_run {
        let mut store = MemoryImportStore::new();
        let mut audit = MemoryAuditLog::new();
        ImportCoordinator::new(&mut store, &mut audit, options).run(reader, dataset, &source_file)
    } else {
        let conn = open_db(db_path)
            .with_context(|| format!("cannot open database `{}`", db_path.display()))?;
        let mut store = SqliteImportStore::new(&conn);
        let mut audit = SqliteImportRunRepository::new(&conn);
        ImportCoordinator::new(&mut store, &mut audit, options).run(reader, dataset, &source_file)
    };

    info!(
        "event=cli_import module=cli status={} run_id={}",
        run.status.as_str(),
        run.run_id
    );
    print_run(&run)?;

    Ok(if run.status == RunStatus::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn build_options(args: &ImportArgs) -> Result<ImportOptions> {
    let mut options = match args.options.as_deref() {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read options `{}`", path.display()))?;
            serde_json::from_str::<ImportOptions>(&text)
                .with_context(|| format!("invalid options `{}`", path.display()))?
        }
        None => ImportOptions::default(),
    };

    if args.tolerant {
        options.stop_on_error = false;
    }
    if args.no_sources {
        options.import_sources = false;
    }
    if args.no_media {
        options.import_media = false;
    }
    if let Some(batch_size) = args.batch_size {
        if batch_size == 0 {
            bail!("--batch-size must be at least 1");
        }
        options.batch_size = batch_size;
    }
    if options.total_bytes.is_none() {
        options.total_bytes = std::fs::metadata(&args.file).ok().map(|meta| meta.len());
    }
    Ok(options)
}

fn list_runs(db_path: &Path, dataset: Option<&str>) -> Result<ExitCode> {
    let dataset = dataset.map(DatasetId::parse).transpose()?;
    let conn = open_db(db_path)
        .with_context(|| format!("cannot open database `{}`", db_path.display()))?;
    let runs = SqliteImportRunRepository::new(&conn).list_runs(dataset.as_ref())?;
    println!("{}", serde_json::to_string_pretty(&runs)?);
    Ok(ExitCode::SUCCESS)
}

fn print_run(run: &ImportRun) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(run)?);
    Ok(())
}
