use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fenestra_tools::config::CallSiteTable;
use fenestra_tools::hooks::{ConsolidationPolicy, HookOutcome};
use fenestra_tools::sync;
use fenestra_tools::{Result, ToolError};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging().and_then(|()| run(cli)) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| ToolError::Logging(err.to_string()))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Document(args) => execute_document(args),
        Command::Sheet(args) => execute_sheet(args),
        Command::Kinds(args) => execute_kinds(args),
    }
}

fn execute_document(args: DocumentArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(ToolError::MissingInput(args.input));
    }
    let table = CallSiteTable::load(args.config.as_deref())?;
    let policy = if args.always {
        ConsolidationPolicy::Always
    } else {
        ConsolidationPolicy::DraftOnly
    };

    match sync::consolidate_document_file(&args.input, &args.output, table, policy)? {
        HookOutcome::Replaced { before, after } => {
            println!("merged {before} lines into {after}");
        }
        HookOutcome::Unchanged => println!("no duplicate lines"),
        HookOutcome::Skipped(reason) => println!("skipped: {reason:?}"),
    }
    Ok(())
}

fn execute_sheet(args: SheetArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(ToolError::MissingInput(args.input));
    }
    let table = CallSiteTable::load(args.config.as_deref())?;
    let call_site = table.require(&args.kind)?;

    let written = sync::consolidate_sheet(
        &args.input,
        &args.output,
        args.sheet.as_deref(),
        &call_site.config,
    )?;
    println!("wrote {written} lines");
    Ok(())
}

fn execute_kinds(args: KindsArgs) -> Result<()> {
    let table = CallSiteTable::load(args.config.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&table)?);
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Merge duplicate line items of ERP documents."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consolidate the child table of a JSON document.
    Document(DocumentArgs),
    /// Consolidate the lines of a bulk-import workbook.
    Sheet(SheetArgs),
    /// Print the effective call-site table.
    Kinds(KindsArgs),
}

#[derive(clap::Args)]
struct DocumentArgs {
    /// Input document (JSON).
    #[arg(long)]
    input: PathBuf,

    /// Output document path.
    #[arg(long)]
    output: PathBuf,

    /// JSON file adding or overriding call sites.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Consolidate submitted and cancelled documents too.
    #[arg(long)]
    always: bool,
}

#[derive(clap::Args)]
struct SheetArgs {
    /// Document kind whose call site applies, e.g. "Purchase Order".
    #[arg(long)]
    kind: String,

    /// Input workbook path.
    #[arg(long)]
    input: PathBuf,

    /// Output workbook path.
    #[arg(long)]
    output: PathBuf,

    /// Sheet holding the lines; defaults to the first sheet.
    #[arg(long)]
    sheet: Option<String>,

    /// JSON file adding or overriding call sites.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(clap::Args)]
struct KindsArgs {
    /// JSON file adding or overriding call sites.
    #[arg(long)]
    config: Option<PathBuf>,
}
