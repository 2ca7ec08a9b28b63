use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;

use alarm_overlap::cli::{exit_status, Cli, Commands, GroupArgs, JoinArgs, RollupArgs};
use alarm_overlap::config::EngineConfig;
use alarm_overlap::engine::{run_grouped, run_join, run_rollup};
use alarm_overlap::output::{export, ResultTable};
use alarm_overlap::records::RowIssue;
use alarm_overlap::table::load_table;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,alarm_overlap=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    let mut config = EngineConfig::load(cli.config).context("failed to load engine config")?;
    match cli.command {
        Commands::Join(args) => join(args, &mut config),
        Commands::Group(args) => group(args, &config),
        Commands::Rollup(args) => rollup(args, &mut config),
    }
}

fn join(args: JoinArgs, config: &mut EngineConfig) -> Result<()> {
    args.apply_to(config);
    let reference = load_table(&args.reference)
        .with_context(|| format!("failed to load reference {}", args.reference.display()))?;
    let candidate = load_table(&args.candidate)
        .with_context(|| format!("failed to load candidates {}", args.candidate.display()))?;

    let outcome = run_join(&reference, &candidate, args.mode, args.predicate, config)
        .context("join failed")?;
    report_issues(reference.name(), &outcome.reference_issues);
    report_issues(candidate.name(), &outcome.candidate_issues);
    write_result(&outcome.table, &args.output)
}

fn group(args: GroupArgs, config: &EngineConfig) -> Result<()> {
    let table = load_table(&args.input)
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    let spec = args.group_spec(config);
    let outcome = run_grouped(&table, &spec, config).context("grouping failed")?;
    report_issues(table.name(), &outcome.issues);
    write_result(&outcome.table, &args.output)
}

fn rollup(args: RollupArgs, config: &mut EngineConfig) -> Result<()> {
    args.apply_to(config);
    let table = load_table(&args.input)
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    let spec = args.rollup_spec(config);
    let outcome = run_rollup(&table, spec, args.shape, config).context("rollup failed")?;
    report_issues(table.name(), &outcome.issues);
    write_result(&outcome.table, &args.output)
}

fn report_issues(table: &str, issues: &[RowIssue]) {
    for issue in issues {
        tracing::warn!(row = issue.row, "{}", issue.to_error(table));
    }
    if !issues.is_empty() {
        tracing::warn!(table, skipped = issues.len(), "rows skipped");
    }
}

fn write_result(table: &ResultTable, output: &Path) -> Result<()> {
    let format = export(table, output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!(highlighted = table.highlighted_cells(), "marked matched cells");
    println!(
        "wrote {} rows ({:?}) to {}",
        table.len(),
        format,
        output.display()
    );
    Ok(())
}
