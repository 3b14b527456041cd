use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use qren_core::{
    app_paths, collect_input_files, dump_exif_fields, execute_plan, load_config, plan_files,
    ActionStatus, AppConfig, Confirmation, ExecuteMode, ExecutionReport, ExifLookup, ExitOutcome,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "qren", version)]
#[command(about = "Rename photos to YYYYMMDD_HHMMSS_NNNN[_tag].ext from their capture time")]
struct Cli {
    /// Display/dump EXIF information in files
    #[arg(short = 'i', conflicts_with = "rename")]
    info: bool,
    /// Rename files to YYYYMMDD_HHMMSS_NNNN[_tag].ext
    #[arg(short = 'r')]
    rename: bool,
    /// Ask the user to confirm each file
    #[arg(short = 'p')]
    prompt: bool,
    /// Do nothing. Simulate the operation
    #[arg(short = 'n')]
    simulate: bool,
    /// Show configuration file content
    #[arg(short = 'g')]
    show_config: bool,
    /// Descend into directory arguments
    #[arg(long, default_value_t = false)]
    recursive: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    /// Debug logging (RUST_LOG overrides)
    #[arg(short = 'v', long, default_value_t = false)]
    verbose: bool,
    /// File(s) to process
    #[arg(value_name = "FILE", required_unless_present = "show_config")]
    files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match run(cli) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("{err:#}");
            ExitOutcome::TotalFailure
        }
    };
    ExitCode::from(outcome.exit_code() as u8)
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "qren=debug,qren_core=debug"
    } else {
        "qren=info,qren_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<ExitOutcome> {
    let config = load_config()?;

    if cli.show_config {
        cmd_show_config(&config)?;
        if !cli.info && !cli.rename {
            return Ok(ExitOutcome::Success);
        }
    }

    let recursive = cli.recursive || config.recursive_default;
    let files = collect_input_files(&cli.files, recursive, &config.extensions)?;

    if cli.info {
        return Ok(cmd_info(&files));
    }
    if cli.rename {
        let prompt = cli.prompt || config.prompt_default;
        return cmd_rename(&files, &config, prompt, cli.simulate, cli.output);
    }

    anyhow::bail!("nothing to do: pass -i to dump metadata or -r to rename");
}

fn cmd_show_config(config: &AppConfig) -> Result<()> {
    let paths = app_paths()?;
    println!("config file: {}", paths.config_path.display());
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn cmd_info(files: &[PathBuf]) -> ExitOutcome {
    let mut outcome = ExitOutcome::Success;
    for file in files {
        println!("{}", absolute(file).display());
        match dump_exif_fields(file) {
            Ok(fields) => {
                for (ifd, tag, value) in fields {
                    println!("[{ifd}] - {tag} = {value}");
                }
            }
            Err(err) => {
                warn!(path = %file.display(), error = %err, "could not read EXIF");
                outcome = ExitOutcome::PartialFailure;
            }
        }
    }
    outcome
}

fn cmd_rename(
    files: &[PathBuf],
    config: &AppConfig,
    prompt: bool,
    simulate: bool,
    output: OutputFormat,
) -> Result<ExitOutcome> {
    let sources: Vec<PathBuf> = files.iter().map(|f| absolute(f)).collect();
    let lookup = ExifLookup::new(config.tag_source, config.fixed_tag.clone());
    let plan = plan_files(&sources, &lookup).context("could not build rename plan")?;

    let mode = if simulate {
        ExecuteMode::Simulate
    } else {
        ExecuteMode::Live
    };

    let mut ask = ask_confirmation;
    let confirm: Option<&mut qren_core::ConfirmFn<'_>> = if prompt && mode == ExecuteMode::Live {
        Some(&mut ask)
    } else {
        None
    };

    let report = execute_plan(plan, mode, confirm)?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_table(&report),
    }

    if mode == ExecuteMode::Simulate {
        info!("simulate mode: no files were changed");
    }

    Ok(report.outcome())
}

fn ask_confirmation(source: &Path, target: &Path) -> Confirmation {
    let stdin = io::stdin();
    loop {
        eprint!(
            "rename {} -> {}? [y/N/q] ",
            source.display(),
            target.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
        );
        let _ = io::stderr().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => return Confirmation::Abort,
            Ok(_) => {}
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Confirmation::Accept,
            "" | "n" | "no" => return Confirmation::Decline,
            "q" | "quit" => return Confirmation::Abort,
            _ => continue,
        }
    }
}

fn print_table(report: &ExecutionReport) {
    println!("source -> target (status)");
    for action in &report.actions {
        let status = match &action.status {
            ActionStatus::Planned => "planned".to_string(),
            ActionStatus::Applied => "applied".to_string(),
            ActionStatus::Skipped(reason) => format!("skipped: {reason}"),
            ActionStatus::Failed(reason) => format!("FAILED: {reason}"),
        };
        let note = action
            .note
            .as_deref()
            .map(|n| format!(", {n}"))
            .unwrap_or_default();
        println!(
            "{} -> {} ({}{})",
            action.source_path.display(),
            action.target_path.display(),
            status,
            note
        );
    }
    for skipped in &report.skipped_records {
        let detail = skipped
            .error
            .as_ref()
            .map(|e| format!(": {e}"))
            .unwrap_or_default();
        println!(
            "{} (skipped: {}{})",
            skipped.source_path.display(),
            skipped.reason,
            detail
        );
    }

    println!(
        "\nsummary: applied={} planned={} skipped={} failed={}",
        report.applied, report.planned, report.skipped, report.failed
    );
    if let Some(reason) = &report.aborted {
        println!("aborted: {reason}");
    }
}

/// Makes `path` absolute without touching the filesystem, so a symlink
/// argument is renamed as the link itself.
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
