use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use revio_copy::app::{App, RunDetails};
use revio_copy::config::{ConfigLoader, Settings};
use revio_copy::copy::RcloneCopier;
use revio_copy::domain::{MultiplexPolicy, RunView, TieBreak};
use revio_copy::error::RevioError;
use revio_copy::output::{JsonOutput, OutputMode, ProcessResult, TextOutput};
use revio_copy::tui::RunPicker;

#[derive(Parser)]
#[command(name = "revio-copy")]
#[command(about = "Discover PacBio Revio runs and copy their HiFi BAM files per biosample")]
#[command(version)]
struct Cli {
    /// Destination root; files land in <output>/Sample_<name>/
    #[arg(long, global = true, env = "REVIO_OUTPUT")]
    output: Option<String>,

    /// Run name to process without prompting
    #[arg(long, global = true, env = "REVIO_RUN")]
    run: Option<String>,

    #[arg(long, global = true, env = "REVIO_DEBUG")]
    debug: bool,

    /// Show what would be copied without copying
    #[arg(long, global = true, env = "REVIO_DRY_RUN")]
    dry_run: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    multiplex_policy: Option<MultiplexPolicy>,

    #[arg(long, global = true)]
    tie_break: Option<TieBreak>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List runs found under a data root, newest first")]
    List(RootArgs),
    #[command(about = "Select a run and copy its HiFi reads to the output directory")]
    Process(RootArgs),
}

#[derive(Args)]
struct RootArgs {
    root: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(revio) = report.downcast_ref::<RevioError>() {
            return ExitCode::from(map_exit_code(revio));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RevioError) -> u8 {
    match error {
        RevioError::NoRunsFound(_)
        | RevioError::RunNotFound(_)
        | RevioError::RunPending(_)
        | RevioError::InvalidSelection(_)
        | RevioError::NoFilesIdentified(_) => 2,
        RevioError::MissingTool(_) | RevioError::CopyFailed(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.debug { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let (root, is_process) = match &cli.command {
        Commands::List(args) => (args.root.clone(), false),
        Commands::Process(args) => (args.root.clone(), true),
    };
    let settings = build_settings(&cli, root)?;
    let copier = RcloneCopier::new(settings.rclone_path.clone());

    if is_process && settings.output_dir.is_some() && !settings.dry_run {
        let version = copier.check_available()?;
        info!("using {version}");
    }

    let app = App::new(settings, copier);
    if is_process {
        run_process(&app, output_mode)
    } else {
        run_list(&app, output_mode)
    }
}

fn build_settings(cli: &Cli, root: String) -> miette::Result<Settings> {
    let resolved = ConfigLoader::resolve(cli.config.as_deref())?;
    let mut settings = Settings::from_config(root, resolved);
    if let Some(output) = cli.output.as_deref().filter(|dir| !dir.is_empty()) {
        settings.output_dir = Some(output.into());
    }
    settings.run_name = cli.run.clone().filter(|name| !name.is_empty());
    settings.debug = cli.debug;
    settings.dry_run = cli.dry_run;
    if let Some(policy) = cli.multiplex_policy {
        settings.multiplex_policy = policy;
    }
    if let Some(tie_break) = cli.tie_break {
        settings.tie_break = tie_break;
    }
    Ok(settings)
}

fn run_list(app: &App<RcloneCopier>, mode: OutputMode) -> miette::Result<()> {
    let result = app.list()?;
    match mode {
        OutputMode::Json => JsonOutput::print_list(&result).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_list(&result).into_diagnostic()?,
    }
    Ok(())
}

fn run_process(app: &App<RcloneCopier>, mode: OutputMode) -> miette::Result<()> {
    let runs = app.runs()?;
    let Some(run) = choose_run(app, &runs, mode)? else {
        println!("No run selected");
        return Ok(());
    };

    let details = RunDetails::from(run);
    if mode == OutputMode::Text {
        TextOutput::print_details(&details).into_diagnostic()?;
    }

    let Some(report) = app.identify(run)? else {
        if mode == OutputMode::Json {
            JsonOutput::print_process(&ProcessResult {
                run: details,
                report: None,
                copy: None,
            })
            .into_diagnostic()?;
        } else {
            println!("No output directory set; nothing to copy");
        }
        return Ok(());
    };

    if mode == OutputMode::Text {
        TextOutput::print_report(&report).into_diagnostic()?;
    }
    let copy = match app.transfer(&report) {
        Ok(copy) => copy,
        Err(err) => {
            if mode == OutputMode::Json {
                JsonOutput::print_process(&ProcessResult {
                    run: details,
                    report: Some(report),
                    copy: None,
                })
                .into_diagnostic()?;
            }
            return Err(err.into());
        }
    };

    let failures = copy.failures();
    match mode {
        OutputMode::Text => TextOutput::print_copy(&copy).into_diagnostic()?,
        OutputMode::Json => JsonOutput::print_process(&ProcessResult {
            run: details,
            report: Some(report),
            copy: Some(copy),
        })
        .into_diagnostic()?,
    }
    if failures > 0 {
        return Err(RevioError::CopyFailed(format!("{failures} file pairs failed to copy")).into());
    }
    Ok(())
}

fn choose_run<'a>(
    app: &App<RcloneCopier>,
    runs: &'a [RunView],
    mode: OutputMode,
) -> miette::Result<Option<&'a RunView>> {
    if let Some(run) = app.configured_run(runs)? {
        return Ok(Some(run));
    }
    if mode == OutputMode::Json {
        miette::bail!("--run is required together with --json");
    }
    match RunPicker::new(runs).pick()? {
        Some(index) => Ok(Some(app.run_at(runs, index)?)),
        None => Ok(None),
    }
}
