//! `scaffold`: turn a task description into a generated, executed, and reviewed
//! Python project.

use std::env;
use std::path::{self, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;

use scaffold::agent::{Agent, RunReport};
use scaffold::cancel::{self, CancelledError};
use scaffold::core::types::{Recovery, Task, Verdict};
use scaffold::exit_codes;
use scaffold::io::config::load_config;
use scaffold::io::oracle::HttpOracle;
use scaffold::io::runner::{InterpreterRunner, SystemHost};
use scaffold::io::transcript::Transcript;
use scaffold::logging;

#[derive(Parser)]
#[command(
    name = "scaffold",
    version,
    about = "Generate, run, and review a small Python project from a task description"
)]
struct Cli {
    /// What the program should do, in plain words.
    task: String,

    /// Directory the project is created in.
    project_path: PathBuf,

    /// TOML config file. Missing means defaults.
    #[arg(long, default_value = "scaffold.toml")]
    config: PathBuf,

    /// Chat completions URL (overrides config and `SCAFFOLD_ENDPOINT`).
    #[arg(long)]
    endpoint: Option<String>,

    /// Model name (overrides config and `SCAFFOLD_MODEL`).
    #[arg(long)]
    model: Option<String>,

    /// Interpreter used to run the project and install packages.
    #[arg(long)]
    interpreter: Option<String>,

    /// Write every oracle exchange and the final report here.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Skip the review phase.
    #[arg(long)]
    no_review: bool,

    /// Show phase progress on stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    cancel::install_handlers();

    let code = match run(cli) {
        Ok(report) => {
            print_report(&report);
            exit_code(&report)
        }
        Err(err) if err.downcast_ref::<CancelledError>().is_some() => {
            eprintln!("{err}");
            exit_codes::CANCELLED
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_codes::ABORTED
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<RunReport> {
    if cli.task.trim().is_empty() {
        bail!("task must be non-empty");
    }

    let mut config = load_config(&cli.config)?;
    config.apply_env(|key| env::var(key).ok())?;
    if let Some(endpoint) = cli.endpoint {
        config.oracle.endpoint = endpoint;
    }
    if let Some(model) = cli.model {
        config.oracle.model = model;
    }
    if let Some(interpreter) = cli.interpreter {
        config.execution.interpreter = interpreter;
    }
    if cli.no_review {
        config.execution.self_validate = false;
    }
    config.validate()?;

    let root = path::absolute(&cli.project_path)
        .with_context(|| format!("resolve {}", cli.project_path.display()))?;
    let task = Task::new(cli.task, root);

    let oracle = HttpOracle::new(&config.oracle)?;
    let runner = InterpreterRunner::new(SystemHost::new(&config.execution));
    let mut agent = Agent::new(oracle, runner, config.generation.clone())?
        .with_self_validation(config.execution.self_validate);
    if let Some(dir) = &cli.log_dir {
        agent = agent.with_transcript(Transcript::create(dir)?);
    }
    agent.run(&task)
}

fn exit_code(report: &RunReport) -> i32 {
    match &report.outcome {
        None => exit_codes::NO_ENTRY,
        Some(outcome) if outcome.success => exit_codes::OK,
        Some(_) => exit_codes::RUN_FAILED,
    }
}

fn print_report(report: &RunReport) {
    println!(
        "project `{}` at {} ({} files generated)",
        report.project_name,
        report.root.display(),
        report.files_written.len()
    );
    for skipped in &report.files_skipped {
        println!(
            "skipped {} after {} attempts: {}",
            skipped.relative_path, skipped.attempts, skipped.last_issue
        );
    }

    let (Some(entry), Some(outcome)) = (&report.entry, &report.outcome) else {
        println!("no entry file found");
        return;
    };
    for recovery in &outcome.recoveries {
        match recovery {
            Recovery::ExtendSearchPath { module, dir } => {
                println!("recovered `{module}`: added {} to the search path", dir.display());
            }
            Recovery::InstallPackage {
                module,
                package,
                installed,
            } => {
                if *installed {
                    println!("recovered `{module}`: installed {package}");
                } else {
                    println!("could not recover `{module}`: installing {package} failed");
                }
            }
        }
    }
    let status = match outcome.exit_code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code".to_string(),
    };
    println!("ran {entry}: {status}");
    if !outcome.stdout.is_empty() {
        println!("--- stdout ---\n{}", outcome.stdout.trim_end());
    }
    if !outcome.stderr.is_empty() {
        println!("--- stderr ---\n{}", outcome.stderr.trim_end());
    }

    match &report.verdict {
        Some(Verdict::Approved { reason }) => println!("review: YES {reason}"),
        Some(Verdict::Rejected { reason }) => println!("review: NO {reason}"),
        Some(Verdict::Inconclusive { raw }) => println!("review: inconclusive ({raw})"),
        Some(Verdict::Unavailable) => println!("review: unavailable"),
        None => {}
    }
}
