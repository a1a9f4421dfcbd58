use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;
mod config;

use cli::{Cli, Commands, RunArgs};
use config::{Config, ConfigOverrides, load_config};
use verifybot::chat::{ChatSession, ScriptedChat, WebDriverChat};
use verifybot::classify::TargetClassifier;
use verifybot::credentials::Credentials;
use verifybot::domain::{Attempt, RunRecord, RunStatus, Target};
use verifybot::exec::{Executor, SshHost};
use verifybot::extract::Extractor;
use verifybot::runner::{Pipeline, PipelineSettings, RunObserver};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("verifybot")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("verifybot.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Prints attempt progress to stdout.
struct ConsoleObserver {
    verbose: bool,
}

impl RunObserver for ConsoleObserver {
    fn attempt_started(&self, number: u32, max: u32) {
        println!("{} {}/{}", "Attempt".cyan().bold(), number, max);
    }

    fn attempt_finished(&self, attempt: &Attempt) {
        for placement in &attempt.placements {
            println!("  {} -> {} [{}]", placement.filename, placement.target, placement.rule);
        }
        for (rule, preview) in &attempt.junk {
            if self.verbose {
                println!("  {} {} ({})", "discarded".dimmed(), preview, rule);
            }
        }
        for result in &attempt.results {
            let status = if result.is_success() {
                result.status.to_string().green()
            } else {
                result.status.to_string().red()
            };
            println!("  {} {} ({} ms)", result.name, status, result.elapsed_ms);
        }
        for report in &attempt.acceptance {
            let verdict = if report.passed { "PASS".green() } else { "FAIL".red() };
            println!("  {} {}: {}", verdict, report.name, report.reason);
        }
        if let Some(error) = &attempt.error {
            println!("  {} {}", "error:".red(), error);
        }
        match attempt.failure {
            Some(failure) if attempt.feedback.is_some() => {
                println!("  {} {}, sending feedback", "failed:".yellow(), failure);
            }
            Some(failure) => println!("  {} {}", "failed:".red(), failure),
            None => {}
        }
    }
}

/// Remote host for a run, if one is needed or configured.
///
/// Credentials are required only when the task needs a remote target;
/// otherwise a readable credentials file is still used so blocks that
/// classify as remote can run.
fn remote_host(config: &Config, needs_remote: bool) -> Result<Option<SshHost>> {
    let path = &config.paths.credentials_file;
    if needs_remote {
        let credentials = Credentials::load(path)
            .with_context(|| format!("Remote target needs credentials from {}", path.display()))?;
        info!("Remote host {}:{}", credentials.destination(), credentials.port);
        return Ok(Some(
            SshHost::new(credentials).with_connect_timeout(config.remote.connect_timeout_secs),
        ));
    }
    if !path.exists() {
        return Ok(None);
    }
    match Credentials::load(path) {
        Ok(credentials) => Ok(Some(
            SshHost::new(credentials).with_connect_timeout(config.remote.connect_timeout_secs),
        )),
        Err(e) => {
            log::warn!("Ignoring credentials file {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

async fn drive<C: ChatSession>(
    chat: Arc<C>,
    executor: Executor<SshHost>,
    settings: PipelineSettings,
    task: &str,
    verbose: bool,
) -> Result<RunRecord> {
    let pipeline = Pipeline::new(chat.clone(), executor, settings);
    let result = pipeline.run_with(task, &ConsoleObserver { verbose }).await;
    if let Err(e) = chat.close().await {
        log::warn!("Closing chat session failed: {}", e);
    }
    Ok(result?)
}

async fn handle_run_command(args: &RunArgs, mut config: Config, verbose: bool) -> Result<RunStatus> {
    ConfigOverrides {
        max_retries: args.max_retries,
        timeout_secs: args.timeout,
        remote_dir: args.remote_dir.clone(),
        dest_dir: args.dest.clone(),
        headless: args.headless,
    }
    .apply_to(&mut config);
    config.validate()?;

    let target = args
        .target
        .unwrap_or_else(|| TargetClassifier::default().classify_prompt(&args.task).target);
    println!("{} {}", "Target:".green(), target.describe());

    let needs_remote = target.is_remote() && !args.no_run;
    let remote = remote_host(&config, needs_remote)?;
    let executor = Executor::new(config.execution.clone(), remote.map(Arc::new));

    let transcript_dir = config.paths.resolved_transcript_dir();
    let settings = PipelineSettings {
        extraction: config.extraction.clone(),
        acceptance: config.acceptance.clone(),
        retry: config.retry.clone(),
        target_override: args.target,
        dest_dir: config.paths.dest_dir.clone(),
        transcript_dir: Some(transcript_dir.clone()),
        no_run: args.no_run,
        install_deps: args.install_deps,
    };

    let record = if args.replay.is_empty() {
        let chat = WebDriverChat::new(config.chat.clone()).context("Failed to set up the browser session")?;
        drive(Arc::new(chat), executor, settings, &args.task, verbose).await?
    } else {
        let chat = ScriptedChat::from_files(&args.replay).context("Failed to read replay files")?;
        drive(Arc::new(chat), executor, settings, &args.task, verbose).await?
    };

    let status = match record.status {
        RunStatus::Succeeded => record.status.to_string().green().bold(),
        _ => record.status.to_string().red().bold(),
    };
    println!(
        "{} after {} attempt(s), transcript in {}",
        status,
        record.attempt_count(),
        transcript_dir.join(format!("{}.md", record.id)).display()
    );
    Ok(record.status)
}

/// Files matching `pattern`, or the pattern itself when nothing matches.
fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in glob::glob(pattern).context("Invalid glob pattern")? {
        files.push(entry.context("Unreadable glob match")?);
    }
    if files.is_empty() {
        files.push(PathBuf::from(pattern));
    }
    Ok(files)
}

fn handle_extract_command(pattern: &str, prompt: &str, target: Option<Target>, config: &Config) -> Result<()> {
    let extractor = Extractor::new(config.extraction.clone());
    let classifier = TargetClassifier::new(target);

    for path in expand_pattern(pattern)? {
        let text = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let extraction = extractor.extract(&text, prompt);
        println!("{} {} ({:?})", "File:".green(), path.display(), extraction.source);

        if extraction.is_empty() {
            println!("  {}", "no code found".yellow());
        }
        for block in &extraction.blocks {
            let c = classifier.classify(prompt, block);
            println!(
                "  {} [{}, {:?}] -> {} ({})",
                block.filename.bold(),
                block.language,
                block.kind,
                c.target,
                c.rule
            );
            println!("    {}", block.preview(70).dimmed());
        }
        for junk in &extraction.junk {
            println!("  {} {}: {}", "junk".yellow(), junk.rule, junk.preview(60));
        }
        if let Some(secs) = extraction.hints.timeout_secs {
            println!("  timeout hint: {}s", secs);
        }
        if !extraction.hints.dependencies.is_empty() {
            println!("  dependencies: {}", extraction.hints.dependencies.join(", "));
        }
    }
    Ok(())
}

async fn handle_login_command(mut config: Config) -> Result<()> {
    config.chat.headless = false;
    println!(
        "{} log in within {}s; the browser closes once the prompt box appears",
        "Login:".green(),
        config.chat.login_timeout_secs
    );
    let chat = WebDriverChat::new(config.chat.clone())?;
    chat.login().await.context("Login did not complete")?;
    chat.close().await?;
    println!("{}", "Logged in, profile saved".green());
    Ok(())
}

async fn run_application(cli: &Cli, config: Config) -> Result<bool> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run(args) => {
            let status = handle_run_command(args, config, cli.is_verbose()).await?;
            Ok(status == RunStatus::Succeeded)
        }
        Commands::Extract { pattern, prompt, target } => {
            handle_extract_command(pattern, prompt, *target, &config)?;
            Ok(true)
        }
        Commands::Login => {
            handle_login_command(config).await?;
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    let ok = run_application(&cli, config).await.context("Application failed")?;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
