//! Mosaic - one prompt, many assistants
//!
//! CLI entry point for probing target pages and running in-process sessions.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, eyre};
use tracing::{debug, info};

use mosaic::cli::{Cli, Command, get_log_path};
use mosaic::config::Config;
use mosaic::session::{SessionPlan, load_attachment, load_pages, run_session};
use mosaic_adapter::extract;
use mosaic_adapter::{AdapterConfig, HtmlPage, Injector, profile_for};
use mosaic_core::synthesis::MIN_ANSWERS;
use mosaic_core::{Attachment, TargetId, TargetRegistry, build_meta_prompt, compose};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Targets => cmd_targets(&config),
        Command::Check { prompt, images } => cmd_check(&config, &prompt, &images),
        Command::Extract { target, html } => cmd_extract(&target, &html),
        Command::Inject {
            target,
            html,
            prompt,
            images,
        } => cmd_inject(&config, &target, &html, &prompt, &images).await,
        Command::Synthesize { target, answers } => cmd_synthesize(&target, &answers),
        Command::Session {
            prompt,
            pages,
            images,
            synthesize_into,
        } => cmd_session(&config, prompt, &pages, &images, synthesize_into).await,
    }
}

fn known_target(registry: &TargetRegistry, id: &str) -> Result<TargetId> {
    if registry.contains(id) {
        Ok(TargetId::from(id))
    } else {
        Err(eyre!("Unknown target '{}'", id))
    }
}

fn load_attachments(images: &[PathBuf]) -> Result<Vec<Attachment>> {
    images.iter().map(|p| load_attachment(p)).collect()
}

fn cmd_targets(config: &Config) -> Result<()> {
    debug!("cmd_targets: called");
    let registry = TargetRegistry::builtin();
    let active = config.active_targets(&registry)?;

    println!("{}", "Targets".bold());
    for target in registry.iter() {
        let marker = if active.contains(&target.id) {
            "active".green().to_string()
        } else {
            "-".dimmed().to_string()
        };
        let images = if target.capabilities.images { "images" } else { "text only" };
        println!(
            "  {} {:<12} {:<12} {:<36} {:<10} {}",
            target.icon,
            target.id.as_str().cyan(),
            target.name,
            target.url.as_str(),
            images,
            marker
        );
    }
    Ok(())
}

fn cmd_check(config: &Config, prompt: &str, images: &[PathBuf]) -> Result<()> {
    debug!(images = images.len(), "cmd_check: called");
    let attachments = load_attachments(images)?;
    let composed = compose(prompt, attachments, config.coordinator.attachment_policy)
        .map_err(|e| eyre!("{} {}", "Rejected:".red().bold(), e))?;

    for warning in &composed.warnings {
        println!("{} {}", "Dropped:".yellow(), warning);
    }
    println!(
        "{} {} characters, {} attachment(s)",
        "OK:".green().bold(),
        composed.request.prompt().chars().count(),
        composed.request.attachments().len()
    );
    Ok(())
}

fn cmd_extract(target: &str, html: &PathBuf) -> Result<()> {
    debug!(%target, html = %html.display(), "cmd_extract: called");
    let registry = TargetRegistry::builtin();
    let target_id = known_target(&registry, target)?;
    let page = fs::read_to_string(html).context(format!("Failed to read {}", html.display()))?;

    match extract::extract(&page, profile_for(target_id.as_str())) {
        Some(text) => println!("{}", text),
        None => println!("{} no answer found for {}", "Empty:".yellow(), registry.display_name(&target_id)),
    }
    Ok(())
}

async fn cmd_inject(config: &Config, target: &str, html: &PathBuf, prompt: &str, images: &[PathBuf]) -> Result<()> {
    debug!(%target, html = %html.display(), "cmd_inject: called");
    let registry = TargetRegistry::builtin();
    let target_id = known_target(&registry, target)?;
    let descriptor = registry
        .get(target_id.as_str())
        .ok_or_else(|| eyre!("Unknown target '{}'", target))?;

    let attachments = load_attachments(images)?;
    let composed = compose(prompt, attachments, config.coordinator.attachment_policy)?;
    for warning in &composed.warnings {
        println!("{} {}", "Dropped:".yellow(), warning);
    }

    let page = HtmlPage::new(fs::read_to_string(html).context(format!("Failed to read {}", html.display()))?);
    // Saved pages never change, so waiting only delays the dry run
    let adapter_config = AdapterConfig::immediate();
    let report = Injector::new(
        &page,
        profile_for(target_id.as_str()),
        &adapter_config,
        descriptor.capabilities.images,
    )
    .run(composed.request.prompt(), composed.request.attachments())
    .await?;

    let trail: Vec<String> = report.states.iter().map(|s| s.to_string()).collect();
    println!("{} {}", "States:".bold(), trail.join(" -> "));
    if let Some(located) = &report.located {
        println!("{} {}", "Input:".bold(), located);
    }
    if let Some(insertion) = report.insertion {
        println!("{} {:?}", "Insertion:".bold(), insertion);
    }
    if let Some(submit) = &report.submit {
        println!("{} {:?}", "Submit:".bold(), submit);
    }
    println!("{} {}", "Images:".bold(), report.attachments_delivered);
    println!("{}", "Actions:".bold());
    for action in page.journal() {
        println!("  {}", action);
    }

    if report.succeeded() {
        Ok(())
    } else {
        Err(eyre!("Injection ended in state {}", report.state()))
    }
}

fn cmd_synthesize(target: &str, answers: &[(String, PathBuf)]) -> Result<()> {
    debug!(%target, answers = answers.len(), "cmd_synthesize: called");
    let registry = TargetRegistry::builtin();
    known_target(&registry, target)?;

    let mut collected = Vec::with_capacity(answers.len());
    for (id, path) in answers {
        let source = known_target(&registry, id)?;
        let text = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
        if !text.trim().is_empty() {
            collected.push((source, text));
        }
    }
    if collected.len() < MIN_ANSWERS {
        return Err(eyre!(
            "Synthesis needs at least {} answers, got {}",
            MIN_ANSWERS,
            collected.len()
        ));
    }

    println!("{}", build_meta_prompt(&collected, &registry));
    Ok(())
}

async fn cmd_session(
    config: &Config,
    prompt: String,
    pages: &[(String, PathBuf)],
    images: &[PathBuf],
    synthesize_into: Option<String>,
) -> Result<()> {
    debug!(pages = pages.len(), ?synthesize_into, "cmd_session: called");
    let registry = TargetRegistry::builtin();
    let synthesize_into = synthesize_into
        .map(|id| known_target(&registry, &id))
        .transpose()?;

    let plan = SessionPlan {
        prompt,
        attachments: load_attachments(images)?,
        pages: load_pages(&registry, pages)?,
        synthesize_into,
    };
    let report = run_session(config, plan).await?;

    for warning in &report.warnings {
        println!("{} {}", "Dropped:".yellow(), warning);
    }

    println!("{}", "Readiness".bold());
    for (target_id, at) in &report.readiness.ready {
        println!("  {} ready at {}", registry.display_name(target_id).cyan(), at.format("%H:%M:%S%.3f"));
    }

    println!("{}", "Broadcast".bold());
    for (target_id, route) in &report.broadcast.delivered {
        println!("  {} delivered ({:?})", registry.display_name(target_id).green(), route);
    }
    for (target_id, error) in &report.broadcast.failed {
        println!("  {} failed: {}", registry.display_name(target_id).red(), error);
    }

    println!("{}", "Answers".bold());
    for (target_id, text) in &report.collection.answers {
        println!("  {}", registry.display_name(target_id).cyan().bold());
        for line in text.lines() {
            println!("    {}", line);
        }
    }
    for target_id in &report.collection.missing {
        println!("  {} no response from {}", "Missing:".yellow(), registry.display_name(target_id));
    }

    match report.synthesis {
        Some(Ok(outcome)) => println!(
            "{} {} chars sent to {} ({:?})",
            "Synthesis:".green().bold(),
            outcome.prompt_chars,
            registry.display_name(&outcome.destination),
            outcome.route
        ),
        Some(Err(e)) => println!("{} {}", "Synthesis:".red().bold(), e),
        None => {}
    }
    Ok(())
}
