//! slotwatch - reservation slot watcher
//!
//! Periodically renders each configured page, classifies it and sends a push
//! notification when a slot opens.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use slotwatch::{open_state, HttpRenderer, Monitor, MonitorConfig};
use slotwatch_detect::RulePolicy;
use slotwatch_notify::{Dispatcher, LogGateway};
use slotwatch_scheduler::Scheduler;
use slotwatch_store::{NewTarget, TargetId, TargetStore, TargetUpdate};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "slotwatch")]
#[command(about = "Watches reservation pages and notifies when a slot opens")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "SLOTWATCH_CONFIG", default_value = "slotwatch.toml")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the watcher until interrupted
    Run,

    /// Generate a sample config file
    InitConfig {
        /// Where to write the config (defaults to --config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// State directory to put in the config
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Manage watched targets
    #[command(subcommand)]
    Target(TargetCommand),

    /// Show recent observations of a target
    Logs {
        /// Target id
        id: TargetId,

        /// Maximum entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Render and classify a target once, without recording anything
    Check {
        /// Target id
        id: TargetId,
    },
}

#[derive(Subcommand)]
enum TargetCommand {
    /// Add a target
    Add {
        /// Display name
        #[arg(long)]
        name: String,

        /// Page URL
        #[arg(long)]
        url: String,

        /// Active rules, e.g. "AB"
        #[arg(long, default_value = "ABC")]
        policy: RulePolicy,

        /// Add the target disabled
        #[arg(long)]
        disabled: bool,
    },

    /// List targets
    List,

    /// Show one target and its state
    Show {
        /// Target id
        id: TargetId,
    },

    /// Include a target in scheduled checks
    Enable {
        /// Target id
        id: TargetId,
    },

    /// Exclude a target from scheduled checks
    Disable {
        /// Target id
        id: TargetId,
    },

    /// Delete a target and its history
    Remove {
        /// Target id
        id: TargetId,
    },

    /// Replace a target's rule policy
    SetPolicy {
        /// Target id
        id: TargetId,

        /// Active rules, e.g. "C"
        policy: RulePolicy,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    match cli.command {
        Commands::Run => run(&cli.config).await?,
        Commands::InitConfig {
            output,
            state_dir,
            force,
        } => init_config(output.as_deref().unwrap_or(&cli.config), state_dir, force)?,
        Commands::Target(command) => target_command(&cli.config, command)?,
        Commands::Logs { id, limit } => show_logs(&cli.config, id, limit)?,
        Commands::Check { id } => check(&cli.config, id).await?,
    }

    Ok(())
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("slotwatch=info".parse()?);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
    Ok(())
}

/// Loads the config file, falling back to defaults when it does not exist.
fn load_config(path: &Path) -> anyhow::Result<MonitorConfig> {
    if path.exists() {
        Ok(MonitorConfig::from_file(path)?)
    } else {
        warn!(config = %path.display(), "config file not found, using defaults");
        Ok(MonitorConfig::default())
    }
}

async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = MonitorConfig::from_file(config_path)?;
    info!(
        config = %config_path.display(),
        state_dir = %config.state_dir.display(),
        renderer = %config.renderer.endpoint,
        "starting slotwatch"
    );

    let store = open_state(&config.state_dir)?;
    let dispatcher = Dispatcher::with_body(config.build_gateway()?, config.notification.body.clone());
    let monitor = Arc::new(Monitor::new(
        store,
        HttpRenderer::new(config.renderer.endpoint.clone()),
        dispatcher,
        config.renderer.timeout(),
    ));

    let scheduler = Scheduler::new(config.scheduler.to_scheduler_config())?;
    scheduler.start(move || {
        let monitor = Arc::clone(&monitor);
        async move {
            monitor.tick().await;
            Ok::<(), Infallible>(())
        }
    })?;

    wait_for_shutdown(&scheduler, config_path).await?;
    scheduler.stop()?;

    while scheduler.is_in_flight() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    info!("slotwatch stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown(scheduler: &Scheduler, config_path: &Path) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("interrupted, shutting down");
                return Ok(());
            }
            _ = terminate.recv() => {
                info!("terminated, shutting down");
                return Ok(());
            }
            _ = hangup.recv() => reload_interval(scheduler, config_path),
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_scheduler: &Scheduler, _config_path: &Path) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("interrupted, shutting down");
    Ok(())
}

#[cfg(unix)]
fn reload_interval(scheduler: &Scheduler, config_path: &Path) {
    match MonitorConfig::from_file(config_path) {
        Ok(config) => {
            if let Err(e) = scheduler.update_interval(config.scheduler.base_interval()) {
                warn!(error = %e, "failed to apply reloaded interval");
            }
        }
        Err(e) => warn!(error = %e, "failed to reload config, keeping current interval"),
    }
}

fn init_config(output: &Path, state_dir: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    let mut config = MonitorConfig::default();
    if let Some(state_dir) = state_dir {
        config.state_dir = state_dir;
    }
    config.write_to(output)?;

    println!("Wrote config to {}", output.display());
    println!("State directory: {}", config.state_dir.display());
    Ok(())
}

fn open_store(config_path: &Path) -> anyhow::Result<Arc<TargetStore>> {
    let config = load_config(config_path)?;
    Ok(open_state(&config.state_dir)?)
}

fn target_command(config_path: &Path, command: TargetCommand) -> anyhow::Result<()> {
    let store = open_store(config_path)?;

    match command {
        TargetCommand::Add {
            name,
            url,
            policy,
            disabled,
        } => {
            let id = store.add(
                NewTarget::new(name, url)
                    .with_policy(policy)
                    .enabled(!disabled),
            )?;
            println!("{id}");
        }

        TargetCommand::List => {
            let targets = store.list();
            if targets.is_empty() {
                println!("No targets.");
                return Ok(());
            }
            println!(
                "{:<36}  {:<8}  {:<6}  {:<7}  NAME",
                "ID", "ENABLED", "POLICY", "STATUS"
            );
            for target in targets {
                let status = store
                    .get_state(target.id)
                    .map_or_else(|| "-".to_string(), |s| s.status.to_string());
                println!(
                    "{:<36}  {:<8}  {:<6}  {:<7}  {}",
                    target.id,
                    target.enabled,
                    target.policy.to_string(),
                    status,
                    target.name
                );
            }
        }

        TargetCommand::Show { id } => {
            let target = store
                .get(id)
                .ok_or_else(|| anyhow::anyhow!("no target with id {id}"))?;
            println!("ID:        {}", target.id);
            println!("Name:      {}", target.name);
            println!("URL:       {}", target.url);
            println!(
                "Final URL: {}",
                target.final_url.as_deref().unwrap_or("-")
            );
            println!("Enabled:   {}", target.enabled);
            println!("Policy:    {}", target.policy);
            if let Some(state) = store.get_state(id) {
                println!("Status:    {}", state.status);
                println!("Changed:   {}", state.last_changed_at.to_rfc3339());
                println!(
                    "Last open: {}",
                    state
                        .last_open_at
                        .map_or_else(|| "-".to_string(), |t| t.to_rfc3339())
                );
            }
        }

        TargetCommand::Enable { id } => set_target(&store, id, TargetUpdate::enabled(true))?,
        TargetCommand::Disable { id } => set_target(&store, id, TargetUpdate::enabled(false))?,
        TargetCommand::SetPolicy { id, policy } => {
            set_target(&store, id, TargetUpdate::policy(policy))?;
        }

        TargetCommand::Remove { id } => {
            if !store.delete(id)? {
                anyhow::bail!("no target with id {id}");
            }
            println!("Removed {id}");
        }
    }

    Ok(())
}

fn set_target(store: &TargetStore, id: TargetId, update: TargetUpdate) -> anyhow::Result<()> {
    if !store.update(id, update)? {
        anyhow::bail!("no target with id {id}");
    }
    println!("Updated {id}");
    Ok(())
}

fn show_logs(config_path: &Path, id: TargetId, limit: usize) -> anyhow::Result<()> {
    let store = open_store(config_path)?;
    let entries = store.observations().recent(id, limit)?;
    if entries.is_empty() {
        println!("No observations.");
        return Ok(());
    }

    for entry in entries {
        let evidence: Vec<&str> = entry.evidence.iter().map(|r| r.as_str()).collect();
        println!(
            "{}  {:<7}  [{}]  {}",
            entry.checked_at.to_rfc3339(),
            entry.status.as_str(),
            evidence.join(","),
            entry.error.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn check(config_path: &Path, id: TargetId) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = open_state(&config.state_dir)?;
    let target = store
        .get(id)
        .ok_or_else(|| anyhow::anyhow!("no target with id {id}"))?;

    let monitor = Monitor::new(
        store,
        HttpRenderer::new(config.renderer.endpoint.clone()),
        Dispatcher::new(LogGateway),
        config.renderer.timeout(),
    );
    let observation = monitor.observe(&target).await;

    println!("Status:    {}", observation.classification.status);
    println!(
        "Evidence:  {}",
        observation.classification.evidence_names().join(",")
    );
    println!(
        "Final URL: {}",
        observation.final_url.as_deref().unwrap_or("-")
    );
    if let Some(error) = observation.error {
        println!("Error:     {error}");
    }
    Ok(())
}
