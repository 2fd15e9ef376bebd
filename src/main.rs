//! # Vigil — proactive check-ins for a personal assistant
//!
//! Usage:
//!   vigil run                 # Run the scheduler until Ctrl-C
//!   vigil check               # Run one check right now, ignoring the gates
//!   vigil logs --limit 20     # Show recent check-in log rows
//!   vigil quiet on|off        # Toggle do-not-disturb for the target user

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use vigil_channels::{TelegramMessenger, TwilioCaller};
use vigil_core::VigilConfig;
use vigil_core::traits::{CheckInRepository, EscalationProvider};
use vigil_memory::SqliteCheckInStore;
use vigil_providers::LlmGatingOracle;
use vigil_scheduler::{Collaborators, ProactiveScheduler, TaskQueue, collectors_from_config};

#[derive(Parser)]
#[command(name = "vigil", version, about = "🔭 Vigil — proactive check-in scheduler")]
struct Cli {
    /// Config file (default: ~/.vigil/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the periodic scheduler and run until Ctrl-C
    Run,
    /// Run a single check immediately
    Check,
    /// Print recent check-in log rows
    Logs {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Switch quiet mode for the target user
    Quiet {
        #[arg(value_enum)]
        state: Toggle,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

fn load_config(path: Option<&str>) -> Result<VigilConfig> {
    let config = match path {
        Some(p) => VigilConfig::load_from(Path::new(&expand_path(p)))?,
        None => VigilConfig::load()?,
    };
    config.validate()?;
    Ok(config)
}

/// Wire every adapter into a scheduler sharing `queue` and `store`.
fn build_scheduler(
    config: &VigilConfig,
    queue: TaskQueue,
    store: Arc<SqliteCheckInStore>,
) -> Result<ProactiveScheduler> {
    let escalation: Option<Arc<dyn EscalationProvider>> = if config.telephony.is_configured() {
        Some(Arc::new(TwilioCaller::new(config.telephony.clone())))
    } else {
        None
    };
    if config.proactive.active_escalation().is_some() && escalation.is_none() {
        tracing::warn!("⚠️ Escalation enabled but [telephony] is not configured — calls disabled");
    }
    if config.collectors.is_empty() {
        tracing::warn!("⚠️ No [[collectors]] configured — checks will find nothing");
    }

    let deps = Collaborators {
        queue,
        collectors: collectors_from_config(&config.collectors),
        repository: store.clone(),
        oracle: Arc::new(LlmGatingOracle::new(&config.llm)),
        messenger: Arc::new(TelegramMessenger::new(&config.telegram)),
        escalation,
        activity: store,
    };
    let scheduler = ProactiveScheduler::new(config.proactive.clone(), deps)
        .context("invalid [proactive] settings")?;
    Ok(scheduler)
}

fn require_targets(config: &VigilConfig) -> Result<()> {
    if config.proactive.target_chat_id.trim().is_empty()
        || config.proactive.target_user_id.trim().is_empty()
    {
        bail!("proactive.target_chat_id and proactive.target_user_id must be set");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "vigil=debug" } else { "vigil=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;

    let db_path = expand_path(&config.storage.db_path);
    let store = Arc::new(
        SqliteCheckInStore::open(Path::new(&db_path))
            .with_context(|| format!("failed to open database at {db_path}"))?,
    );

    match cli.command {
        Command::Run => {
            if !config.proactive.enabled {
                println!("⏸️  Proactive check-ins are disabled. Set [proactive] enabled = true.");
                return Ok(());
            }
            store.prune_reminders(config.proactive.reminder_cooldown_minutes)?;

            let queue = TaskQueue::new();
            let scheduler = build_scheduler(&config, queue.clone(), store)?;
            println!("🔭 Vigil v{}", env!("CARGO_PKG_VERSION"));
            scheduler.start();

            tokio::signal::ctrl_c().await?;
            tracing::info!("🛑 Shutting down...");
            scheduler.stop();
            queue.drain().await;
        }
        Command::Check => {
            require_targets(&config)?;
            let scheduler = build_scheduler(&config, TaskQueue::new(), store)?;
            let outcome = scheduler.check_now().await;
            println!("{outcome:?}");
        }
        Command::Logs { limit } => {
            let logs = store.get_recent_logs(limit).await?;
            if logs.is_empty() {
                println!("No check-ins yet.");
            }
            for log in logs {
                let detail = log
                    .message_sent
                    .as_deref()
                    .or(log.skip_reason.as_deref())
                    .unwrap_or("");
                let urgency = log.urgency.map(|u| u.to_string()).unwrap_or_else(|| "-".into());
                println!(
                    "{}  {:<4}  u={:<2}  [{}]  {}",
                    log.created_at.format("%Y-%m-%d %H:%M"),
                    log.gating_result,
                    urgency,
                    log.sources.join(","),
                    detail
                );
            }
        }
        Command::Quiet { state } => {
            require_targets(&config)?;
            let on = matches!(state, Toggle::On);
            store.set_quiet_mode(&config.proactive.target_user_id, on)?;
            println!(
                "{} Quiet mode {}",
                if on { "🔕" } else { "🔔" },
                if on { "on" } else { "off" }
            );
        }
    }

    Ok(())
}
