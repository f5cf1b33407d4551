//! Flowdesk CLI: migrations, deadline scans and reports against the workflow database.
//!
//! Reads DATABASE_URL (or FLOWDESK_DATABASE_URL) and the engine settings from the
//! environment or a `.env` file.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use flowdesk_cli::{load_directory, truncate_string, workload_table};
use flowdesk_core::EngineConfig;
use flowdesk_db::setup_database;
use flowdesk_infra::{init_telemetry, shutdown_telemetry};
use flowdesk_services::initialize_services;

#[derive(Parser)]
#[command(name = "flowdesk", about = "Flowdesk workflow engine CLI")]
struct Cli {
    /// JSON file with users, teams and role permissions
    #[arg(long, global = true, value_name = "PATH")]
    directory: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Run one deadline scan and exit
    DeadlineScan {
        /// Days ahead of the deadline that count as "near" (default: DEADLINE_DAYS_THRESHOLD)
        #[arg(long)]
        days: Option<i64>,
    },
    /// Run the deadline scan on its interval until interrupted
    Scheduler,
    /// Dashboard statistics, overall or for one user
    Stats {
        #[arg(long, value_name = "UUID")]
        user: Option<Uuid>,
    },
    /// Workload of one user, or of every user holding assignments
    Workload {
        #[arg(long, value_name = "UUID")]
        user: Option<Uuid>,
    },
    /// Transition history of a workflow
    History {
        /// Workflow UUID
        workflow_id: Uuid,
    },
    /// Notification inbox of a user
    Inbox {
        /// User UUID
        user_id: Uuid,
        #[arg(long)]
        unread: bool,
        #[arg(long)]
        limit: Option<i64>,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env().context("Failed to load configuration")?;
    init_telemetry(config.log_format, "flowdesk-cli", &config.environment)
        .map_err(|e| anyhow::anyhow!("Failed to initialise telemetry: {}", e))?;

    let cli = Cli::parse();
    let result = run(cli, config).await;
    shutdown_telemetry().await;
    result
}

async fn run(cli: Cli, config: EngineConfig) -> anyhow::Result<()> {
    if matches!(cli.command, Commands::Migrate) {
        config.validate()?;
        setup_database(&config)
            .await
            .context("Failed to apply migrations")?;
        tracing::info!("Migrations applied");
        return print_json(&serde_json::json!({ "success": true }));
    }

    let directory = load_directory(cli.directory.as_deref())?;
    let services = initialize_services(&config, directory).await?;

    match cli.command {
        Commands::Migrate => {}
        Commands::DeadlineScan { days } => {
            let days = days.unwrap_or(config.deadline_days_threshold);
            let report = services
                .deadlines
                .check_and_send_deadline_notifications(days, &CancellationToken::new())
                .await?;
            print_json(&report)?;
        }
        Commands::Scheduler => {
            let cancel = CancellationToken::new();
            let handle = services.deadlines.clone().start(cancel.clone());
            tracing::info!(
                interval_secs = config.deadline_scan_interval_secs,
                "Deadline scheduler running, press Ctrl-C to stop"
            );
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            cancel.cancel();
            handle.await.context("Deadline scheduler task panicked")?;
        }
        Commands::Stats { user } => match user {
            Some(user_id) => print_json(&services.stats.get_user_workflow_stats(user_id).await?)?,
            None => print_json(&services.stats.get_general_workflow_stats().await?)?,
        },
        Commands::Workload { user } => {
            let rows = match user {
                Some(user_id) => vec![services.engine.assignments().get_user_workload(user_id).await?],
                None => services.stats.get_users_workload().await?,
            };
            match cli.format {
                OutputFormat::Json => print_json(&rows)?,
                OutputFormat::Table => print!("{}", workload_table(&rows)),
            }
        }
        Commands::History { workflow_id } => {
            let history = services.engine.get_workflow_history(workflow_id).await?;
            match cli.format {
                OutputFormat::Json => print_json(&history)?,
                OutputFormat::Table => {
                    for t in &history {
                        println!(
                            "{} {:<13} step {:>4} -> {:<4} {:<24} {}",
                            t.created_at.format("%Y-%m-%d %H:%M:%S"),
                            t.transition_type.to_string(),
                            t.from_step.map(|s| s.to_string()).unwrap_or_default(),
                            t.to_step.map(|s| s.to_string()).unwrap_or_default(),
                            truncate_string(
                                &format!(
                                    "{} -> {}",
                                    t.from_status.as_deref().unwrap_or("-"),
                                    t.to_status.as_deref().unwrap_or("-")
                                ),
                                24
                            ),
                            t.comments.as_deref().unwrap_or("")
                        );
                    }
                }
            }
        }
        Commands::Inbox {
            user_id,
            unread,
            limit,
        } => {
            let inbox = services
                .engine
                .notifications()
                .get_user_notifications(user_id, unread, limit)
                .await?;
            match cli.format {
                OutputFormat::Json => print_json(&inbox)?,
                OutputFormat::Table => {
                    for n in &inbox {
                        println!(
                            "{} {} {:<13} {}",
                            if n.read { " " } else { "*" },
                            n.created_at.format("%Y-%m-%d %H:%M"),
                            n.notification_type.to_string(),
                            truncate_string(&n.message, 80)
                        );
                    }
                }
            }
        }
    }

    Ok(())
}
