//! `planner`: operator CLI for weekly rotas.

mod commands;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use domain::models::{leave::LeaveStatus, rota::RotaStatus};
use services::services::{
    config::PlannerConfig, context::PlannerContext, notification::TracingNotifier,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::commands::{Edit, Session};

#[derive(Parser)]
#[command(name = "planner", version, about = "Inspect and edit weekly rotas", long_about = None)]
struct Cli {
    /// TOML config file; ROTA_* environment variables override its values
    #[arg(long, env = "ROTA_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct WeekArgs {
    #[arg(long, env = "ROTA_LOCATION_ID")]
    pub location: Uuid,

    /// Any day of the week to load
    #[arg(long)]
    pub week: NaiveDate,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct DropArgs {
    #[arg(long)]
    pub shift: Uuid,

    /// Target employee; omit for the unassigned row
    #[arg(long)]
    pub user: Option<Uuid>,

    /// Target day, in the location's offset
    #[arg(long)]
    pub date: NaiveDate,
}

#[derive(Subcommand)]
enum Command {
    /// Keep a week loaded and print every refresh. JSON signals on stdin are
    /// forwarded to the fetcher, e.g. {"event":"shift-updated","location_id":"..."}
    Watch {
        #[command(flatten)]
        week: WeekArgs,
    },
    /// List overlapping shifts and shifts on approved leave
    Conflicts {
        #[command(flatten)]
        week: WeekArgs,
        #[arg(long)]
        json: bool,
    },
    /// Hours, overtime and variance per employee
    Stats {
        #[command(flatten)]
        week: WeekArgs,
        #[arg(long)]
        json: bool,
    },
    /// Move a shift to another employee and/or day
    Move {
        #[command(flatten)]
        week: WeekArgs,
        #[command(flatten)]
        target: DropArgs,
    },
    /// Copy a shift onto another employee and/or day
    Duplicate {
        #[command(flatten)]
        week: WeekArgs,
        #[command(flatten)]
        target: DropArgs,
    },
    Delete {
        #[command(flatten)]
        week: WeekArgs,
        #[arg(long)]
        shift: Uuid,
    },
    /// Publish a draft rota
    Publish {
        #[command(flatten)]
        week: WeekArgs,
    },
    /// Lock a published rota
    Lock {
        #[command(flatten)]
        week: WeekArgs,
    },
    /// Create the same absence for several employees
    Absences {
        #[arg(long = "user", required = true)]
        users: Vec<Uuid>,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
        #[arg(long, default_value = "pending")]
        status: LeaveStatus,
        #[arg(long = "type")]
        leave_type: Option<String>,
        #[arg(long)]
        reason: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::logging::init(Some("planner=info,services=info"));

    let cli = Cli::parse();
    let config = PlannerConfig::load(cli.config.as_deref())?;
    info!(api_url = %config.api_url, "Using rota API");
    let ctx = PlannerContext::from_config(config, Arc::new(TracingNotifier))?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));
    let session = Session::new(ctx, cancel);

    match cli.command {
        Command::Watch { week } => session.watch(&week).await,
        Command::Conflicts { week, json } => session.conflicts(&week, json).await,
        Command::Stats { week, json } => session.stats(&week, json).await,
        Command::Move { week, target } => session.edit(&week, Edit::Move(target)).await,
        Command::Duplicate { week, target } => {
            session.edit(&week, Edit::Duplicate(target)).await
        }
        Command::Delete { week, shift } => session.edit(&week, Edit::Delete(shift)).await,
        Command::Publish { week } => session.transition(&week, RotaStatus::Published).await,
        Command::Lock { week } => session.transition(&week, RotaStatus::Locked).await,
        Command::Absences {
            users,
            start,
            end,
            status,
            leave_type,
            reason,
        } => {
            session
                .absences(&users, start, end, status, leave_type, reason)
                .await
        }
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for ctrl-c");
        return;
    }
    info!("Interrupted, stopping");
    cancel.cancel();
}
