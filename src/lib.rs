mod auth;
pub mod checker_cms;
pub mod checker_dns;
pub mod checker_mysql;
pub mod checker_php;
pub mod checker_vm;
pub mod checker_web;
mod commands_node;
mod commands_run;
pub mod compare;
pub mod config;
pub mod db;
pub mod error;
pub mod formatter;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod scoring;
pub mod security;
pub mod ssh_client;
pub mod state;
pub mod task_helpers;
pub mod task_types;
pub mod task_worker;
#[cfg(test)]
mod test_support;
pub mod utils;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use config::GraderConfig;
pub use models::{CheckResult, HostCredential, PipelineEvent, RunSummary, TestSpec};
pub use pipeline::Pipeline;
pub use state::GraderState;
pub use task_worker::{RunHandle, WorkerPool};

use db::Database;
use models::{NodeUpsertPayload, DEFAULT_SSH_PORT};

#[derive(Parser, Debug)]
#[command(name = "ukk-grader", version, about = "Grade UKK practical exam environments over SSH")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Grade one attempt and stream the results as JSON lines
    Run {
        /// Test spec (JSON)
        #[arg(long)]
        spec: PathBuf,
        /// Candidate identity used for the leaderboard
        #[arg(long)]
        identity: Option<String>,
    },
    /// Manage the hypervisor nodes searched for exam VMs
    Nodes {
        #[command(subcommand)]
        command: NodeCommands,
    },
    /// Show the leaderboard
    Leaderboard,
}

#[derive(Subcommand, Debug)]
enum NodeCommands {
    Add {
        #[arg(long)]
        host: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value_t = DEFAULT_SSH_PORT)]
        port: u16,
    },
    List,
    Remove {
        id: String,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|error| format!("Failed to encode output: {error}"))?;
    println!("{text}");
    Ok(())
}

async fn dispatch(cli: Cli) -> Result<(), String> {
    let config = GraderConfig::load(cli.config.as_deref())?;
    let database = Database::open(&config.database_path)?;

    match cli.command {
        Commands::Run { spec, identity } => {
            commands_run::run_grading(&config, &database, &spec, identity).await
        }
        Commands::Nodes { command } => match command {
            NodeCommands::Add {
                host,
                user,
                password,
                port,
            } => {
                let payload = NodeUpsertPayload {
                    host,
                    user,
                    password,
                    port,
                };
                print_json(&commands_node::node_add(&database, payload)?)
            }
            NodeCommands::List => print_json(&commands_node::node_list(&database)?),
            NodeCommands::Remove { id } => commands_node::node_remove(&database, &id),
        },
        Commands::Leaderboard => print_json(&commands_node::leaderboard_list(&database)?),
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("error: failed to start async runtime: {error}");
            return ExitCode::FAILURE;
        }
    };
    let outcome = runtime.block_on(dispatch(cli));
    // stdin is read on a blocking thread that may never return
    runtime.shutdown_background();

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}
