mod commands;
mod config;
mod context;
mod devops;
mod discovery;
mod error;
mod export;
mod output;
mod pipeline;
mod publish;
mod results;
mod telemetry;
mod traits;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{
    CreateReposCommand, DiscoverCommand, ExportArgs, ExportCommand, FindSpnCommand,
    GroupBySpnCommand, MatrixCommand,
};
use config::{Config, DEFAULT_CONFIG_PATH};
use context::Context;
use std::path::{Path, PathBuf};
use traits::RealFileSystem;

#[derive(Parser)]
#[command(name = "aztf-backup")]
#[command(about = "Export Azure subscriptions to Terraform with aztfexport and back them up to Azure DevOps", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level: debug, info, warning or error
    #[arg(long, global = true, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Path to the subscriptions configuration file
    #[arg(short, long, global = true, env = "CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export subscriptions to Terraform and optionally push them to Git
    Export {
        /// Export only this subscription
        #[arg(long)]
        subscription_id: Option<String>,

        /// Base output directory (overrides output.base_dir)
        #[arg(short, long, env = "OUTPUT_DIR")]
        output_dir: Option<String>,

        /// Push exports to their repositories (overrides git.push_to_repos and PUSH_TO_REPOS)
        #[arg(long, overrides_with = "no_push")]
        push: bool,

        /// Keep exports local only
        #[arg(long, overrides_with = "push")]
        no_push: bool,

        /// Base branch name for pushes (overrides git.branch)
        #[arg(long, env = "GIT_BRANCH")]
        branch: Option<String>,

        /// Log Analytics workspace id
        #[arg(long, env = "LOG_ANALYTICS_WORKSPACE_ID", hide_env_values = true)]
        workspace_id: Option<String>,

        /// Log Analytics shared key
        #[arg(long, env = "LOG_ANALYTICS_SHARED_KEY", hide_env_values = true)]
        shared_key: Option<String>,

        /// Azure DevOps personal access token (falls back to SYSTEM_ACCESS_TOKEN)
        #[arg(long, env = "AZURE_DEVOPS_PAT", hide_env_values = true)]
        pat: Option<String>,
    },

    /// Write the service connection a subscription uses to a file
    FindSpn {
        #[arg(long)]
        subscription_id: String,

        /// Service connection used when no override is configured
        #[arg(long)]
        default_spn: String,

        /// File that receives the service connection name
        #[arg(long)]
        output: PathBuf,
    },

    /// Build a pipeline matrix with one job per subscription
    Matrix {
        /// Comma-separated subscription ids
        #[arg(long)]
        subscription_ids: String,

        #[arg(long)]
        default_spn: String,

        /// File that receives the matrix JSON
        #[arg(long)]
        output: PathBuf,
    },

    /// Build a pipeline matrix with one job per service connection
    GroupBySpn {
        /// JSON file listing subscriptions
        #[arg(long)]
        subscriptions: PathBuf,

        #[arg(long)]
        default_spn: String,

        /// File that receives the matrix JSON
        #[arg(long)]
        output: PathBuf,
    },

    /// Print the subscriptions a scheduled run should process as a matrix
    Discover {
        /// Restrict to a schedule defined under `schedules`
        #[arg(long)]
        schedule: Option<String>,
    },

    /// Create one Azure DevOps repository per configured subscription
    CreateRepos {
        /// Azure DevOps personal access token (falls back to SYSTEM_ACCESS_TOKEN)
        #[arg(long, env = "AZURE_DEVOPS_PAT", hide_env_values = true)]
        pat: Option<String>,
    },
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = ctrlc::set_handler(|| {
        eprintln!("\n\nExport cancelled by user");
        std::process::exit(1);
    }) {
        output::warning(output::Stream::Stderr, &format!("Could not install Ctrl-C handler: {}", e));
    }

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            output::error(&format!("{:#}", e));
            1
        }
    };

    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let Some(config) = load_config(&cli.config) else {
        return Ok(1);
    };
    let level = config::resolve_log_level(cli.log_level.as_deref(), Some(&config));

    match cli.command {
        Commands::Export {
            subscription_id,
            output_dir,
            push,
            no_push,
            branch,
            workspace_id,
            shared_key,
            pat,
        } => {
            let args = ExportArgs {
                config_path: cli.config.clone(),
                subscription_id,
                output_dir,
                push: push_override(push, no_push),
                branch,
                workspace_id,
                shared_key,
                pat: commands::devops_pat(pat),
            };
            ExportCommand::execute(&Context::new(level), config, &args)
        }
        Commands::FindSpn {
            subscription_id,
            default_spn,
            output,
        } => FindSpnCommand::execute(
            &Context::new(level),
            &config,
            &subscription_id,
            &default_spn,
            &output,
        ),
        Commands::Matrix {
            subscription_ids,
            default_spn,
            output,
        } => MatrixCommand::execute(
            &Context::new(level),
            &config,
            &subscription_ids,
            &default_spn,
            &output,
        ),
        Commands::GroupBySpn {
            subscriptions,
            default_spn,
            output,
        } => GroupBySpnCommand::execute(
            &Context::new(level),
            &config,
            &subscriptions,
            &default_spn,
            &output,
        ),
        Commands::Discover { schedule } => {
            DiscoverCommand::execute(&Context::diagnostics_only(level), &config, schedule.as_deref())
        }
        Commands::CreateRepos { pat } => {
            let pat = commands::devops_pat(pat);
            CreateReposCommand::execute(&Context::new(level), &config, pat.as_deref())
        }
    }
}

/// Load the configuration, reporting failures on stderr
fn load_config(path: &Path) -> Option<Config> {
    match config::load(&RealFileSystem, path) {
        Ok(config) => Some(config),
        Err(e) => {
            output::error(&e.to_string());
            if let Some(hint) = e.remediation() {
                output::info(output::Stream::Stderr, hint);
            }
            None
        }
    }
}

/// `--push`/`--no-push`, else `PUSH_TO_REPOS=true|false`, else the config value
fn push_override(push: bool, no_push: bool) -> Option<bool> {
    if push {
        return Some(true);
    }
    if no_push {
        return Some(false);
    }
    match std::env::var("PUSH_TO_REPOS")
        .unwrap_or_default()
        .trim()
        .to_lowercase()
        .as_str()
    {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
