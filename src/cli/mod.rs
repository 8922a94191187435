//! # Command line front end
//!
//! Thin shell over the command layer, for scripting and CI use:
//! `dmapi send GET '{{baseUrl}}/health'`, `dmapi history --limit 5`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::codec::KeyValues;
use crate::commands::{
    collection_commands, environment_commands, history_commands, request_commands, Ack,
    CommandError,
};
use crate::config::Config;
use crate::context::AppContext;
use crate::error::{AppError, Result};
use crate::http::method::HttpMethod;
use crate::http::request::OutboundRequest;

#[derive(Parser, Debug)]
#[command(name = "dmapi", version, about = "Send API requests and browse their history")]
pub struct Cli {
    /// TOML config file; defaults apply for anything it leaves out
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Directory holding the database (overrides config and DMAPI_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a request and record it in history
    Send {
        method: HttpMethod,
        url: String,
        /// Header as `Name: value`; repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Request body
        #[arg(short = 'd', long = "data")]
        body: Option<String>,
    },
    /// Show the most recent executions
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List collections with their child counts
    Collections,
    /// List environments
    Environments,
    /// Make an environment the active one
    Activate { id: i64 },
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        let mut config = config.with_env_overrides()?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        Ok(config)
    }
}

/// Runs one command. Failures carry the same kind and message an IPC caller
/// would receive.
pub async fn run(cli: Cli) -> std::result::Result<(), CommandError> {
    let config = cli.load_config()?;
    let ctx = AppContext::open(config)?;
    let outcome = execute(&ctx, &cli).await;
    ctx.close()?;
    outcome
}

async fn execute(ctx: &AppContext, cli: &Cli) -> std::result::Result<(), CommandError> {
    let format = cli.format;
    match &cli.command {
        Command::Send {
            method,
            url,
            headers,
            body,
        } => {
            let request = OutboundRequest {
                method: *method,
                url: url.clone(),
                headers: parse_header_args(headers)?,
                body: body.clone(),
            };
            let ack = request_commands::send_request(ctx, request).await?;
            emit(format, &ack, |execution| {
                let response = &execution.response;
                format!(
                    "{} {} ({} ms, {} bytes)\n{}",
                    response.status,
                    response.status_text,
                    execution.elapsed_ms,
                    response.size,
                    response.formatted_body
                )
            })
        }
        Command::History { limit } => {
            let ack = history_commands::get_recent_history(ctx, *limit)?;
            emit(format, &ack, |entries| {
                entries
                    .iter()
                    .map(|item| {
                        let status = item
                            .entry
                            .response_status
                            .map_or_else(|| "ERR".to_string(), |status| status.to_string());
                        format!(
                            "{:>5}  {:<4} {:<7} {}  {}",
                            item.entry.id,
                            status,
                            item.method,
                            item.url,
                            item.entry.executed_at.format("%Y-%m-%d %H:%M:%S")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Command::Collections => {
            let ack = collection_commands::get_collection_tree(ctx)?;
            emit(format, &ack, |nodes| {
                nodes
                    .iter()
                    .map(|node| {
                        let parent = node
                            .collection
                            .parent_id
                            .map_or_else(|| "-".to_string(), |id| id.to_string());
                        format!(
                            "{:>5}  {}  (parent {parent}, {} children)",
                            node.collection.id, node.collection.name, node.child_count
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Command::Environments => {
            let ack = environment_commands::list_environments(ctx)?;
            emit(format, &ack, |envs| {
                envs.iter()
                    .map(|env| {
                        let marker = if env.is_active { "*" } else { " " };
                        format!("{marker} {:>4}  {}", env.id, env.name)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Command::Activate { id } => {
            let ack = environment_commands::set_active_environment(ctx, *id)?;
            emit(format, &ack, |env| format!("active environment: {}", env.name))
        }
    }
}

fn emit<T: Serialize>(
    format: OutputFormat,
    ack: &Ack<T>,
    text: impl FnOnce(&T) -> String,
) -> std::result::Result<(), CommandError> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(ack)
                .map_err(|err| AppError::InvalidRequest(format!("cannot encode output: {err}")))?;
            println!("{json}");
        }
        OutputFormat::Text => {
            if let Some(data) = &ack.data {
                println!("{}", text(data));
            }
        }
    }
    Ok(())
}

/// Parses repeated `Name: value` header arguments.
pub fn parse_header_args(args: &[String]) -> Result<KeyValues> {
    let mut headers = KeyValues::new();
    for raw in args {
        let (key, value) = raw
            .split_once(':')
            .ok_or_else(|| AppError::InvalidRequest(format!("invalid header format: {raw}")))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::InvalidRequest(format!("header key is empty: {raw}")));
        }
        headers.insert(key.to_string(), value.trim().to_string());
    }
    Ok(headers)
}
