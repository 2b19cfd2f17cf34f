//! dbf-tool - inspect and append to DBF tables
//!
//! Thin command-line front end over the DBF engine.

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use dbf_engine::Charset;

mod commands;
mod config;

use config::ToolConfig;

/// dbf-tool - inspect and append to DBF tables
#[derive(Parser, Debug)]
#[command(name = "dbf-tool")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ./dbf-tool.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Character set of names and text fields (utf8, latin1, gbk, big5, ...)
    #[arg(long, global = true)]
    charset: Option<Charset>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show header fields and column layout
    Info {
        table: PathBuf,
    },

    /// Print records
    Dump {
        table: PathBuf,

        /// First record index
        #[arg(long)]
        start: Option<u32>,

        /// One past the last record index
        #[arg(long)]
        end: Option<u32>,

        /// Worker threads for reading
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Create an empty table
    Create {
        table: PathBuf,

        /// Column definition NAME:TYPE:LEN[:DEC], repeatable
        #[arg(short, long = "field", required = true)]
        fields: Vec<String>,
    },

    /// Append one record given as COLUMN=VALUE pairs
    Append {
        table: PathBuf,

        values: Vec<String>,

        /// Attempts to repeat after a concurrent modification
        #[arg(short, long)]
        retries: Option<u32>,
    },
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ToolConfig::load(args.config.as_deref())?;
    if let Some(charset) = args.charset {
        config.charset = charset;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    // Set up logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&config.log_level))
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    debug!("Using {:?}", config);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Command::Info { table } => commands::info(&table, config.charset, &mut out),
        Command::Dump {
            table,
            start,
            end,
            workers,
        } => commands::dump(
            &table,
            config.charset,
            start,
            end,
            workers.unwrap_or(config.workers),
            &mut out,
        ),
        Command::Create { table, fields } => commands::create(&table, config.charset, &fields),
        Command::Append {
            table,
            values,
            retries,
        } => commands::append(
            &table,
            config.charset,
            &values,
            retries.unwrap_or(config.append_retries),
        ),
    }
}
