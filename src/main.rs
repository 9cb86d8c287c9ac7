//! CLI entry point for `channel-dl`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use channel_dl::classifier::classify;
use channel_dl::{
    Classification, Config, ExportSource, FormatFilter, MessageSource, Order, Pipeline,
    TerminalProgress, shutdown,
};

/// Number of recent messages inspected by `check`
const CHECK_WINDOW: usize = 50;

/// Exit code reported after an operator interrupt
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "channel-dl", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// TOML configuration file; flags and environment variables override it
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(flatten)]
    settings: Settings,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable progress bars and per-file notes
    #[arg(long, global = true)]
    no_progress: bool,

    /// Print the final statistics as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download media from the channel history (default)
    Run,
    /// Verify the channel can be read and show the latest matching file
    Check,
}

/// Settings that can come from flags, the environment or a `.env` file
///
/// Every field is optional: an unset field keeps the value from the
/// configuration file. Switches take an explicit value (`--debug=false`,
/// `DEBUG=0`) to turn a setting off again.
#[derive(Args)]
struct Settings {
    /// Channel to read (path of the channel history export)
    #[arg(long, global = true, env = "CHANNEL_USERNAME")]
    channel: Option<String>,

    /// Maximum number of messages to read
    #[arg(long, global = true, env = "HISTORY_LIMIT", value_name = "N")]
    limit: Option<usize>,

    /// Read the history oldest message first
    #[arg(
        long,
        global = true,
        env = "REVERSE_ORDER",
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    oldest_first: Option<bool>,

    /// Allowed extensions, comma separated
    #[arg(
        long,
        global = true,
        env = "ALLOWED_FORMATS",
        value_delimiter = ',',
        value_name = "EXT,..."
    )]
    formats: Vec<String>,

    /// Download every format, ignoring the allow-list
    #[arg(
        long = "all",
        global = true,
        env = "DOWNLOAD_ALL",
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    download_all: Option<bool>,

    /// Output directory (default: downloads/<channel>)
    #[arg(short, long, global = true, env = "OUTPUT_DIR", value_name = "DIR")]
    output: Option<PathBuf>,

    /// Attempts per file before giving up
    #[arg(long, global = true, env = "MAX_RETRIES", value_name = "N")]
    max_retries: Option<u32>,

    /// Messages processed concurrently
    #[arg(long, global = true, env = "CONCURRENCY", value_name = "N")]
    concurrency: Option<usize>,

    /// Report filtered and skipped files too
    #[arg(
        long,
        global = true,
        env = "DEBUG",
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    debug: Option<bool>,
}

impl Settings {
    fn apply(&self, config: &mut Config) {
        if let Some(channel) = &self.channel {
            config.source.channel = channel.clone();
        }
        if let Some(limit) = self.limit {
            config.source.history_limit = Some(limit);
        }
        if let Some(oldest_first) = self.oldest_first {
            config.source.order = if oldest_first {
                Order::OldestFirst
            } else {
                Order::NewestFirst
            };
        }
        if !self.formats.is_empty() {
            config.filter.allowed_formats = self.formats.clone();
        }
        if let Some(download_all) = self.download_all {
            config.filter.download_all = download_all;
        }
        if let Some(output) = &self.output {
            config.download.output_dir = Some(output.clone());
        }
        if let Some(max_retries) = self.max_retries {
            config.retry.max_attempts = max_retries;
        }
        if let Some(concurrency) = self.concurrency {
            config.download.concurrency = concurrency;
        }
        if let Some(debug) = self.debug {
            config.download.debug = debug;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Settings may live in a .env file next to the working directory
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let progress = if cli.no_progress || cli.json {
        TerminalProgress::hidden()
    } else {
        TerminalProgress::new()
    };
    init_logging(log_verbosity(cli.verbose, &config), &progress);

    let result = match cli.command.as_ref().unwrap_or(&Commands::Run) {
        Commands::Run => cmd_run(&cli, config, progress).await,
        Commands::Check => cmd_check(&config).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `-v` count, raised to debug level when the debug setting is on
fn log_verbosity(verbose: u8, config: &Config) -> u8 {
    if config.download.debug {
        verbose.max(2)
    } else {
        verbose
    }
}

fn init_logging(verbose: u8, progress: &TerminalProgress) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let progress = progress.clone();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(move || progress.log_writer())
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    cli.settings.apply(&mut config);
    config.validate()?;
    Ok(config)
}

async fn cmd_run(
    cli: &Cli,
    config: Config,
    progress: TerminalProgress,
) -> anyhow::Result<ExitCode> {
    let config = Arc::new(config);

    let source = Arc::new(
        ExportSource::open(&config.source.channel)
            .await
            .context("failed to open the channel")?,
    );
    let channel = source.channel_info().await?;

    let cancel = CancellationToken::new();
    let listener = shutdown::cancel_on_signal(cancel.clone());

    let pipeline = Pipeline::new(
        config.clone(),
        source.clone(),
        Arc::new(progress),
        cancel.clone(),
    );
    pipeline.prepare().await?;

    if !cli.json {
        println!("Downloading media from: {}", channel.title);
        println!("Allowed formats: {}", pipeline.filter().describe());
        println!("Saving to: {}", pipeline.output_dir().display());
    }

    let messages = source.messages(config.source.history_limit, config.source.order);
    let total_hint = config.source.history_limit.map(|limit| limit as u64);
    let report = pipeline.run(messages, total_hint).await;

    // Stop the signal listener
    cancel.cancel();
    let _ = listener.await;

    if report.cancelled {
        eprintln!("\nOperation cancelled by user");
    }
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report.stats)?);
    } else {
        println!("{}", report.stats);
    }

    Ok(if report.cancelled {
        ExitCode::from(EXIT_CANCELLED)
    } else {
        ExitCode::SUCCESS
    })
}

async fn cmd_check(config: &Config) -> anyhow::Result<ExitCode> {

    println!("Checking channel access...");
    let source = ExportSource::open(&config.source.channel)
        .await
        .context("cannot access the channel")?;
    let channel = source.channel_info().await?;

    println!(
        "Successfully accessed channel: {} (ID: {})",
        channel.title, channel.id
    );
    match channel.last_message_at {
        Some(date) => println!("Last message date: {}", date.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("The channel has no dated messages"),
    }

    println!("Looking for the latest matching file...");
    let filter = FormatFilter::new(&config.filter);
    let latest = source
        .messages(Some(CHECK_WINDOW), Order::NewestFirst)
        .filter_map(|message| {
            let found = match classify(&message) {
                Classification::Resolved(descriptor)
                    if filter.should_download(&descriptor.extension) =>
                {
                    Some(descriptor.filename)
                }
                _ => None,
            };
            futures::future::ready(found)
        })
        .next()
        .await;

    match latest {
        Some(filename) => println!("Latest matching file found: {filename}"),
        None => println!(
            "No {} files found in the last {CHECK_WINDOW} messages",
            filter.describe()
        ),
    }

    Ok(ExitCode::SUCCESS)
}
