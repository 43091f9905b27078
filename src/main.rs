mod chat;
mod cli;
mod color;
mod config;
mod providers;
mod registry;
mod utils;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use cli::{list::list_cmd, prompt::prompt_cmd, resolve::resolve_cmd, ColorMode};
use tracing_subscriber::EnvFilter;

#[derive(
    Parser, Default, Clone, Copy, ValueEnum, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum RequestedColorMode {
    #[default]
    Auto,
    On,
    Off,
}

#[derive(Parser)]
#[command(name = "modelres")]
#[command(
    about = "Resolve model configurations into chat model clients",
    version = "0.0.1"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(long, default_value_t = RequestedColorMode::default())]
    color: RequestedColorMode,
    /// Read the configuration from this file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the configured models
    Resolve(ResolveArgs),
    /// List registry objects
    List(ListArgs),
    /// Stream a single completion
    Prompt(PromptArgs),
}

/// Output formats
#[derive(
    Parser, ValueEnum, Default, Clone, Copy, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum ListingFormat {
    /// Format the output as a table
    #[default]
    Table,
    /// Format the output as JSON
    Json,
    /// Format the output as a table without a header
    HeaderlessTable,
}

#[derive(Parser)]
pub(crate) struct ResolveArgs {
    /// Output the listing with the specified format
    #[arg(short, long, default_value_t = ListingFormat::default())]
    format: ListingFormat,
}

/// Possible listings
#[derive(Subcommand)]
pub(crate) enum ListObject {
    /// Registered provider adapters
    Providers,
}

#[derive(Parser)]
pub(crate) struct ListArgs {
    /// Output the listing with the specified format
    #[arg(short, long, default_value_t = ListingFormat::default())]
    format: ListingFormat,
    /// List the specified object
    #[command(subcommand)]
    object: ListObject,
}

#[derive(Parser, Default)]
pub(crate) struct PromptArgs {
    /// Title of the resolved model to prompt, defaults to the first
    #[arg(short, long)]
    model: Option<String>,
    /// POST the input to this URL and use the response as the prompt
    #[arg(long)]
    url: Option<String>,
    /// The prompt, read from standard input when omitted
    prompt: Option<String>,
}

fn init_tracing(color: ColorMode) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(matches!(color, ColorMode::On))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let color = ColorMode::resolve_auto(cli.color);

    color::configure_color(color);
    init_tracing(color);

    match &cli.command {
        Commands::Resolve(args) => {
            let config = config::read_config(cli.config.clone());
            resolve_cmd(&config, args).await
        }
        Commands::List(args) => list_cmd(args),
        Commands::Prompt(args) => {
            let config = config::read_config(cli.config.clone());
            prompt_cmd(&config, args).await
        }
    }
}
