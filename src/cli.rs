use std::io::{self, IsTerminal};
use std::sync::Arc;

use crate::config::Config;
use crate::providers::log::{FileLogSink, TracingLogSink};
use crate::providers::SharedLogSink;
use crate::registry::{Registry, Resolver};
use crate::{die, ListingFormat, RequestedColorMode};

pub(crate) mod list;
pub(crate) mod prompt;
pub(crate) mod resolve;
mod table;

use table::IntoTable;

#[derive(Clone, Copy, strum_macros::Display)]
pub(crate) enum ColorMode {
    On,
    Off,
}

impl ColorMode {
    /// Returns whether ANSI color should be used
    /// If the user has specified a preference, this is honored. This preference
    /// can be specified through the command line or the "NO_COLOR" environment
    /// variable If the user hasn't stated a preference, color is enabled if the
    /// output is a terminal.
    pub(crate) fn resolve_auto(cm: RequestedColorMode) -> ColorMode {
        match cm {
            RequestedColorMode::Auto => {
                let disable_color =
                    std::env::var_os("NO_COLOR").is_some() || !io::stderr().is_terminal();

                if disable_color {
                    ColorMode::Off
                } else {
                    ColorMode::On
                }
            }
            RequestedColorMode::On => ColorMode::On,
            RequestedColorMode::Off => ColorMode::Off,
        }
    }
}

async fn log_sink(config: &Config) -> SharedLogSink {
    match &config.prompt_log {
        Some(path) => match FileLogSink::open(path).await {
            Ok(sink) => Arc::new(sink),
            Err(err) => die!("failed to open prompt log \"{}\": {}", path.display(), err),
        },
        None => Arc::new(TracingLogSink),
    }
}

/// Builds the resolver every subcommand works from.
pub(crate) async fn resolver(config: &Config) -> Resolver {
    let unique_id = config.unique_id();

    tracing::debug!("correlation id is {}", unique_id);

    Resolver::new(Registry::builtin(), unique_id, log_sink(config).await)
        .with_platform(config.platform.clone())
        .with_proxy(config.proxy.clone())
}

pub(crate) fn format_output<O: IntoTable + serde::Serialize>(object: O, format: ListingFormat) {
    match format {
        ListingFormat::Json => {
            let output = match serde_json::to_string_pretty(&object) {
                Ok(output) => output,
                Err(err) => die!("failed to serialize output: {}", err),
            };

            println!("{}", output);
        }
        ListingFormat::Table => {
            let tab = object.into_table();

            print!("{}", tab);
        }
        ListingFormat::HeaderlessTable => {
            let mut tab = object.into_table();

            tab.print_header(false);

            print!("{}", tab);
        }
    }
}
