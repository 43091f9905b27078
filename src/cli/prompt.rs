use ::die::Die;
use std::io::{self, IsTerminal, Read, Write};
use thiserror::Error;
use tokio::{select, signal};

use crate::chat::Message;
use crate::color::{self, MaybePaint};
use crate::config::Config;
use crate::providers::{ErrorKind, FinishReason};
use crate::registry::resolver::Client;
use crate::{die, warn, PromptArgs};

#[derive(Error, Debug)]
enum FetchError {
    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("the endpoint responded with status {0}")]
    BadStatus(reqwest::StatusCode),
}

#[derive(serde::Serialize)]
struct PromptRequest<'i> {
    input: &'i str,
}

/// Strips one level of surrounding quotes and unescapes escaped quotes and
/// backslashes.
fn unquote(input: &str) -> String {
    let input = input.trim();

    let inner = ['"', '\'']
        .iter()
        .find_map(|&q| {
            input
                .strip_prefix(q)
                .and_then(|rest| rest.strip_suffix(q))
        })
        .unwrap_or(input);

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('"' | '\'' | '\\')) => out.push(next),
                Some(next) => {
                    out.push(c);
                    out.push(next);
                }
                None => out.push(c),
            }
        } else {
            out.push(c);
        }
    }

    out
}

/// POSTs the input to an endpoint which answers with the prompt to send.
async fn fetch_prompt(url: &str, input: &str) -> Result<String, FetchError> {
    let input = unquote(input);

    let res = reqwest::Client::new()
        .post(url)
        .json(&PromptRequest { input: &input })
        .send()
        .await?;

    let status = res.status();

    if !status.is_success() {
        return Err(FetchError::BadStatus(status));
    }

    Ok(res.text().await?)
}

fn read_input(args: &PromptArgs) -> String {
    let in_terminal = io::stdin().is_terminal();

    match &args.prompt {
        Some(prompt) => {
            if !in_terminal {
                warn!("a prompt was given as an argument, ignoring standard input");
            }

            prompt.clone()
        }
        None if !in_terminal => {
            let mut buf = String::new();

            io::stdin()
                .read_to_string(&mut buf)
                .die("failed to read the prompt from standard input");

            buf
        }
        None => die!("no prompt was provided, pass one as an argument or through standard input"),
    }
}

fn select_client(clients: Vec<Client>, title: Option<&str>) -> Option<Client> {
    match title {
        Some(title) => clients.into_iter().find(|c| c.title() == title),
        None => clients.into_iter().next(),
    }
}

pub(crate) async fn prompt_cmd(config: &Config, args: &PromptArgs) {
    let input = read_input(args);

    let prompt = match &args.url {
        Some(url) => match fetch_prompt(url, &input).await {
            Ok(prompt) => prompt,
            Err(err) => die!("failed to fetch the prompt from \"{}\": {}", url, err),
        },
        None => input,
    };

    let resolver = super::resolver(config).await;

    let clients = resolver.resolve_all(&config.models).await;

    let client = match select_client(clients, args.model.as_deref()) {
        Some(client) => client,
        None => match &args.model {
            Some(title) => die!("no resolved model is titled \"{}\"", title),
            None => die!("no models could be resolved, check the configuration"),
        },
    };

    let out_terminal = io::stdout().is_terminal();

    let mut completion = match client
        .stream_completion(&[Message::user(prompt)], None)
        .await
    {
        Ok(completion) => completion,
        Err(err) if err.kind() == ErrorKind::Authentication => die!(
            "completion for \"{}\" was refused, check the api key: {}",
            client.title(),
            err
        ),
        Err(err) => die!("completion for \"{}\" failed: {}", client.title(), err),
    };

    let mut stdout = io::stdout();

    if out_terminal {
        let header = format!("[{}] ", client.title());
        print!("{}", color::MODEL_PROMPT.maybe_paint(header));
    }

    loop {
        select! {
            update = completion.next() => {
                let delta = match update {
                    Some(Ok(delta)) => delta,
                    Some(Err(err)) => die!("failed to decode streaming response: {}", err),
                    None => break,
                };

                print!("{}", delta.content);
                stdout.flush().die("failed to flush the output stream");
            }
            _ = signal::ctrl_c() => {
                break;
            }
        }
    }

    println!();

    if completion.finish_reason() == Some(FinishReason::Length) {
        warn!("the response was truncated at the token limit");
    }

    if let Some(usage) = completion.usage() {
        tracing::debug!(
            "usage: prompt_tokens={:?} completion_tokens={:?}",
            usage.prompt_tokens,
            usage.completion_tokens
        );
    }
}
