use std::io::Write;

use anyhow::{anyhow, Context, Result};
use bat::PrettyPrinter;
use clap::Parser;
use cliclack::{input, spinner};
use console::style;
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use interlinq::config::Settings;
use interlinq::models::response::StreamOutcome;
use interlinq::providers::base::{MessageOptions, Provider};
use interlinq::providers::factory::get_provider;
use interlinq::providers::transport::TransportClient;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Override the configured model
    #[arg(short, long)]
    model: Option<String>,

    /// System prompt sent with every message
    #[arg(short, long, default_value = "You are a helpful assistant.")]
    system: String,

    /// Conversation id used for history
    #[arg(short, long, default_value = "cli")]
    conversation: String,

    /// Print the reply as it streams instead of waiting for the full text
    #[arg(long)]
    stream: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::new().context("Failed to load INTERLINQ_* configuration")?;
    let provider_type = settings.provider.provider_type();

    let transport = TransportClient::new(settings.adapter.timeout())?;
    let provider = get_provider(
        settings.provider.into_config(),
        transport,
        settings.adapter.options(),
    )?;

    println!(
        "interlinq chat ({}) {}",
        provider_type,
        style("- type \"exit\" to end the session, \"/clear\" to reset, \"/usage\" for counters")
            .dim()
    );
    println!("\n");

    loop {
        let message_text: String = input("Message:").placeholder("").multiline().interact()?;
        let message_text = message_text.trim();

        match message_text {
            text if text.eq_ignore_ascii_case("exit") => break,
            "/clear" => {
                provider.clear_conversation(&cli.conversation);
                println!("{}\n", style("conversation cleared").dim());
                continue;
            }
            "/usage" => {
                let usage = provider.usage_stats();
                println!(
                    "{}\n",
                    style(format!(
                        "requests: {}  tokens in: {}  tokens out: {}  errors: {}",
                        usage.requests, usage.tokens_in, usage.tokens_out, usage.errors
                    ))
                    .dim()
                );
                continue;
            }
            _ => {}
        }

        let mut options = MessageOptions::new()
            .with_conversation(cli.conversation.clone())
            .with_system_prompt(cli.system.clone());
        if let Some(model) = &cli.model {
            options = options.with_model(model.clone());
        }

        let result = if cli.stream {
            stream_reply(provider.as_ref(), message_text, options).await
        } else {
            complete_reply(provider.as_ref(), message_text, options).await
        };
        if let Err(e) = result {
            println!("{}\n", style(format!("error: {}", e)).red());
        }
    }

    provider.close();
    Ok(())
}

async fn complete_reply(provider: &dyn Provider, text: &str, options: MessageOptions) -> Result<()> {
    let spin = spinner();
    spin.start("awaiting reply");
    let response = provider.send_message(text, options).await;
    spin.stop("");

    render(&response?.content)?;
    println!("\n");
    Ok(())
}

async fn stream_reply(provider: &dyn Provider, text: &str, options: MessageOptions) -> Result<()> {
    let mut stream = provider.stream_message(text, options).await?;
    let mut stdout = std::io::stdout();
    while let Some(delta) = stream.next().await {
        print!("{}", delta?.text);
        stdout.flush()?;
    }
    println!("\n");
    stream_finished(stream.outcome())
}

/// A drained stream that did not complete is reported, not shown as a reply.
fn stream_finished(outcome: StreamOutcome) -> Result<()> {
    match outcome {
        StreamOutcome::Completed => Ok(()),
        StreamOutcome::Incomplete => Err(anyhow!(
            "the reply was cut off before the provider finished and was not kept in the conversation"
        )),
        outcome => Err(anyhow!("the reply ended early ({:?})", outcome)),
    }
}

fn render(content: &str) -> Result<()> {
    PrettyPrinter::new()
        .input_from_bytes(content.as_bytes())
        .language("markdown")
        .print()
        .map_err(|e| anyhow!("Failed to render reply: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_stream_is_reported() {
        assert!(stream_finished(StreamOutcome::Completed).is_ok());

        let err = stream_finished(StreamOutcome::Incomplete).unwrap_err();
        assert!(err.to_string().contains("cut off"));
        assert!(stream_finished(StreamOutcome::Cancelled).is_err());
    }
}
