use anyhow::{Context, Result};
use clap::Parser;
use medchat::app::{ChatApi, ChatApp};
use medchat::chat::{EXIT_MESSAGE, GREETING};
use medchat::{config, logging};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(
    name = "medchat-cli",
    about = "Chat with the medchat assistant from a terminal"
)]
struct Cli {
    /// Conversation key; reuse it to continue the same history.
    #[arg(long, default_value = "1")]
    session: String,
    /// Send a single message, print the reply, and exit.
    #[arg(long)]
    message: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    config::init_config();
    logging::init_tracing(true);
    let app = ChatApp::new().await;

    if let Some(message) = cli.message {
        println!("{}", last_reply(app.chat(&cli.session, &message).await));
        return Ok(());
    }

    println!("Bot: {GREETING}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush().context("failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };
        let reply = last_reply(app.chat(&cli.session, &line).await);
        println!("Bot: {reply}");
        if reply == EXIT_MESSAGE {
            break;
        }
    }
    Ok(())
}

fn last_reply(transcript: Vec<(String, String)>) -> String {
    transcript
        .into_iter()
        .last()
        .map(|(_, bot)| bot)
        .unwrap_or_default()
}
