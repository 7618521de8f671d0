use std::io::{self, Write};
use std::sync::Arc;

use clap::Parser;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use codeservice_client::cli::{default_log_filter, Args};
use codeservice_client::config::parse_method;
use codeservice_client::{ChatHistory, ClientConfig, FileStore, KeyValueStore, MemoryStore, Session, SessionState};

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_history(history: &ChatHistory) {
    if history.is_empty() {
        println!("{}", "No saved exchanges.".bright_black());
        return;
    }
    for exchange in history.exchanges() {
        println!("{} {}", "Q:".bright_yellow().bold(), exchange.question);
        match &exchange.answer {
            Some(answer) => println!("{} {}", "A:".bright_green().bold(), answer),
            None => println!("{} {}", "A:".bright_green().bold(), "(no answer)".bright_black()),
        }
        println!("{}", "-".repeat(50).bright_blue());
    }
}

async fn ask(session: &mut Session, prompt: &str, stream: bool) -> codeservice_client::Result<()> {
    if stream {
        session
            .submit_streaming(prompt, |fragment| {
                print!("{fragment}");
                let _ = io::stdout().flush();
            })
            .await?;
        println!();
    } else {
        let answer = session.submit(prompt).await?;
        println!("{answer}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = ClientConfig::load(args.config.as_deref())?;
    if let Some(deadline) = args.deadline() {
        config.request_timeout = deadline;
    }
    if let Some(method) = &args.method {
        config.submit_method = parse_method(method)?;
    }

    let store: Arc<dyn KeyValueStore> = if args.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(FileStore::open(&args.store)?)
    };
    let mut session = Session::new(config, store)?;

    if args.history {
        print_history(session.history());
        return Ok(());
    }

    eprintln!("{}", "Authorizing...".bright_yellow());
    if session.authorize().await.is_err() {
        let message = match session.state() {
            SessionState::Failed(msg) => msg.clone(),
            _ => "Authorization failed".to_string(),
        };
        eprintln!("{}", message.bright_red());
        std::process::exit(1);
    }

    if let Some(prompt) = &args.prompt {
        ask(&mut session, prompt, args.stream).await?;
        return Ok(());
    }

    eprintln!("{}", "Ready. Enter a question per line, Ctrl-D to quit.".bright_green());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if let Err(e) = ask(&mut session, prompt, args.stream).await {
            eprintln!("{} {}", "Request failed:".bright_red(), e);
        }
        println!("{}", "=".repeat(50).bright_blue());
    }

    Ok(())
}
