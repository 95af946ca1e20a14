use clap::{Parser, Subcommand};
use nanoid::nanoid;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ragmem::config::Config;
use ragmem::models::AskResponse;
use ragmem::state::AppState;

const EXIT_WORDS: &[&str] = &["sair", "exit", "quit"];

#[derive(Parser)]
#[command(name = "ragmem")]
#[command(about = "Ask questions about indexed documents with per-session conversation memory")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search the document index and print the matches
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Ask a single question within a session
    Ask {
        message: String,
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        session_id: String,
    },
    /// Interactive conversation on stdin
    Chat {
        #[arg(long)]
        user_id: String,
        /// Generated when omitted
        #[arg(long)]
        session_id: Option<String>,
    },
    /// List indexed document pages
    Documents,
    /// Check the vector store connection
    Health,
    /// Print the stored messages of a session
    History {
        #[arg(long)]
        session_id: String,
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "ragmem=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env();
    let state = AppState::from_config(config)?;

    let outcome = run(args.command, &state).await;
    if let Err(e) = &outcome {
        tracing::error!(error = %e, "Command failed");
    }
    outcome
}

async fn run(command: Command, state: &AppState) -> anyhow::Result<()> {
    match command {
        Command::Search { query, limit } => {
            let limit = limit.unwrap_or(state.config.retrieval.default_limit);
            let result = state.orchestrator.search_with_limit(&query, limit).await?;
            println!("{}", result.summary(state.config.retrieval.display_length));
        }
        Command::Ask {
            message,
            user_id,
            session_id,
        } => {
            let response = state.orchestrator.ask(&message, &user_id, &session_id).await?;
            print_answer(&response);
        }
        Command::Chat {
            user_id,
            session_id,
        } => {
            let session_id = session_id.unwrap_or_else(|| nanoid!());
            chat(state, &user_id, &session_id).await?;
        }
        Command::Documents => {
            let documents = state.orchestrator.retriever().list_documents().await?;
            if documents.is_empty() {
                println!("No documents indexed");
            }
            for document in documents {
                println!("{} (page {})", document.document_name, document.page_number);
            }
        }
        Command::Health => {
            let healthy = state.orchestrator.retriever().health_check().await?;
            println!("vector store: {}", if healthy { "ok" } else { "unavailable" });
            if !healthy {
                anyhow::bail!("vector store health check failed");
            }
        }
        Command::History { session_id, limit } => {
            let sessions = state.orchestrator.sessions();
            let limit = limit.unwrap_or(sessions.history_limit());
            let messages = sessions.history(&session_id, limit).await?;
            if messages.is_empty() {
                println!("No messages for session {session_id}");
            }
            for message in messages {
                println!(
                    "[{}] {}: {}",
                    message.created_at.format("%Y-%m-%d %H:%M:%S"),
                    message.role,
                    message.content
                );
            }
        }
    }
    Ok(())
}

async fn chat(state: &AppState, user_id: &str, session_id: &str) -> anyhow::Result<()> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    println!("Session {session_id}. Type 'sair' to leave.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            _ = cancel_token.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };

        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&message.to_lowercase().as_str()) {
            break;
        }

        tokio::select! {
            _ = cancel_token.cancelled() => break,
            response = state.orchestrator.ask(message, user_id, session_id) => match response {
                Ok(response) => print_answer(&response),
                Err(e) => {
                    tracing::warn!(session_id, error = %e, "Turn failed");
                    eprintln!("error: {e}");
                }
            },
        }
    }

    tracing::info!(session_id, "Chat ended");
    Ok(())
}

fn print_answer(response: &AskResponse) {
    println!("{}", response.answer);
    let metadata = &response.metadata;
    if metadata.retrieval_degraded {
        eprintln!("(answered without documents: retrieval unavailable)");
    }
    for warning in &metadata.warnings {
        eprintln!("warning: {warning}");
    }
}
