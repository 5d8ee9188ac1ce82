//! Quiz night: a runnable Quizlive server with a small geography quiz.
//!
//! ```text
//! cargo run -p quiz-night
//! QUIZLIVE_BIND=0.0.0.0:9000 QUIZ_NIGHT_HISTORY=history.jsonl cargo run -p quiz-night
//! ```
//!
//! Clients authenticate with any non-empty token, which becomes their user
//! id. Connect without a token to play anonymously.

use std::sync::Arc;

use quizlive::prelude::*;
use tracing_subscriber::EnvFilter;

const BUILTIN_CATALOG: &str = include_str!("../catalog.json");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,quizlive=debug")),
        )
        .init();

    let catalog_json = match std::env::var("QUIZ_NIGHT_CATALOG") {
        Ok(path) => {
            tracing::info!(%path, "loading catalog");
            std::fs::read_to_string(path)?
        }
        Err(_) => BUILTIN_CATALOG.to_string(),
    };
    let catalog = MemoryCatalog::from_json(&catalog_json)?;

    let mut builder = QuizliveServerBuilder::new()
        .config(ServerConfig::from_env())
        .catalog(Arc::new(catalog));
    if let Ok(path) = std::env::var("QUIZ_NIGHT_HISTORY") {
        tracing::info!(%path, "writing history");
        builder = builder.history(Arc::new(JsonlHistory::new(path)));
    }

    let server = builder.build(TrustedTokenAuth).await?;
    tracing::info!(addr = %server.local_addr()?, "quiz night is open");
    server.run().await?;
    Ok(())
}
