//! Example showing a GitHub login round trip
//!
//! Configure the provider in `social.toml` or the environment:
//!
//! ```text
//! SOCIAL__BASE_URL=http://localhost:3000
//! SOCIAL__PROVIDERS__GITHUB__CLIENT_ID=...
//! SOCIAL__PROVIDERS__GITHUB__CLIENT_SECRET=...
//! SOCIAL__PROVIDERS__GITHUB__REDIRECT=/auth/github/callback
//! ```
//!
//! Open the printed URL, approve access, then paste the query string of the
//! callback URL (`code=...&state=...`) into the terminal.

use ras_identity_social::{
    CallbackParams, InMemoryIdentityStore, InMemorySessionStore, SessionStore, SocialConfig,
    SocialService,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "github_login=info,ras_identity_social=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let config = SocialConfig::load()?;

    // One session per browser; a web application would use its session layer
    let session: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::from_config(&config));

    let store = InMemoryIdentityStore::new();
    let service = SocialService::from_config(config, Arc::new(store.clone()))?;
    info!("Supported providers: {:?}", service.supported_providers());

    let url = service
        .authorization_url("github", None, Vec::new(), session.clone())
        .await?;
    println!("Open this URL in your browser:\n\n{}\n", url);
    println!("Paste the callback query string:");

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    let query = line.trim();
    let query = query.split_once('?').map_or(query, |(_, query)| query);

    let identity = service
        .handle_callback("github", &CallbackParams::from_query(query), session)
        .await?;

    println!("Signed in as {}", identity.username().unwrap_or("<unnamed>"));
    println!("{}", serde_json::to_string_pretty(&identity)?);
    info!("Stored identities: {}", store.len().await);

    Ok(())
}
