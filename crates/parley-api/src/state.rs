//! Application state wiring the chat service together.
//!
//! AppState holds the concrete service instance used by both CLI and REST API.
//! ChatService is generic over the store/backend/minter ports, but AppState
//! pins it to the concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;

use parley_core::chat::service::ChatService;
use parley_core::chat::writer::{RetryPolicy, TurnWriter};
use parley_infra::config::{load_config, resolve_data_dir, secret_from_env};
use parley_infra::crypto::token::AesTokenMinter;
use parley_infra::gemini::GeminiClient;
use parley_infra::sqlite::conversation::SqliteConversationStore;
use parley_infra::sqlite::pool::{DatabasePool, database_url, write_wait};
use parley_types::config::AppConfig;

/// Concrete type alias for the service generics pinned to infra implementations.
pub type ConcreteChatService = ChatService<SqliteConversationStore, GeminiClient, AesTokenMinter>;

/// Shared application state.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ConcreteChatService>,
    pub config: Arc<AppConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, load `config.toml`, and wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;
        let config = load_config(&data_dir).await;
        Self::build(data_dir, config).await
    }

    /// Wire services for an explicit data directory and config.
    pub async fn build(data_dir: PathBuf, config: AppConfig) -> anyhow::Result<Self> {
        let db_pool =
            DatabasePool::with_write_wait(&database_url(&data_dir), write_wait(&config.backend))
                .await?;
        let store = SqliteConversationStore::new(db_pool);

        // Commands that never reach the backend must work without a key,
        // so a missing key only surfaces once a request is rejected.
        let api_key = secret_from_env(&config.backend.api_key_env).unwrap_or_else(|| {
            tracing::debug!(var = %config.backend.api_key_env, "backend API key not set");
            SecretString::from(String::new())
        });
        let backend = GeminiClient::new(api_key, &config.backend)?;

        let minter = match secret_from_env(&config.token.secret_env) {
            Some(passphrase) => AesTokenMinter::from_passphrase(&passphrase)?,
            None => AesTokenMinter::from_key_file(&data_dir)?,
        };

        let writer = TurnWriter::new(
            store,
            backend,
            minter,
            RetryPolicy::from_config(&config.writer),
        );

        Ok(Self {
            chat_service: Arc::new(ChatService::new(writer)),
            config: Arc::new(config),
            data_dir,
        })
    }
}
