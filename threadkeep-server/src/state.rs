use std::{sync::Arc, time::Duration};

use anyhow::Context;
use threadkeep_config::ServerConfig;
use threadkeep_http::HttpClient;
use threadkeep_social::twitter::TweetApi;
use threadkeep_store::{SecretCipher, Store};

use crate::auth::{Authenticator, StaticTokens};

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: ServerConfig,
    pub store: Store,
    /// Present only when `server.crypto` is configured.
    pub cipher: Option<SecretCipher>,
    pub authenticator: Arc<dyn Authenticator>,
    provider: HttpClient,
}

impl AppState {
    /// Open the key database and wire the configured token table.
    pub async fn new(config: ServerConfig) -> anyhow::Result<SharedState> {
        let store = Store::connect(&config.database_url).await?;
        let authenticator = Arc::new(StaticTokens::new(&config.auth.tokens));
        Self::from_parts(config, store, authenticator)
    }

    pub fn from_parts(
        config: ServerConfig,
        store: Store,
        authenticator: Arc<dyn Authenticator>,
    ) -> anyhow::Result<SharedState> {
        let cipher = config
            .crypto
            .as_ref()
            .map(|c| SecretCipher::from_base64(c.key_id.clone(), &c.key))
            .transpose()
            .context("invalid server.crypto settings")?;
        if cipher.is_none() {
            tracing::warn!("server.crypto not set; API key sync routes are disabled");
        }

        let provider = HttpClient::new(&config.provider.base_url)
            .context("invalid server.provider.base_url")?
            .with_timeout(Duration::from_secs(config.provider.timeout_secs))
            .with_retries(config.provider.retries);

        Ok(Arc::new(Self {
            config,
            store,
            cipher,
            authenticator,
            provider,
        }))
    }

    /// Provider client bound to one caller's key; shares the connection pool.
    pub fn tweet_api(&self, api_key: &str) -> TweetApi {
        TweetApi::with_http(self.provider.clone(), api_key)
    }
}
