//! HTTP adapter for the financial ledger
//!
//! The ledger service owns invoices and payments; the engine only asks it
//! for per-provider debt facts. Transient failures are retried with
//! exponential backoff before surfacing as `ExternalError::Unavailable`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use uuid::Uuid;

use crate::external::{DebtFactsProvider, ExternalError};
use crate::models::DebtFacts;

const RETRY_ATTEMPTS: usize = 3;
const RETRY_BASE_MS: u64 = 200;

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub base_url: String,
    pub api_key: String,
}

impl LedgerConfig {
    /// Read `LEDGER_BASE_URL` and `LEDGER_API_KEY` from the environment
    pub fn from_env() -> Result<Self, ExternalError> {
        let base_url = std::env::var("LEDGER_BASE_URL")
            .map_err(|_| ExternalError::Unavailable("LEDGER_BASE_URL not set".into()))?;
        let api_key = std::env::var("LEDGER_API_KEY").unwrap_or_default();
        Ok(Self { base_url, api_key })
    }
}

pub struct HttpDebtLedger {
    client: Client,
    config: LedgerConfig,
}

impl HttpDebtLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn from_env() -> Result<Self, ExternalError> {
        Ok(Self::new(LedgerConfig::from_env()?))
    }

    async fn fetch_once(&self, provider_id: Uuid) -> Result<DebtFacts, ExternalError> {
        let url = format!(
            "{}/v1/providers/{}/debt",
            self.config.base_url.trim_end_matches('/'),
            provider_id
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| ExternalError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ExternalError::NotFound),
            status if status.is_success() => response
                .json::<DebtFacts>()
                .await
                .map_err(|e| ExternalError::Unavailable(format!("bad ledger response: {}", e))),
            status => Err(ExternalError::Unavailable(format!(
                "ledger returned {}",
                status
            ))),
        }
    }
}

#[async_trait]
impl DebtFactsProvider for HttpDebtLedger {
    async fn fetch(&self, provider_id: Uuid) -> Result<DebtFacts, ExternalError> {
        let strategy = ExponentialBackoff::from_millis(RETRY_BASE_MS)
            .map(jitter)
            .take(RETRY_ATTEMPTS);

        // A missing provider will not appear on retry; only retry outages
        RetryIf::spawn(
            strategy,
            || self.fetch_once(provider_id),
            |e: &ExternalError| matches!(e, ExternalError::Unavailable(_)),
        )
        .await
    }
}
