//! Seams to the services the engine consumes
//!
//! Debt/overdue computation, the provider directory and outbound mail are
//! owned by other systems. The engine only talks to them through these
//! traits; the worker binary wires in the real adapters.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{DebtFacts, Recipient};

/// Failure modes of a consumed external service
#[derive(Debug, thiserror::Error)]
pub enum ExternalError {
    #[error("not found")]
    NotFound,
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Financial ledger returning debt/overdue facts for a provider
#[async_trait]
pub trait DebtFactsProvider: Send + Sync {
    async fn fetch(&self, provider_id: Uuid) -> Result<DebtFacts, ExternalError>;
}

/// Directory of providers eligible for blocking checks
#[async_trait]
pub trait ProviderDirectory: Send + Sync {
    /// Active providers; with `exclude_flagged` the ones opted out of
    /// automatic blocking checks are omitted.
    async fn list_active(&self, exclude_flagged: bool) -> Result<Vec<Uuid>, ExternalError>;

    async fn is_excluded(&self, provider_id: Uuid) -> Result<bool, ExternalError>;

    async fn provider_name(&self, provider_id: Uuid) -> Result<String, ExternalError>;

    /// Who should be told about a blocking event for this provider
    async fn notification_recipients(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<Recipient>, ExternalError>;
}

/// Outbound mail/SMS transport used by the notification sender
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), ExternalError>;
}
