//! Debug links for transactions
//!
//! Tenderly identifies fork transactions by its own id, so links are built
//! from a hash → id cache that is refreshed from the project's transaction
//! list whenever a hash is not known yet.

use crate::config::TenderlyConfig;
use crate::error::AlertError;
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

/// Resolves a transaction hash to a link an operator can open
pub trait ExplorerLinks: Send + Sync {
    fn explorer_url<'a>(
        &'a self,
        tx_hash: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, AlertError>> + Send + 'a>>;
}

/// Response of the fork transaction listing
#[derive(Debug, Deserialize)]
struct ForkTransactionsResponse {
    #[serde(default)]
    fork_transactions: Vec<ForkTransaction>,
}

#[derive(Debug, Deserialize)]
struct ForkTransaction {
    hash: String,
    id: String,
}

/// Tenderly dashboard links for transactions on a mainnet fork
pub struct TenderlyExplorer {
    client: Client,
    jwt: String,
    project_id: String,
    account: String,
    transactions_url: String,
    dashboard_url: String,
    /// Known transaction ids keyed by lowercase hash
    transactions: Mutex<HashMap<String, String>>,
}

impl TenderlyExplorer {
    pub fn new(
        project_id: String,
        jwt: String,
        account: String,
        transactions_url: String,
        dashboard_url: String,
        timeout: Duration,
    ) -> Result<Self, AlertError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            jwt,
            project_id,
            account,
            transactions_url,
            dashboard_url,
            transactions: Mutex::new(HashMap::new()),
        })
    }

    /// Build an explorer from configuration
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the project id, JWT or transactions URL is missing
    pub fn from_config(config: &TenderlyConfig, timeout: Duration) -> Result<Option<Self>, AlertError> {
        match (&config.project_id, &config.jwt, &config.transactions_url) {
            (Some(project_id), Some(jwt), Some(transactions_url)) => Self::new(
                project_id.clone(),
                jwt.clone(),
                config.account.clone(),
                transactions_url.clone(),
                config.dashboard_url.clone(),
                timeout,
            )
            .map(Some),
            _ => Ok(None),
        }
    }

    /// Dashboard URL for a Tenderly transaction id
    pub fn transaction_url(&self, id: &str) -> String {
        format!(
            "{}/{}/testnet/{}/tx/mainnet/{}",
            self.dashboard_url.trim_end_matches('/'),
            self.account,
            self.project_id,
            id
        )
    }

    fn known_id(&self, tx_hash: &str) -> Option<String> {
        self.transactions
            .lock()
            .expect("explorer cache lock poisoned")
            .get(&tx_hash.to_lowercase())
            .cloned()
    }

    fn ingest(&self, response: ForkTransactionsResponse) -> usize {
        let mut transactions = self.transactions.lock().expect("explorer cache lock poisoned");
        let count = response.fork_transactions.len();
        for tx in response.fork_transactions {
            transactions.insert(tx.hash.to_lowercase(), tx.id);
        }
        count
    }

    /// Reload recent transactions into the cache
    async fn refresh(&self) -> Result<usize, AlertError> {
        let response = self
            .client
            .get(&self.transactions_url)
            .header("Accept", "application/json")
            .header("Authorization", format!("Bearer {}", self.jwt))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AlertError::LookupFailed(format!(
                "Tenderly returned {}: {}",
                status, error_text
            )));
        }

        let listing: ForkTransactionsResponse = response.json().await.map_err(|e| {
            AlertError::LookupFailed(format!("Failed to parse Tenderly response: {}", e))
        })?;

        let count = self.ingest(listing);
        debug!("Loaded {} Tenderly transactions", count);
        Ok(count)
    }
}

impl ExplorerLinks for TenderlyExplorer {
    fn explorer_url<'a>(
        &'a self,
        tx_hash: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, AlertError>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(id) = self.known_id(tx_hash) {
                return Ok(Some(self.transaction_url(&id)));
            }

            self.refresh().await?;

            match self.known_id(tx_hash) {
                Some(id) => Ok(Some(self.transaction_url(&id))),
                None => {
                    warn!("Transaction {} not found on Tenderly", tx_hash);
                    Ok(None)
                }
            }
        })
    }
}
