use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SheetConfig;
use crate::expense::ExpenseRecord;

/// Posts expense rows to the spreadsheet's Apps Script web app.
pub struct SheetClient {
    client: reqwest::Client,
    url: String,
}

impl SheetClient {
    /// `None` when no web app URL is configured.
    pub fn from_config(config: &SheetConfig) -> Result<Option<Self>> {
        config
            .url()
            .map(|url| Self::new(url, config.timeout()))
            .transpose()
    }

    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build sheet webhook client")?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Send one row. The outcome is logged, never returned: a lost row does
    /// not change what the user is told.
    pub async fn append(&self, record: &ExpenseRecord) {
        if let Err(e) = self.try_append(record).await {
            warn!("Sheet webhook POST failed: {:#}", e);
        }
    }

    async fn try_append(&self, record: &ExpenseRecord) -> Result<()> {
        debug!("Posting expense row to {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            .await
            .context("Failed to send request to sheet webhook")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Sheet webhook error ({}): {}", status, error_body);
        }

        debug!("Sheet webhook accepted row ({})", status);
        Ok(())
    }
}
