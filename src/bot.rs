use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::expense;
use crate::platform::line::{self, LineClient, WebhookBody, WebhookEvent};
use crate::platform::IncomingMessage;
use crate::rate::{ExchangeRateProvider, RateFetcher};
use crate::sheet::SheetClient;
use crate::table;

const LIVENESS: &str = "LINE Bot is running! Please use /callback for webhook.";

/// Shared application state
pub struct AppState {
    config: Config,
    rates: Arc<dyn ExchangeRateProvider>,
    sheet: Option<SheetClient>,
    line: LineClient,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let rates = Arc::new(RateFetcher::new(&config.rate)?);
        Self::with_rates(config, rates)
    }

    pub fn with_rates(config: Config, rates: Arc<dyn ExchangeRateProvider>) -> Result<Self> {
        let sheet = SheetClient::from_config(&config.sheet)?;
        if sheet.is_none() {
            warn!("No sheet web app URL configured; expenses will be rejected");
        }
        let line = LineClient::new(&config.line)?;
        Ok(Self {
            config,
            rates,
            sheet,
            line,
        })
    }

    /// Reply text for one message: the lookup table for the keyword,
    /// otherwise the outcome of recording the text as an expense.
    pub async fn dispatch(&self, text: &str) -> String {
        let text = text.trim();
        let keyword = self.config.bot.table_keyword.trim();

        if text.to_lowercase() == keyword.to_lowercase() {
            let rate = self.rates.krw_to_twd().await;
            table::build_conversion_table(rate)
        } else {
            expense::expense_reply(text, self.rates.as_ref(), self.sheet.as_ref()).await
        }
    }

    /// Handle one webhook event. Failures are logged here and go no further.
    pub async fn handle_event(&self, event: &WebhookEvent) {
        let Some(incoming) = event.text_message() else {
            debug!("Ignoring {} event", event.event_type);
            return;
        };

        if incoming.is_redelivery {
            info!(
                "Ignoring redelivered message (event {})",
                event.webhook_event_id.as_deref().unwrap_or("-")
            );
            return;
        }

        if let Err(e) = self.handle_message(&incoming).await {
            error!("Error handling message: {:#}", e);
        }
    }

    async fn handle_message(&self, incoming: &IncomingMessage) -> Result<()> {
        info!(
            "LINE message from {}: {}",
            incoming.user_id.as_deref().unwrap_or("unknown"),
            incoming.text
        );

        let reply = self.dispatch(&incoming.text).await;
        self.line
            .reply(&incoming.reply_token, &reply)
            .await
            .context("Failed to reply")
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/callback", post(callback))
        .with_state(state)
}

/// Serve the webhook until the process is stopped
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let addr = state.config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Listening on {}", addr);

    axum::serve(listener, router(state))
        .await
        .context("Server error")?;

    Ok(())
}

async fn home() -> &'static str {
    LIVENESS
}

async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, StatusCode> {
    let Some(signature) = headers
        .get(line::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        warn!("Webhook request without signature header");
        return Err(StatusCode::BAD_REQUEST);
    };

    if !line::verify_signature(&state.config.line.channel_secret, signature, &body) {
        warn!("Webhook signature mismatch");
        return Err(StatusCode::BAD_REQUEST);
    }

    debug!("Received webhook: {}", String::from_utf8_lossy(&body));

    let webhook: WebhookBody = serde_json::from_slice(&body).map_err(|e| {
        warn!("Malformed webhook body: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    debug!(
        "Webhook for {} carries {} event(s)",
        webhook.destination.as_deref().unwrap_or("-"),
        webhook.events.len()
    );

    for event in &webhook.events {
        state.handle_event(event).await;
    }

    Ok("OK")
}
