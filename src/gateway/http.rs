//! Token-authenticated HTTP client for the terminal gateway.

use super::payload::{TokenAuthRequest, TokenAuthResponse, TransactionEnvelope, TransactionItem};
use super::{PunchPage, TerminalGateway, TimeRange};
use crate::config::GatewayConfig;
use crate::errors::{AppError, AppResult};
use crate::models::punch::PUNCH_TIME_FORMAT;
use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const TOKEN_PATH: &str = "/jwt-api-token-auth/";
const TRANSACTIONS_PATH: &str = "/iclock/api/transactions/";

pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    token: RwLock<Option<String>>,
}

impl HttpGateway {
    pub fn new(cfg: &GatewayConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .connect_timeout(cfg.timeout())
            .build()
            .map_err(|e| AppError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn credentials(&self) -> AppResult<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(u), Some(p)) if !u.trim().is_empty() && !p.is_empty() => Ok((u, p)),
            _ => Err(AppError::Config(
                "gateway username/password are not configured".into(),
            )),
        }
    }

    async fn bearer(&self) -> AppResult<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.authenticate().await?;
        self.token
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::Auth("no token after authentication".into()))
    }

    async fn get_transactions(
        &self,
        range: &TimeRange,
        page: u32,
        page_size: u32,
    ) -> AppResult<TransactionEnvelope> {
        let token = self.bearer().await?;
        let start = range.start.format(PUNCH_TIME_FORMAT).to_string();
        let end = range.end.format(PUNCH_TIME_FORMAT).to_string();
        let page = page.to_string();
        let page_size = page_size.to_string();

        let resp = self
            .client
            .get(self.url(TRANSACTIONS_PATH))
            .header("Authorization", format!("JWT {token}"))
            .query(&[
                ("start_time", start.as_str()),
                ("end_time", end.as_str()),
                ("page", page.as_str()),
                ("page_size", page_size.as_str()),
            ])
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                *self.token.write().await = None;
                return Err(AppError::Auth(format!(
                    "transactions rejected with {}",
                    resp.status()
                )));
            }
            // An out-of-range page is answered with 404 by the gateway.
            StatusCode::NOT_FOUND => {
                return Ok(TransactionEnvelope {
                    count: 0,
                    next: None,
                    data: Vec::new(),
                });
            }
            s => {
                return Err(AppError::Network(format!("gateway answered {s}")));
            }
        }

        let body = resp.text().await?;
        let envelope: TransactionEnvelope = serde_json::from_str(&body)?;
        Ok(envelope)
    }
}

#[async_trait]
impl TerminalGateway for HttpGateway {
    async fn authenticate(&self) -> AppResult<()> {
        let (username, password) = self.credentials()?;

        let resp = self
            .client
            .post(self.url(TOKEN_PATH))
            .json(&TokenAuthRequest { username, password })
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::BAD_REQUEST
            || status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
        {
            return Err(AppError::Auth(format!("token request rejected with {status}")));
        }
        if !status.is_success() {
            return Err(AppError::Network(format!("token endpoint answered {status}")));
        }

        let body: TokenAuthResponse = resp.json().await?;
        let token = body
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Auth("token missing from response".into()))?;

        *self.token.write().await = Some(token);
        info!(gateway = %self.base_url, "Gateway token acquired");
        Ok(())
    }

    async fn fetch_page(
        &self,
        range: &TimeRange,
        page: u32,
        page_size: u32,
    ) -> AppResult<PunchPage> {
        let envelope = self.get_transactions(range, page, page_size).await?;

        let mut out = PunchPage {
            total: envelope.count,
            has_next: envelope.next.is_some(),
            ..Default::default()
        };

        for raw in envelope.data {
            let parsed = serde_json::from_value::<TransactionItem>(raw)
                .map_err(AppError::from)
                .and_then(TransactionItem::into_event);
            match parsed {
                Ok(ev) => out.events.push(ev),
                Err(e) => {
                    out.malformed += 1;
                    warn!(page, error = %e, "Skipping malformed punch record");
                }
            }
        }

        debug!(
            page,
            events = out.events.len(),
            total = out.total,
            has_next = out.has_next,
            "Fetched gateway page"
        );
        Ok(out)
    }

    async fn count(&self, range: &TimeRange) -> AppResult<u64> {
        let envelope = self.get_transactions(range, 1, 1).await?;
        Ok(envelope.count)
    }
}
