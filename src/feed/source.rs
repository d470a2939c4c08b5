use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::SheetError;
use crate::logging::ts_epoch_ms;

/// Where a view's CSV text comes from.
#[async_trait]
pub trait CsvSource: Send + Sync {
    async fn fetch_text(&self) -> Result<String, SheetError>;

    /// Location for logs.
    fn describe(&self) -> String;
}

/// Published-CSV endpoint over plain unauthenticated HTTP(S).
pub struct HttpCsvSource {
    client: Client,
    url: Url,
    cache_bust: bool,
}

impl HttpCsvSource {
    /// `timeout: None` leaves requests unbounded; a hung request then blocks
    /// its view until the connection itself gives up.
    pub fn new(url: &str, cache_bust: bool, timeout: Option<Duration>) -> Result<Self, SheetError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            url: Url::parse(url)?,
            cache_bust,
        })
    }

    /// Request URL, with `t=<epoch ms>` appended when cache busting.
    pub fn request_url(&self, now_ms: u64) -> Url {
        let mut url = self.url.clone();
        if self.cache_bust {
            url.query_pairs_mut().append_pair("t", &now_ms.to_string());
        }
        url
    }
}

#[async_trait]
impl CsvSource for HttpCsvSource {
    async fn fetch_text(&self) -> Result<String, SheetError> {
        let resp = self.client.get(self.request_url(ts_epoch_ms())).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SheetError::Status(status.as_u16()));
        }
        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Err(SheetError::Empty);
        }
        Ok(body)
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

/// One canned reply for [`ScriptedSource`].
#[derive(Debug, Clone)]
pub enum Reply {
    Body(String),
    Status(u16),
}

/// Replays canned replies in order; once exhausted every fetch is `Empty`.
/// Drives tests and offline runs without a network.
pub struct ScriptedSource {
    replies: Mutex<VecDeque<Reply>>,
    delay: Duration,
    name: String,
}

impl ScriptedSource {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            delay: Duration::ZERO,
            name: "scripted".to_string(),
        }
    }

    pub fn bodies<I, S>(bodies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(bodies.into_iter().map(|b| Reply::Body(b.into())).collect())
    }

    /// Simulated network latency per fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CsvSource for ScriptedSource {
    async fn fetch_text(&self) -> Result<String, SheetError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self
            .replies
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front());
        match next {
            Some(Reply::Body(body)) if !body.trim().is_empty() => Ok(body),
            Some(Reply::Status(code)) => Err(SheetError::Status(code)),
            _ => Err(SheetError::Empty),
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Hex SHA-256 of a fetched body, logged so identical polls are easy to spot.
pub fn fingerprint(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}
