use chrono::NaiveDate;
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub credential: &'a str,
    pub date: NaiveDate,
}

/// Result fields produced by [`Collector::normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedUsage {
    pub provider: String,
    pub date: NaiveDate,
    pub usage: u64,
    pub cost: f64,
    pub raw_payload: Value,
}

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("{provider} rejected the credential: {detail}")]
    Auth { provider: String, detail: String },
    #[error("{provider} is temporarily unreachable: {detail}")]
    TransientFetch { provider: String, detail: String },
    #[error("{provider} fetch failed: {detail}")]
    Fetch { provider: String, detail: String },
    #[error("{provider} payload could not be normalized: {detail}")]
    Normalization { provider: String, detail: String },
}

impl CollectorError {
    pub fn kind(&self) -> &'static str {
        match self {
            CollectorError::Auth { .. } => "auth",
            CollectorError::TransientFetch { .. } => "transient_fetch",
            CollectorError::Fetch { .. } => "fetch",
            CollectorError::Normalization { .. } => "normalization",
        }
    }

    pub fn normalization(provider: &str, detail: impl Into<String>) -> Self {
        CollectorError::Normalization {
            provider: provider.to_string(),
            detail: detail.into(),
        }
    }
}

pub trait Collector: Send + Sync {
    /// Provider key written to the result store.
    fn provider(&self) -> &str;

    fn display_name(&self) -> &str {
        self.provider()
    }

    fn task_name(&self) -> String {
        format!("{}_collector", self.provider())
    }

    fn fetch<'a>(&'a self, request: FetchRequest<'a>) -> BoxFuture<'a, Result<Value, CollectorError>>;

    /// Pure mapping of a raw payload. Absent or malformed measures are errors, never zero.
    fn normalize(&self, raw: &Value, date: NaiveDate) -> Result<NormalizedUsage, CollectorError>;
}
