pub mod anthropic;
#[cfg(test)]
mod loopback;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use log::Level;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::adapters::config::Settings;
use crate::core::ports::collector::{Collector, CollectorError};
use crate::core::ports::emitter::EmitterPort;

pub use anthropic::AnthropicUsageCollector;
pub use openai::OpenAiUsageCollector;

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Fixed set of collectors, kept in registration order.
pub struct CollectorRegistry {
    collectors: Vec<Box<dyn Collector>>,
}

impl CollectorRegistry {
    pub fn empty() -> Self {
        Self {
            collectors: Vec::new(),
        }
    }

    pub fn from_settings(
        settings: &Settings,
        emitter: Arc<dyn EmitterPort>,
    ) -> Result<Self, reqwest::Error> {
        let client = http_client(settings.fetch_timeout())?;
        let mut registry = Self::empty();
        registry.register(Box::new(OpenAiUsageCollector::new(
            client.clone(),
            &settings.openai_base_url,
            emitter.clone(),
        )));
        registry.register(Box::new(AnthropicUsageCollector::new(
            client,
            &settings.anthropic_base_url,
            &settings.anthropic_version,
            emitter,
        )));
        Ok(registry)
    }

    /// Registers a collector, replacing any earlier one for the same provider.
    pub fn register(&mut self, collector: Box<dyn Collector>) {
        if let Some(slot) = self
            .collectors
            .iter_mut()
            .find(|existing| existing.provider() == collector.provider())
        {
            *slot = collector;
        } else {
            self.collectors.push(collector);
        }
    }

    pub fn resolve(&self, provider: &str) -> Result<&dyn Collector, String> {
        let provider = provider.trim();
        self.collectors
            .iter()
            .find(|collector| collector.provider() == provider)
            .map(|collector| collector.as_ref())
            .ok_or_else(|| format!("Unsupported provider: {provider}"))
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Collector> {
        self.collectors.iter().map(|collector| collector.as_ref())
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("agent-os/", env!("CARGO_PKG_VERSION")))
        .build()
}

pub(crate) fn usage_url(base_url: &str, date: NaiveDate) -> String {
    format!(
        "{}/v1/usage?date={}",
        base_url.trim().trim_end_matches('/'),
        urlencoding::encode(&date.format("%Y-%m-%d").to_string())
    )
}

/// Sends a usage request and decodes the JSON body, classifying failures.
pub(crate) async fn get_usage_json(
    provider: &str,
    emitter: &dyn EmitterPort,
    request: reqwest::RequestBuilder,
) -> Result<Value, CollectorError> {
    let response = request
        .send()
        .await
        .map_err(|error| classify_transport(provider, &error))?;

    let status = response.status();
    emitter.emit(
        Level::Debug,
        "collector:response",
        &json!({ "provider": provider, "status": status.as_u16() }),
    );

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(provider, status, &body));
    }

    response.json::<Value>().await.map_err(|error| {
        if error.is_decode() {
            CollectorError::Fetch {
                provider: provider.to_string(),
                detail: format!("response body is not JSON: {error}"),
            }
        } else {
            classify_transport(provider, &error)
        }
    })
}

pub(crate) fn classify_status(provider: &str, status: StatusCode, body: &str) -> CollectorError {
    let provider = provider.to_string();
    let detail = format!("HTTP {status}: {}", truncate_chars(body.trim(), MAX_ERROR_BODY_CHARS));
    match status.as_u16() {
        401 | 403 => CollectorError::Auth { provider, detail },
        408 | 429 => CollectorError::TransientFetch { provider, detail },
        code if (500..600).contains(&code) => CollectorError::TransientFetch { provider, detail },
        _ => CollectorError::Fetch { provider, detail },
    }
}

fn classify_transport(provider: &str, error: &reqwest::Error) -> CollectorError {
    let provider = provider.to_string();
    if error.is_timeout() {
        CollectorError::TransientFetch {
            provider,
            detail: format!("request timed out: {error}"),
        }
    } else if error.is_connect() || error.is_request() || error.is_body() {
        CollectorError::TransientFetch {
            provider,
            detail: format!("network error: {error}"),
        }
    } else {
        CollectorError::Fetch {
            provider,
            detail: error.to_string(),
        }
    }
}

pub(crate) fn required_u64(provider: &str, raw: &Value, field: &str) -> Result<u64, CollectorError> {
    let value = required_field(provider, raw, field)?;
    value.as_u64().ok_or_else(|| {
        CollectorError::normalization(
            provider,
            format!("field '{field}' must be a non-negative integer, got {value}"),
        )
    })
}

pub(crate) fn required_cost(provider: &str, raw: &Value, field: &str) -> Result<f64, CollectorError> {
    let value = required_field(provider, raw, field)?;
    match value.as_f64() {
        Some(cost) if cost.is_finite() && cost >= 0.0 => Ok(cost),
        _ => Err(CollectorError::normalization(
            provider,
            format!("field '{field}' must be a non-negative number, got {value}"),
        )),
    }
}

fn required_field<'a>(provider: &str, raw: &'a Value, field: &str) -> Result<&'a Value, CollectorError> {
    let object = raw.as_object().ok_or_else(|| {
        CollectorError::normalization(provider, "payload is not a JSON object")
    })?;
    match object.get(field) {
        None | Some(Value::Null) => Err(CollectorError::normalization(
            provider,
            format!("missing field '{field}'"),
        )),
        Some(value) => Ok(value),
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
