use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::BoxFuture;
use log::Level;
use serde_json::{json, Value};

use crate::core::ports::collector::{Collector, CollectorError, FetchRequest, NormalizedUsage};
use crate::core::ports::emitter::EmitterPort;

use super::{get_usage_json, required_cost, required_u64, usage_url};

const PROVIDER: &str = "anthropic";

pub struct AnthropicUsageCollector {
    client: reqwest::Client,
    base_url: String,
    api_version: String,
    emitter: Arc<dyn EmitterPort>,
}

impl AnthropicUsageCollector {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_version: &str,
        emitter: Arc<dyn EmitterPort>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_version: api_version.to_string(),
            emitter,
        }
    }
}

impl Collector for AnthropicUsageCollector {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn display_name(&self) -> &str {
        "Anthropic"
    }

    fn fetch<'a>(&'a self, request: FetchRequest<'a>) -> BoxFuture<'a, Result<Value, CollectorError>> {
        Box::pin(async move {
            let url = usage_url(&self.base_url, request.date);
            self.emitter.emit(
                Level::Debug,
                "collector:request",
                &json!({ "provider": PROVIDER, "date": request.date.to_string(), "url": url }),
            );

            let builder = self
                .client
                .get(&url)
                .header("x-api-key", request.credential)
                .header("anthropic-version", self.api_version.as_str())
                .header("content-type", "application/json");
            get_usage_json(PROVIDER, self.emitter.as_ref(), builder).await
        })
    }

    fn normalize(&self, raw: &Value, date: NaiveDate) -> Result<NormalizedUsage, CollectorError> {
        let usage = required_u64(PROVIDER, raw, "total_tokens")?;
        let cost = required_cost(PROVIDER, raw, "total_cost")?;
        Ok(NormalizedUsage {
            provider: PROVIDER.to_string(),
            date,
            usage,
            cost,
            raw_payload: raw.clone(),
        })
    }
}
