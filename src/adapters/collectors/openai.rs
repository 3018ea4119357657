use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::BoxFuture;
use log::Level;
use serde_json::{json, Value};

use crate::core::ports::collector::{Collector, CollectorError, FetchRequest, NormalizedUsage};
use crate::core::ports::emitter::EmitterPort;

use super::{get_usage_json, required_cost, required_u64, usage_url};

const PROVIDER: &str = "openai";

pub struct OpenAiUsageCollector {
    client: reqwest::Client,
    base_url: String,
    emitter: Arc<dyn EmitterPort>,
}

impl OpenAiUsageCollector {
    pub fn new(client: reqwest::Client, base_url: &str, emitter: Arc<dyn EmitterPort>) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            emitter,
        }
    }
}

impl Collector for OpenAiUsageCollector {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn display_name(&self) -> &str {
        "OpenAI"
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
                .bearer_auth(request.credential)
                .header("Content-Type", "application/json");
            get_usage_json(PROVIDER, self.emitter.as_ref(), builder).await
        })
    }

    fn normalize(&self, raw: &Value, date: NaiveDate) -> Result<NormalizedUsage, CollectorError> {
        Ok(NormalizedUsage {
            provider: PROVIDER.to_string(),
            date,
            usage: required_u64(PROVIDER, raw, "total_tokens")?,
            cost: required_cost(PROVIDER, raw, "total_cost")?,
            raw_payload: raw.clone(),
        })
    }
}
