use anyhow::Context;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

use crate::limiter::ConcurrencyLimiter;
use crate::stats::StatsAggregator;

/// Immutable request shape shared by every dispatch in a run: one method,
/// one header set, one optional body, applied to whichever URL the
/// round-robin cursor selects.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    method: Method,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl RequestTemplate {
    pub fn build(
        method: &str,
        headers: &[(String, String)],
        body: Option<Vec<u8>>,
    ) -> anyhow::Result<Self> {
        let method = Method::from_bytes(method.to_uppercase().as_bytes())
            .with_context(|| format!("invalid HTTP method: {method}"))?;

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name: {name}"))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("invalid header value for {name}"))?;
            header_map.append(name, value);
        }

        Ok(Self {
            method,
            headers: header_map,
            body: body.map(Bytes::from),
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}

/// Executes one scheduled request/response exchange and reports its
/// outcome to the aggregator exactly once.
pub struct Dispatcher {
    client: Client,
    template: RequestTemplate,
    limiter: ConcurrencyLimiter,
    stats: Arc<StatsAggregator>,
}

impl Dispatcher {
    pub fn new(
        client: Client,
        template: RequestTemplate,
        limiter: ConcurrencyLimiter,
        stats: Arc<StatsAggregator>,
    ) -> Self {
        Self {
            client,
            template,
            limiter,
            stats,
        }
    }

    /// Run one exchange against `url` at `scheduled_at`.
    ///
    /// Waits out a still-future send instant (a past instant proceeds
    /// immediately, never skips), records `sent` at actual issuance, then
    /// holds a limiter slot for the duration of the exchange. Latency runs
    /// from issuance to full body consumption, so admission queueing and
    /// the complete response are both covered.
    pub async fn dispatch(&self, url: &str, scheduled_at: Instant) {
        tokio::time::sleep_until(scheduled_at).await;

        self.stats.on_sent();
        let issued_at = Instant::now();

        let _permit = self.limiter.acquire().await;
        let outcome = self.exchange(url).await;
        let latency_ms = issued_at.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(status) => {
                let ok = is_success(status);
                debug!(url, status = status.as_u16(), latency_ms, "request completed");
                self.stats.on_result(ok, latency_ms);
            }
            Err(err) => {
                debug!(url, error = %err, latency_ms, "request failed");
                self.stats.on_result(false, latency_ms);
            }
        }
    }

    async fn exchange(&self, url: &str) -> reqwest::Result<StatusCode> {
        let mut request = self
            .client
            .request(self.template.method.clone(), url)
            .headers(self.template.headers.clone());
        if let Some(body) = &self.template.body {
            request = request.body(body.clone());
        }

        let response = request.send().await?;
        let status = response.status();
        // Drain the whole body: latency must cover the complete response,
        // and an undrained body breaks connection reuse.
        response.bytes().await?;
        Ok(status)
    }
}

/// A received response counts as ok for any status in [200, 400).
fn is_success(status: StatusCode) -> bool {
    (200..400).contains(&status.as_u16())
}
