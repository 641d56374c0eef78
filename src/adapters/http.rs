use crate::config::toml_config::SourceConfig;
use crate::utils::error::{HotspotError, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

/// reqwest client with the configured headers, timeout and retry policy.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    headers: HashMap<String, String>,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl HttpClient {
    pub fn new(source: &SourceConfig) -> Result<Self> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = source.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        Ok(Self {
            client: builder.build()?,
            headers: source.headers.clone().unwrap_or_default(),
            retry_attempts: source.retry_attempts,
            retry_delay: Duration::from_secs(source.retry_delay_seconds),
        })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let bytes = self.get_bytes(url, query).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// 連線錯誤、5xx 與 429 會重試；其他 4xx 直接回傳錯誤
    pub async fn get_bytes(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_get(url, query).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt <= self.retry_attempts && is_retryable(&e) => {
                    tracing::warn!(
                        "⚠️ Request to {} failed (attempt {}/{}): {}",
                        url,
                        attempt,
                        self.retry_attempts + 1,
                        e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_get(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<u8>> {
        let mut request = self.client.get(url).query(query);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        tracing::debug!("GET {} {:?}", url, query);
        let response = request.send().await?;
        let status = response.status();
        tracing::debug!("API response status: {}", status);

        if !status.is_success() {
            return Err(HotspotError::ApiStatusError {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

fn is_retryable(error: &HotspotError) -> bool {
    match error {
        HotspotError::ApiError(_) => true,
        HotspotError::ApiStatusError { status, .. } => *status >= 500 || *status == 429,
        _ => false,
    }
}
