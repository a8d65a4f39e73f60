use crate::error::{Result, ScanError};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Substrings that mark a script source as worth fetching.
const SCRIPT_HINTS: &[&str] = &["captcha", "security"];

/// Bodies announced larger than this are not downloaded.
const MAX_SCRIPT_BYTES: u64 = 2 * 1024 * 1024;

pub const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 5;

/// Whether a resolved script URL looks CAPTCHA or security related.
pub fn is_candidate(script_url: &Url) -> bool {
    matches!(script_url.scheme(), "http" | "https")
        && SCRIPT_HINTS.iter().any(|hint| script_url.as_str().contains(hint))
}

fn is_textual(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("text/")
                || ct.contains("javascript")
                || ct.contains("ecmascript")
                || ct.contains("json")
        }
    }
}

/// Retrieves external script bodies for identifier extraction.
#[derive(Clone)]
pub struct ScriptFetcher {
    client: Client,
    timeout: Duration,
}

impl ScriptFetcher {
    pub fn new(client: Client, timeout_secs: u64) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Fetch `script_url` if it is a candidate.
    ///
    /// Returns `Ok(None)` when the URL is not worth fetching. Every
    /// transport or content problem is an `Err`; callers decide whether to
    /// care.
    pub async fn maybe_fetch(&self, script_url: &Url) -> Result<Option<String>> {
        if !is_candidate(script_url) {
            return Ok(None);
        }
        self.fetch(script_url).await.map(Some)
    }

    async fn fetch(&self, script_url: &Url) -> Result<String> {
        debug!("Fetching external script {}", script_url);

        let response = self
            .client
            .get(script_url.as_str())
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::HttpStatus {
                url: script_url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        if !is_textual(content_type.as_deref()) {
            return Err(ScanError::UnsupportedContent(format!(
                "{} served as {}",
                script_url,
                content_type.unwrap_or_default()
            )));
        }
        if let Some(length) = response.content_length()
            && length > MAX_SCRIPT_BYTES
        {
            return Err(ScanError::UnsupportedContent(format!(
                "{} is {} bytes",
                script_url, length
            )));
        }

        Ok(response.text().await?)
    }
}
