use indicatif::{ProgressBar, ProgressStyle};
use keyscout_scanner::crawler::LOOKUP_FAILED;
use keyscout_scanner::{CaptchaResult, Crawler, DedupPolicy, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Options for configuring a lookup run
pub struct LookupOptions {
    pub urls: Vec<String>,
    pub budget: usize,
    pub timeout_secs: u64,
    pub script_timeout_secs: u64,
    pub dedup_policy: DedupPolicy,
    pub show_progress: bool,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            budget: keyscout_scanner::crawler::DEFAULT_BUDGET,
            timeout_secs: keyscout_scanner::crawler::DEFAULT_TIMEOUT_SECS,
            script_timeout_secs: keyscout_scanner::script::DEFAULT_SCRIPT_TIMEOUT_SECS,
            dedup_policy: DedupPolicy::default(),
            show_progress: false,
        }
    }
}

/// What one seed URL produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteReport {
    pub seed: String,
    pub pages_visited: usize,
    pub result: CaptchaResult,
}

/// Callback for reporting per-host progress messages
pub type LookupProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Default a missing scheme to `https://`. Explicit schemes are kept, even
/// ones the crawler will reject.
pub fn normalize_seed(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}

/// Look up every seed in `options`, one after another.
///
/// Seeds share one crawler, and with it one connection pool, but each gets
/// its own crawl state. A seed that fails is reported in its `SiteReport`
/// rather than aborting the run.
pub async fn execute_lookup(
    options: LookupOptions,
    progress_callback: Option<LookupProgressCallback>,
) -> Result<Vec<SiteReport>, String> {
    let LookupOptions {
        urls,
        budget,
        timeout_secs,
        script_timeout_secs,
        dedup_policy,
        show_progress,
    } = options;

    if urls.is_empty() {
        return Err("No targets to look up".to_string());
    }

    let progress_bar = if show_progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Starting lookup...");
        Some(Arc::new(pb))
    } else {
        None
    };

    let pages_fetched = Arc::new(AtomicUsize::new(0));

    let page_callback: ProgressCallback = match progress_bar.clone() {
        Some(pb) => {
            let count = pages_fetched.clone();
            Arc::new(move |_slot: usize, url: String| {
                let total = count.fetch_add(1, Ordering::Relaxed) + 1;
                pb.set_message(format!(
                    "Scanning {} ({} pages fetched)",
                    extract_url_path(&url),
                    total
                ));
            })
        }
        None => {
            let count = pages_fetched.clone();
            Arc::new(move |_slot: usize, _url: String| {
                count.fetch_add(1, Ordering::Relaxed);
            })
        }
    };

    let crawler = Crawler::with_timeout(timeout_secs)
        .with_budget(budget)
        .with_script_timeout(script_timeout_secs)
        .with_dedup_policy(dedup_policy)
        .with_progress_callback(page_callback);

    let mut reports = Vec::with_capacity(urls.len());
    for (idx, raw) in urls.iter().enumerate() {
        let seed = normalize_seed(raw);

        if let Some(ref callback) = progress_callback
            && urls.len() > 1
        {
            callback(format!("Looking up host {}/{}: {}", idx + 1, urls.len(), seed));
        }

        let report = match crawler.crawl(&seed).await {
            Ok(outcome) => SiteReport {
                seed,
                pages_visited: outcome.visited.len(),
                result: CaptchaResult::new(outcome.records),
            },
            Err(e) => {
                warn!("Lookup of {} failed: {}", seed, e);
                if let Some(ref callback) = progress_callback {
                    callback(format!("[!]  Failed to look up {}: {}", seed, e));
                }
                SiteReport {
                    seed,
                    pages_visited: 0,
                    result: CaptchaResult::with_error(LOOKUP_FAILED.to_string()),
                }
            }
        };
        reports.push(report);
    }

    if let Some(ref pb) = progress_bar {
        let found: usize = reports.iter().map(|r| r.result.captchas.len()).sum();
        pb.finish_with_message(format!(
            "Lookup complete! {} pages fetched, {} CAPTCHA records",
            pages_fetched.load(Ordering::Relaxed),
            found
        ));
    }

    Ok(reports)
}
