use crate::error::{Result, ScanError};
use crate::page::{PageVisitor, resolve_url};
use crate::record::{CaptchaRecord, CaptchaResult, CrawlOutcome, DedupPolicy, dedup_records};
use crate::script::{DEFAULT_SCRIPT_TIMEOUT_SECS, ScriptFetcher};
use reqwest::Client;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

pub const DEFAULT_BUDGET: usize = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const MAX_REDIRECTS: usize = 5;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// The only error message a failed lookup exposes.
pub const LOOKUP_FAILED: &str =
    "Failed to analyze the website. Please check the URL and try again.";

/// Per-crawl bookkeeping. `visited` never grows past `budget`.
struct CrawlState {
    visited: HashSet<String>,
    budget: usize,
    records: Vec<CaptchaRecord>,
    order: Vec<String>,
    discovered: HashSet<String>,
}

impl CrawlState {
    fn new(budget: usize) -> Self {
        Self {
            visited: HashSet::new(),
            budget,
            records: Vec::new(),
            order: Vec::new(),
            discovered: HashSet::new(),
        }
    }

    fn has_budget(&self) -> bool {
        self.visited.len() < self.budget
    }
}

pub struct Crawler {
    client: OnceCell<Client>,
    budget: usize,
    timeout_secs: u64,
    script_timeout_secs: u64,
    user_agent: String,
    dedup_policy: DedupPolicy,
    progress_callback: Option<ProgressCallback>,
}

impl Crawler {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(timeout_secs: u64) -> Self {
        Self {
            client: OnceCell::new(),
            budget: DEFAULT_BUDGET,
            timeout_secs,
            script_timeout_secs: DEFAULT_SCRIPT_TIMEOUT_SECS,
            user_agent: BROWSER_USER_AGENT.to_string(),
            dedup_policy: DedupPolicy::default(),
            progress_callback: None,
        }
    }

    /// Maximum number of distinct pages per crawl. The seed is always
    /// visited, so values below one are raised to one.
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget.max(1);
        self
    }

    pub fn with_script_timeout(mut self, timeout_secs: u64) -> Self {
        self.script_timeout_secs = timeout_secs;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self.client = OnceCell::new();
        self
    }

    pub fn with_dedup_policy(mut self, policy: DedupPolicy) -> Self {
        self.dedup_policy = policy;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    async fn client(&self) -> Result<Client> {
        let client = self
            .client
            .get_or_try_init(|| async {
                Client::builder()
                    .user_agent(self.user_agent.as_str())
                    .timeout(Duration::from_secs(self.timeout_secs))
                    .connect_timeout(Duration::from_secs(self.timeout_secs.div_ceil(2)))
                    .pool_idle_timeout(Duration::from_secs(90))
                    .tcp_keepalive(Duration::from_secs(60))
                    .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
                    .build()
                    .map_err(ScanError::from)
            })
            .await?;

        Ok(client.clone())
    }

    /// Look up the CAPTCHA configurations reachable from `seed`.
    ///
    /// Never fails: any error becomes an empty result carrying
    /// [`LOOKUP_FAILED`].
    pub async fn run(&self, seed: &str) -> CaptchaResult {
        match self.crawl(seed).await {
            Ok(outcome) => CaptchaResult::new(outcome.records),
            Err(e) => {
                warn!("Lookup of {} failed: {}", seed, e);
                CaptchaResult::with_error(LOOKUP_FAILED.to_string())
            }
        }
    }

    /// Crawl from `seed`, depth first in link discovery order, until the
    /// budget is spent or no relevant links remain.
    pub async fn crawl(&self, seed: &str) -> Result<CrawlOutcome> {
        info!("Starting CAPTCHA lookup of {} (budget {})", seed, self.budget);

        let seed_url = parse_seed(seed)?;
        let client = self.client().await?;
        let visitor = PageVisitor::new(
            client.clone(),
            ScriptFetcher::new(client, self.script_timeout_secs),
        );

        let mut state = CrawlState::new(self.budget);
        // Worklist stack; a page's links are pushed in reverse so the first
        // discovered link is explored next.
        let mut pending: Vec<String> = vec![seed_url.to_string()];

        while let Some(next) = pending.pop() {
            if !state.has_budget() {
                debug!("Budget of {} pages spent, stopping", state.budget);
                break;
            }

            let Some(target) = resolve_url(&seed_url, &next) else {
                continue;
            };
            if state.visited.contains(target.as_str()) {
                continue;
            }

            if let Some(ref callback) = self.progress_callback {
                callback(state.visited.len(), target.to_string());
            }

            let Some(page) = visitor
                .visit(&mut state.visited, &seed_url, target.as_str())
                .await
            else {
                continue;
            };

            state.order.push(page.url);
            state.records.extend(page.records);
            for link in page.links.into_iter().rev() {
                state.discovered.insert(link.clone());
                if !state.visited.contains(&link) {
                    pending.push(link);
                }
            }
        }

        let records = dedup_records(state.records, self.dedup_policy);
        info!(
            "Lookup complete. Visited {} pages, found {} CAPTCHA records",
            state.order.len(),
            records.len()
        );

        Ok(CrawlOutcome {
            records,
            visited: state.order,
            discovered: state.discovered.len(),
        })
    }
}

impl Default for Crawler {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_seed(seed: &str) -> Result<Url> {
    let url = Url::parse(seed.trim())
        .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", seed, e)))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ScanError::InvalidUrl(format!(
            "{}: only http(s) URLs with a host can be crawled",
            seed
        )));
    }

    Ok(url)
}
