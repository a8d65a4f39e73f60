use crate::element;
use crate::error::{Result, ScanError};
use crate::extractor::{Extraction, extract, extract_from_url};
use crate::record::{CaptchaRecord, DedupPolicy, Location, dedup_records};
use crate::script::ScriptFetcher;
use futures::future::join_all;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

/// Link text that suggests a login, registration or verification flow.
pub const AUTH_TERMS: &[&str] = &[
    "login",
    "signin",
    "sign-in",
    "register",
    "signup",
    "sign-up",
    "auth",
    "account",
    "verification",
    "verify",
    "captcha",
];

/// Raw HTML substrings showing the page loads the reCAPTCHA Enterprise client.
pub const ENTERPRISE_MARKERS: &[&str] = &["recaptcha/enterprise", "grecaptcha.enterprise"];

static SCRIPTS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").expect("hardcoded selector is valid"));
static FRAMES: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("iframe[src]").expect("hardcoded selector is valid"));
static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("hardcoded selector is valid"));

/// What one page contributed to a crawl.
#[derive(Debug, Clone, Default)]
pub struct PageVisit {
    /// Normalized URL of the page.
    pub url: String,
    pub records: Vec<CaptchaRecord>,
    /// Same-origin, auth-relevant links in document order.
    pub links: Vec<String>,
}

struct ScriptNode {
    inline: String,
    src: Option<Url>,
}

struct ParsedPage {
    scripts: Vec<ScriptNode>,
    element_records: Vec<CaptchaRecord>,
    frames: Vec<Url>,
    links: Vec<String>,
}

/// Fetches and scans single pages.
#[derive(Clone)]
pub struct PageVisitor {
    client: Client,
    scripts: ScriptFetcher,
}

impl PageVisitor {
    pub fn new(client: Client, scripts: ScriptFetcher) -> Self {
        Self { client, scripts }
    }

    /// Visit `path` resolved against `base`.
    ///
    /// Returns `None` without any I/O when the path cannot be resolved or
    /// was already visited. Otherwise the URL is recorded in `visited`
    /// before the fetch. A page that fails to load yields an empty visit.
    pub async fn visit(
        &self,
        visited: &mut HashSet<String>,
        base: &Url,
        path: &str,
    ) -> Option<PageVisit> {
        let url = resolve_url(base, path)?;
        if !visited.insert(url.to_string()) {
            return None;
        }

        Some(self.scan_page(base, url).await)
    }

    async fn scan_page(&self, base: &Url, url: Url) -> PageVisit {
        let mut visit = PageVisit {
            url: url.to_string(),
            ..PageVisit::default()
        };

        let html = match self.fetch_page(&url).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Crawl error for {}: {}", url, e);
                return visit;
            }
        };

        let parsed = parse_page(&html, &url, base);

        let mut records = self.scan_scripts(&parsed.scripts, url.as_str()).await;
        records.extend(parsed.element_records);
        for frame in &parsed.frames {
            records.extend(into_records(
                extract_from_url(frame),
                Location::UrlParameter,
                url.as_str(),
            ));
        }

        annotate_enterprise(&html, &mut records);

        visit.records = dedup_records(records, DedupPolicy::Composite);
        visit.links = parsed.links;
        debug!(
            "{}: {} records, {} relevant links",
            visit.url,
            visit.records.len(),
            visit.links.len()
        );
        visit
    }

    async fn fetch_page(&self, url: &Url) -> Result<String> {
        debug!("Fetching {}", url);

        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }

    /// Process every script node concurrently; results are joined in
    /// document order.
    async fn scan_scripts(&self, scripts: &[ScriptNode], page_url: &str) -> Vec<CaptchaRecord> {
        let tasks = scripts
            .iter()
            .map(|script| self.scan_script(script, page_url));

        join_all(tasks).await.into_iter().flatten().collect()
    }

    async fn scan_script(&self, script: &ScriptNode, page_url: &str) -> Vec<CaptchaRecord> {
        let mut records = into_records(extract(&script.inline), Location::ScriptContent, page_url);

        if let Some(ref src) = script.src {
            records.extend(into_records(
                extract_from_url(src),
                Location::ScriptSource,
                page_url,
            ));

            match self.scripts.maybe_fetch(src).await {
                Ok(Some(body)) => {
                    records.extend(into_records(
                        extract(&body),
                        Location::ExternalScript,
                        page_url,
                    ));
                }
                Ok(None) => {}
                Err(e) => debug!("Skipping external script {}: {}", src, e),
            }
        }

        records
    }
}

fn into_records(
    extractions: Vec<Extraction>,
    location: Location,
    page_url: &str,
) -> Vec<CaptchaRecord> {
    extractions
        .into_iter()
        .map(|e| {
            CaptchaRecord::new(e.vendor_type, e.identifier, location, page_url)
                .with_metadata(e.metadata)
        })
        .collect()
}

fn parse_page(html: &str, page_url: &Url, base: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    let scripts = document
        .select(&SCRIPTS)
        .map(|script| ScriptNode {
            inline: script.text().collect::<String>(),
            src: script
                .value()
                .attr("src")
                .and_then(|src| resolve_url(page_url, src)),
        })
        .collect();

    let frames = document
        .select(&FRAMES)
        .filter_map(|frame| frame.value().attr("src"))
        .filter_map(|src| resolve_url(page_url, src))
        .collect();

    ParsedPage {
        scripts,
        element_records: element::scan(&document, page_url.as_str()),
        frames,
        links: harvest_links(&document, page_url, base),
    }
}

fn harvest_links(document: &Html, page_url: &Url, base: &Url) -> Vec<String> {
    let origin = base.origin();
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in document.select(&ANCHORS) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(target) = resolve_url(page_url, href) else {
            continue;
        };

        if target.origin() != origin {
            debug!("  -> {} is off-origin, skipping", target);
            continue;
        }

        let target = target.to_string();
        if is_auth_relevant(&target) && seen.insert(target.clone()) {
            debug!("Found relevant link: {}", target);
            links.push(target);
        }
    }

    links
}

/// Resolve `href` against `base`, dropping the fragment.
///
/// Pseudo-links (`javascript:`, `mailto:`, `tel:`, bare fragments) and
/// unparseable references resolve to `None`.
pub fn resolve_url(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let mut url = base.join(href).ok()?;
    url.set_fragment(None);
    Some(url)
}

pub fn is_auth_relevant(url: &str) -> bool {
    let lowered = url.to_lowercase();
    AUTH_TERMS.iter().any(|term| lowered.contains(term))
}

/// Mark reCAPTCHA records as Enterprise when the page loads the
/// Enterprise client. Applies to this page's batch only.
pub fn annotate_enterprise(html: &str, records: &mut [CaptchaRecord]) {
    if !ENTERPRISE_MARKERS.iter().any(|marker| html.contains(marker)) {
        return;
    }

    for record in records
        .iter_mut()
        .filter(|r| r.vendor_type.contains("reCAPTCHA") && !r.vendor_type.contains("Enterprise"))
    {
        record.vendor_type.push_str(" Enterprise");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::DEFAULT_SCRIPT_TIMEOUT_SECS;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    fn visitor() -> PageVisitor {
        let client = Client::new();
        PageVisitor::new(client.clone(), ScriptFetcher::new(client, DEFAULT_SCRIPT_TIMEOUT_SECS))
    }

    async fn serve(mock_server: &MockServer, route: &str, html: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(html),
            )
            .mount(mock_server)
            .await;
    }

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://example.com/account/").unwrap();

        assert_eq!(
            resolve_url(&base, "login#form").unwrap().as_str(),
            "https://example.com/account/login"
        );
        assert_eq!(
            resolve_url(&base, "/signup").unwrap().as_str(),
            "https://example.com/signup"
        );
        assert!(resolve_url(&base, "javascript:void(0)").is_none());
        assert!(resolve_url(&base, "mailto:a@example.com").is_none());
        assert!(resolve_url(&base, "#top").is_none());
        assert!(resolve_url(&base, "").is_none());
    }

    #[test]
    fn test_is_auth_relevant() {
        assert!(is_auth_relevant("https://example.com/Login"));
        assert!(is_auth_relevant("https://example.com/users/sign-up"));
        assert!(is_auth_relevant("https://example.com/?next=verify"));
        assert!(!is_auth_relevant("https://example.com/pricing"));
    }

    #[test]
    fn test_annotate_enterprise() {
        let mut records = vec![
            CaptchaRecord::new("reCAPTCHA v3", "6LcEnterpriseKey1", Location::ScriptSource, "https://a/"),
            CaptchaRecord::new("hCaptcha", "hcaptcha-key-0001", Location::HtmlElement, "https://a/"),
            CaptchaRecord::new("reCAPTCHA Enterprise", "6LcEnterpriseKey2", Location::ScriptContent, "https://a/"),
        ];

        annotate_enterprise(
            r#"<script src="https://www.google.com/recaptcha/enterprise.js"></script>"#,
            &mut records,
        );

        assert_eq!(records[0].vendor_type, "reCAPTCHA v3 Enterprise");
        assert_eq!(records[1].vendor_type, "hCaptcha");
        assert_eq!(records[2].vendor_type, "reCAPTCHA Enterprise");
    }

    #[test]
    fn test_annotate_enterprise_without_marker() {
        let mut records = vec![CaptchaRecord::new(
            "reCAPTCHA v2",
            "6LcPlainKey0001",
            Location::HtmlElement,
            "https://a/",
        )];
        annotate_enterprise("<html>enterprise plans available</html>", &mut records);
        assert_eq!(records[0].vendor_type, "reCAPTCHA v2");
    }

    #[test]
    fn test_harvest_links_same_origin_only() {
        let page = Url::parse("https://example.com/").unwrap();
        let document = Html::parse_document(
            r#"
            <a href="/login">Log in</a>
            <a href="/login#again">Log in again</a>
            <a href="https://other.example/login">Elsewhere</a>
            <a href="http://example.com/register">Wrong scheme</a>
            <a href="/about">About</a>
            <a href="account/settings">Settings</a>
            <a>No href</a>
            "#,
        );

        let links = harvest_links(&document, &page, &page);
        assert_eq!(
            links,
            vec![
                "https://example.com/login".to_string(),
                "https://example.com/account/settings".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_visit_is_idempotent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let base = Url::parse(&mock_server.uri()).unwrap();
        let visitor = visitor();
        let mut visited = HashSet::new();

        assert!(visitor.visit(&mut visited, &base, "/").await.is_some());
        assert!(visitor.visit(&mut visited, &base, "/").await.is_none());
        assert!(visitor.visit(&mut visited, &base, "/#fragment").await.is_none());
        assert_eq!(visited.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_page_is_empty_but_visited() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let base = Url::parse(&mock_server.uri()).unwrap();
        let mut visited = HashSet::new();
        let visit = visitor().visit(&mut visited, &base, "/login").await.unwrap();

        assert!(visit.records.is_empty());
        assert!(visit.links.is_empty());
        assert!(visited.contains(&visit.url));
    }

    #[tokio::test]
    async fn test_script_records_precede_element_records() {
        let mock_server = MockServer::start().await;
        serve(
            &mock_server,
            "/",
            r#"<html><body>
                <div class="h-captcha" data-sitekey="10000000-ffff-ffff-ffff-000000000001"></div>
                <script>turnstile.render('myturnstilekey123')</script>
                <script src="/static/captcha-config.js"></script>
                <script src="/hcaptcha/1/api.js?sitekey=20000000-ffff-ffff-ffff-000000000002"></script>
                <iframe src="https://www.google.com/recaptcha/api2/anchor?k=6LcFrameAnchorKey&size=normal"></iframe>
            </body></html>"#,
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/static/captcha-config.js"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/javascript")
                    .set_body_string("var captchaKey = 'external-config-key';"),
            )
            .mount(&mock_server)
            .await;

        let base = Url::parse(&mock_server.uri()).unwrap();
        let mut visited = HashSet::new();
        let visit = visitor().visit(&mut visited, &base, "/").await.unwrap();

        let found: Vec<(&str, Location)> = visit
            .records
            .iter()
            .map(|r| (r.identifier.as_str(), r.location))
            .collect();

        assert_eq!(
            found,
            vec![
                ("myturnstilekey123", Location::ScriptContent),
                ("external-config-key", Location::ExternalScript),
                ("20000000-ffff-ffff-ffff-000000000002", Location::ScriptSource),
                ("10000000-ffff-ffff-ffff-000000000001", Location::HtmlElement),
                ("6LcFrameAnchorKey", Location::UrlParameter),
            ]
        );
        assert_eq!(visit.records[0].vendor_type, "Cloudflare Turnstile");
    }

    #[tokio::test]
    async fn test_duplicate_detections_collapse_within_page() {
        let mock_server = MockServer::start().await;
        serve(
            &mock_server,
            "/",
            r#"<html><body>
                <script>turnstile.render('myturnstilekey123')</script>
                <script>turnstile.render('myturnstilekey123')</script>
            </body></html>"#,
        )
        .await;

        let base = Url::parse(&mock_server.uri()).unwrap();
        let mut visited = HashSet::new();
        let visit = visitor().visit(&mut visited, &base, "/").await.unwrap();
        assert_eq!(visit.records.len(), 1);
    }
}
