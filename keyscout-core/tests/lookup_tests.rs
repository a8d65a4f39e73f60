// Tests for multi-target lookup orchestration

use keyscout_core::lookup::{
    LookupOptions, LookupProgressCallback, SiteReport, execute_lookup, extract_url_path,
    normalize_seed,
};
use keyscout_scanner::DedupPolicy;
use std::sync::{Arc, Mutex};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

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

fn options(urls: Vec<String>) -> LookupOptions {
    LookupOptions {
        urls,
        ..LookupOptions::default()
    }
}

// ============================================================================
// Seed handling
// ============================================================================

#[test]
fn test_normalize_seed_adds_https() {
    assert_eq!(normalize_seed("example.com"), "https://example.com");
    assert_eq!(normalize_seed("  example.com/login "), "https://example.com/login");
}

#[test]
fn test_normalize_seed_keeps_scheme() {
    assert_eq!(normalize_seed("http://example.com"), "http://example.com");
    assert_eq!(normalize_seed("HTTPS://example.com"), "HTTPS://example.com");
    assert_eq!(normalize_seed("ftp://example.com"), "ftp://example.com");
    assert_eq!(normalize_seed(""), "");
}

#[test]
fn test_extract_url_path() {
    assert_eq!(extract_url_path("https://example.com/account/login"), "/account/login");
    assert_eq!(extract_url_path("https://example.com/"), "/");
    assert_eq!(extract_url_path("https://example.com"), "/");
    assert_eq!(extract_url_path("not a url"), "not a url");
}

#[test]
fn test_lookup_options_defaults() {
    let defaults = LookupOptions::default();
    assert_eq!(defaults.budget, 10);
    assert_eq!(defaults.timeout_secs, 10);
    assert_eq!(defaults.script_timeout_secs, 5);
    assert_eq!(defaults.dedup_policy, DedupPolicy::Identifier);
    assert!(!defaults.show_progress);
}

// ============================================================================
// Lookup runs
// ============================================================================

#[tokio::test]
async fn test_empty_target_list_is_an_error() {
    let result = execute_lookup(options(Vec::new()), None).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_single_target_lookup() {
    let mock_server = MockServer::start().await;
    serve(
        &mock_server,
        "/",
        r#"<div class="g-recaptcha" data-sitekey="6Lc_example_key_123" data-size="invisible"></div>
           <a href="/login">Log in</a>"#,
    )
    .await;
    serve(
        &mock_server,
        "/login",
        r#"<script>turnstile.render('myturnstilekey123')</script>"#,
    )
    .await;

    let reports = execute_lookup(options(vec![mock_server.uri()]), None)
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.seed, mock_server.uri());
    assert_eq!(report.pages_visited, 2);
    assert!(report.result.error.is_none());

    let keys: Vec<&str> = report
        .result
        .captchas
        .iter()
        .map(|r| r.identifier.as_str())
        .collect();
    assert_eq!(keys, vec!["6Lc_example_key_123", "myturnstilekey123"]);
}

#[tokio::test]
async fn test_failed_target_does_not_abort_run() {
    let mock_server = MockServer::start().await;
    serve(
        &mock_server,
        "/",
        r#"<div class="h-captcha" data-sitekey="10000000-ffff-ffff-ffff-000000000001"></div>"#,
    )
    .await;

    let messages: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let messages_clone = messages.clone();
    let callback: LookupProgressCallback = Arc::new(move |msg: String| {
        messages_clone.lock().unwrap().push(msg);
    });

    let reports = execute_lookup(
        options(vec!["not a url".to_string(), mock_server.uri()]),
        Some(callback),
    )
    .await
    .unwrap();

    assert_eq!(reports.len(), 2);
    assert!(reports[0].result.captchas.is_empty());
    assert_eq!(
        reports[0].result.error.as_deref(),
        Some("Failed to analyze the website. Please check the URL and try again.")
    );
    assert_eq!(reports[0].pages_visited, 0);

    assert_eq!(reports[1].result.captchas.len(), 1);
    assert_eq!(reports[1].result.captchas[0].vendor_type, "hCaptcha");

    let messages = messages.lock().unwrap();
    assert!(messages.iter().any(|m| m.starts_with("Looking up host 1/2")));
    assert!(messages.iter().any(|m| m.contains("Failed to look up https://not a url")));
}

#[tokio::test]
async fn test_budget_option_is_applied() {
    let mock_server = MockServer::start().await;
    let links: String = (1..=6)
        .map(|i| format!(r#"<a href="/account/{}">Account</a>"#, i))
        .collect();
    serve(&mock_server, "/", &links).await;
    for i in 1..=6 {
        serve(&mock_server, &format!("/account/{}", i), &links).await;
    }

    let reports = execute_lookup(
        LookupOptions {
            urls: vec![mock_server.uri()],
            budget: 4,
            ..LookupOptions::default()
        },
        None,
    )
    .await
    .unwrap();

    assert_eq!(reports[0].pages_visited, 4);
}

#[tokio::test]
async fn test_site_report_serializes() {
    let mock_server = MockServer::start().await;
    serve(&mock_server, "/", "<html><body>nothing here</body></html>").await;

    let reports = execute_lookup(options(vec![mock_server.uri()]), None)
        .await
        .unwrap();

    let json = serde_json::to_value(&reports[0]).unwrap();
    assert_eq!(json["pages_visited"], 1);
    assert_eq!(json["result"]["captchas"], serde_json::json!([]));
    assert!(json["result"].get("error").is_none());

    let back: SiteReport = serde_json::from_value(json).unwrap();
    assert_eq!(back, reports[0]);
}
