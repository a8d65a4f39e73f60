use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Where on a page a CAPTCHA identifier was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    #[serde(rename = "HTML Element")]
    HtmlElement,
    #[serde(rename = "Script Content")]
    ScriptContent,
    #[serde(rename = "Script Source")]
    ScriptSource,
    #[serde(rename = "External Script")]
    ExternalScript,
    #[serde(rename = "URL Parameter")]
    UrlParameter,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::HtmlElement => "HTML Element",
            Location::ScriptContent => "Script Content",
            Location::ScriptSource => "Script Source",
            Location::ExternalScript => "External Script",
            Location::UrlParameter => "URL Parameter",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive metadata a detector may attach to an identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetMetadata {
    pub difficulty: Option<String>,
    pub variant: Option<String>,
    pub theme: Option<String>,
    pub size: Option<String>,
    pub action: Option<String>,
}

/// A single CAPTCHA widget configuration found on a crawled page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptchaRecord {
    pub vendor_type: String,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub location: Location,
    pub found_on_url: String,
}

impl CaptchaRecord {
    pub fn new(
        vendor_type: impl Into<String>,
        identifier: impl Into<String>,
        location: Location,
        found_on_url: impl Into<String>,
    ) -> Self {
        Self {
            vendor_type: vendor_type.into(),
            identifier: identifier.into(),
            difficulty: None,
            variant: None,
            theme: None,
            size: None,
            action: None,
            location,
            found_on_url: found_on_url.into(),
        }
    }

    pub fn with_metadata(mut self, metadata: WidgetMetadata) -> Self {
        self.difficulty = metadata.difficulty;
        self.variant = metadata.variant;
        self.theme = metadata.theme;
        self.size = metadata.size;
        self.action = metadata.action;
        self
    }
}

/// Result of looking up one seed URL.
///
/// `error` is only set when the whole lookup failed, in which case
/// `captchas` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaResult {
    pub captchas: Vec<CaptchaRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaptchaResult {
    pub fn new(captchas: Vec<CaptchaRecord>) -> Self {
        Self {
            captchas,
            error: None,
        }
    }

    pub fn with_error(error: String) -> Self {
        Self {
            captchas: Vec::new(),
            error: Some(error),
        }
    }
}

/// The instrumented result of a crawl, before it is reduced to a
/// [`CaptchaResult`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlOutcome {
    pub records: Vec<CaptchaRecord>,
    /// Normalized URLs in the order they were visited.
    pub visited: Vec<String>,
    /// Distinct auth-relevant links seen across all pages.
    pub discovered: usize,
}

/// Key used when collapsing duplicate records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DedupPolicy {
    /// One record per identifier, whatever vendor or location reported it.
    #[default]
    Identifier,
    /// One record per `(identifier, vendor type, location)`.
    Composite,
}

impl DedupPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "identifier" | "id" => Some(DedupPolicy::Identifier),
            "composite" => Some(DedupPolicy::Composite),
            _ => None,
        }
    }
}

/// Drop later duplicates under `policy`, keeping discovery order.
pub fn dedup_records(records: Vec<CaptchaRecord>, policy: DedupPolicy) -> Vec<CaptchaRecord> {
    let mut seen: HashSet<(String, String, Option<Location>)> = HashSet::new();

    records
        .into_iter()
        .filter(|record| {
            let key = match policy {
                DedupPolicy::Identifier => (record.identifier.clone(), String::new(), None),
                DedupPolicy::Composite => (
                    record.identifier.clone(),
                    record.vendor_type.clone(),
                    Some(record.location),
                ),
            };
            seen.insert(key)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(vendor: &str, key: &str, location: Location, page: &str) -> CaptchaRecord {
        CaptchaRecord::new(vendor, key, location, page)
    }

    #[test]
    fn test_location_serializes_to_label() {
        let json = serde_json::to_string(&Location::HtmlElement).unwrap();
        assert_eq!(json, "\"HTML Element\"");
        assert_eq!(Location::ExternalScript.to_string(), "External Script");
    }

    #[test]
    fn test_record_json_shape() {
        let mut rec = record("reCAPTCHA v2", "6Lc_example_key_123", Location::HtmlElement, "https://example.com/");
        rec.size = Some("invisible".to_string());
        let value = serde_json::to_value(&rec).unwrap();

        assert_eq!(value["vendorType"], "reCAPTCHA v2");
        assert_eq!(value["identifier"], "6Lc_example_key_123");
        assert_eq!(value["foundOnUrl"], "https://example.com/");
        assert_eq!(value["size"], "invisible");
        assert!(value.get("theme").is_none());
    }

    #[test]
    fn test_error_result_has_no_captchas() {
        let result = CaptchaResult::with_error("boom".to_string());
        assert!(result.captchas.is_empty());
        assert_eq!(result.error.as_deref(), Some("boom"));

        let value = serde_json::to_value(CaptchaResult::new(vec![])).unwrap();
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_dedup_by_identifier_keeps_first_seen() {
        let records = vec![
            record("Unknown CAPTCHA", "shared-key-0001", Location::HtmlElement, "https://a/"),
            record("reCAPTCHA", "shared-key-0001", Location::ScriptContent, "https://a/login"),
            record("hCaptcha", "other-key-0002", Location::HtmlElement, "https://a/login"),
        ];

        let deduped = dedup_records(records, DedupPolicy::Identifier);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].vendor_type, "Unknown CAPTCHA");
        assert_eq!(deduped[1].identifier, "other-key-0002");
    }

    #[test]
    fn test_dedup_composite_keeps_distinct_detections() {
        let records = vec![
            record("Unknown CAPTCHA", "shared-key-0001", Location::HtmlElement, "https://a/"),
            record("reCAPTCHA", "shared-key-0001", Location::ScriptContent, "https://a/"),
            record("reCAPTCHA", "shared-key-0001", Location::ScriptContent, "https://a/other"),
        ];

        let deduped = dedup_records(records, DedupPolicy::Composite);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[1].found_on_url, "https://a/");
    }

    #[test]
    fn test_dedup_policy_from_str() {
        assert_eq!(DedupPolicy::from_str("Composite"), Some(DedupPolicy::Composite));
        assert_eq!(DedupPolicy::from_str("identifier"), Some(DedupPolicy::Identifier));
        assert_eq!(DedupPolicy::from_str("nope"), None);
    }
}
