//! Vendor identifier extraction from raw text.
//!
//! Every CAPTCHA vendor embeds its public site key in a recognisable way:
//! a call into the vendor's JavaScript API, a configuration object, or a
//! query parameter on the loader script. This module keeps those
//! conventions in a single ordered table ([`VENDOR_MATCHERS`]) and applies
//! it to any block of text. Extraction is pure: no network, no DOM.

use crate::record::WidgetMetadata;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

pub const RECAPTCHA: &str = "reCAPTCHA";
pub const RECAPTCHA_V2: &str = "reCAPTCHA v2";
pub const RECAPTCHA_V3: &str = "reCAPTCHA v3";
pub const RECAPTCHA_ENTERPRISE: &str = "reCAPTCHA Enterprise";
pub const HCAPTCHA: &str = "hCaptcha";
pub const TURNSTILE: &str = "Cloudflare Turnstile";
pub const FUNCAPTCHA: &str = "FunCaptcha";
pub const FRIENDLY_CAPTCHA: &str = "FriendlyCaptcha";
pub const MTCAPTCHA: &str = "MTCaptcha";
pub const GEETEST: &str = "GeeTest";
pub const KEYCAPTCHA: &str = "KeyCaptcha";
pub const PERIMETERX: &str = "PerimeterX";
pub const DYNAMIC_CAPTCHA: &str = "Dynamic CAPTCHA";
pub const GENERIC_CAPTCHA: &str = "Generic CAPTCHA";
pub const UNKNOWN_CAPTCHA: &str = "Unknown CAPTCHA";

/// Identifiers must be strictly longer than this.
const MIN_IDENTIFIER_LEN: usize = 5;

/// Values that appear where a key would, but are render modes.
const REJECTED_IDENTIFIERS: &[&str] = &["explicit", "onload"];

/// A declarative rule recognising one vendor's embedding convention.
///
/// `pattern` must define a `key` capture group. Matchers with
/// `with_attributes` may also define `options` (the body of a vendor
/// options object) or direct `size`, `theme` and `action` groups.
#[derive(Debug, Clone, Copy)]
pub struct VendorMatcher {
    pub vendor: &'static str,
    pub pattern: &'static str,
    pub with_attributes: bool,
}

impl VendorMatcher {
    pub const fn new(vendor: &'static str, pattern: &'static str) -> Self {
        Self {
            vendor,
            pattern,
            with_attributes: false,
        }
    }

    pub const fn with_attributes(vendor: &'static str, pattern: &'static str) -> Self {
        Self {
            vendor,
            pattern,
            with_attributes: true,
        }
    }
}

/// Matchers in priority order. When two matchers capture the same
/// identifier in one text, the earlier one wins.
pub const VENDOR_MATCHERS: &[VendorMatcher] = &[
    VendorMatcher::with_attributes(
        RECAPTCHA_ENTERPRISE,
        r#"grecaptcha\.enterprise\.execute\s*\(\s*['"](?P<key>[^'"]+)['"]\s*(?:,\s*\{(?P<options>[^}]*)\})?"#,
    ),
    VendorMatcher::with_attributes(
        RECAPTCHA_ENTERPRISE,
        r#"grecaptcha\.enterprise\.render\s*\((?:[^,()]|\([^()]*\))*,\s*\{(?P<options>[^}]*?['"]?sitekey['"]?\s*:\s*['"](?P<key>[^'"]+)['"][^}]*)\}"#,
    ),
    VendorMatcher::with_attributes(
        RECAPTCHA_V3,
        r#"grecaptcha\.execute\s*\(\s*['"](?P<key>[^'"]+)['"]\s*(?:,\s*\{(?P<options>[^}]*)\})?"#,
    ),
    VendorMatcher::with_attributes(
        RECAPTCHA_V2,
        r#"grecaptcha\.render\s*\((?:[^,()]|\([^()]*\))*,\s*\{(?P<options>[^}]*?['"]?sitekey['"]?\s*:\s*['"](?P<key>[^'"]+)['"][^}]*)\}"#,
    ),
    VendorMatcher::with_attributes(
        HCAPTCHA,
        r#"hcaptcha\.render\s*\((?:[^,()]|\([^()]*\))*,\s*\{(?P<options>[^}]*?['"]?sitekey['"]?\s*:\s*['"](?P<key>[^'"]+)['"][^}]*)\}"#,
    ),
    VendorMatcher::new(
        TURNSTILE,
        r#"turnstile\.render\s*\(\s*['"](?P<key>[^'"]+)['"]\s*\)"#,
    ),
    VendorMatcher::with_attributes(
        TURNSTILE,
        r#"turnstile\.render\s*\((?:[^,()]|\([^()]*\))*,\s*\{(?P<options>[^}]*?['"]?sitekey['"]?\s*:\s*['"](?P<key>[^'"]+)['"][^}]*)\}"#,
    ),
    VendorMatcher::new(
        FUNCAPTCHA,
        r#"(?:public_key|publicKey|data-pkey)['"]?\s*[:=]\s*['"](?P<key>[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12})['"]"#,
    ),
    VendorMatcher::new(
        FUNCAPTCHA,
        r#"(?:arkoselabs\.com|funcaptcha\.com)/v2/(?P<key>[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12})"#,
    ),
    VendorMatcher::new(
        FRIENDLY_CAPTCHA,
        r#"class=["']frc-captcha["'][^>]*?data-sitekey=["'](?P<key>[^"']+)["']"#,
    ),
    VendorMatcher::new(MTCAPTCHA, r#"['"](?P<key>MTPublic-[A-Za-z0-9]+)['"]"#),
    VendorMatcher::new(GEETEST, r#"\bgt['"]?\s*:\s*['"](?P<key>[^'"]+)['"]"#),
    VendorMatcher::new(
        KEYCAPTCHA,
        r#"s_s_c_user_id['"]?\s*[:=]\s*['"](?P<key>[^'"]+)['"]"#,
    ),
    VendorMatcher::new(
        PERIMETERX,
        r#"PX_[A-Z0-9]+['"]?\s*:\s*['"](?P<key>[^'"]+)['"]"#,
    ),
    VendorMatcher::new(
        PERIMETERX,
        r#"_pxAppId['"]?\s*[:=]\s*['"](?P<key>[^'"]+)['"]"#,
    ),
    VendorMatcher::new(RECAPTCHA_V3, r#"\brender=(?P<key>[^&'"\s]+)"#),
    VendorMatcher::new(
        RECAPTCHA,
        r#"(?i)['"]?sitekey['"]?\s*:\s*['"](?P<key>6L[0-9A-Za-z_-]{38})['"]"#,
    ),
    VendorMatcher::new(
        HCAPTCHA,
        r#"(?i)['"]?sitekey['"]?\s*:\s*['"](?P<key>[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})['"]"#,
    ),
    VendorMatcher::new(
        TURNSTILE,
        r#"(?i)['"]?sitekey['"]?\s*:\s*['"](?P<key>0x4[0-9A-Za-z_-]{10,})['"]"#,
    ),
    VendorMatcher::new(
        RECAPTCHA,
        r#"(?i)['"]?sitekey['"]?\s*:\s*['"](?P<key>[^'"]+)['"]"#,
    ),
    VendorMatcher::new(
        UNKNOWN_CAPTCHA,
        r#"(?i)data-sitekey\s*=\s*['"](?P<key>[^'"]+)['"]"#,
    ),
    VendorMatcher::new(
        DYNAMIC_CAPTCHA,
        r#"captcha\.execute\s*\(\s*['"](?P<key>[^'"]+)['"]"#,
    ),
    VendorMatcher::new(
        DYNAMIC_CAPTCHA,
        r#"loadCaptcha\s*\(\s*['"](?P<key>[^'"]+)['"]"#,
    ),
    VendorMatcher::new(
        GENERIC_CAPTCHA,
        r#"(?i)captcha_?key['"]?\s*[:=]\s*['"](?P<key>[^'"]+)['"]"#,
    ),
];

static DEFAULT_MATCHERS: LazyLock<MatcherSet> = LazyLock::new(|| {
    MatcherSet::new(VENDOR_MATCHERS).expect("hardcoded vendor patterns are valid")
});

static SIZE_OPTION: LazyLock<Regex> = LazyLock::new(|| option_regex("size"));
static THEME_OPTION: LazyLock<Regex> = LazyLock::new(|| option_regex("theme"));
static ACTION_OPTION: LazyLock<Regex> = LazyLock::new(|| option_regex("action"));

fn option_regex(name: &str) -> Regex {
    Regex::new(&format!(r#"\b{}['"]?\s*:\s*['"]([^'"]+)['"]"#, name))
        .expect("hardcoded option pattern is valid")
}

/// One identifier pulled out of a block of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub vendor_type: String,
    pub identifier: String,
    pub metadata: WidgetMetadata,
}

impl Extraction {
    fn new(vendor_type: &str, identifier: &str) -> Self {
        Self {
            vendor_type: vendor_type.to_string(),
            identifier: identifier.to_string(),
            metadata: WidgetMetadata::default(),
        }
    }
}

struct CompiledMatcher {
    vendor: &'static str,
    regex: Regex,
    with_attributes: bool,
}

/// A compiled, ordered matcher table.
pub struct MatcherSet {
    matchers: Vec<CompiledMatcher>,
}

impl MatcherSet {
    pub fn new(table: &[VendorMatcher]) -> Result<Self, regex::Error> {
        let matchers = table
            .iter()
            .map(|m| {
                Ok(CompiledMatcher {
                    vendor: m.vendor,
                    regex: Regex::new(m.pattern)?,
                    with_attributes: m.with_attributes,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self { matchers })
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Apply every matcher in order. The first matcher to claim an
    /// identifier wins; later matches of the same value are skipped.
    pub fn extract(&self, text: &str) -> Vec<Extraction> {
        let mut extractions = Vec::new();
        let mut claimed: HashSet<String> = HashSet::new();

        for matcher in &self.matchers {
            for caps in matcher.regex.captures_iter(text) {
                let Some(key) = caps.name("key") else {
                    continue;
                };
                let identifier = key.as_str().trim();
                if !is_plausible_identifier(identifier) || claimed.contains(identifier) {
                    continue;
                }

                let mut extraction = Extraction::new(matcher.vendor, identifier);
                if matcher.with_attributes {
                    let options = caps.name("options").map(|m| m.as_str()).unwrap_or("");
                    extraction.metadata.size = capture_or_option(&caps, "size", options, &SIZE_OPTION);
                    extraction.metadata.theme =
                        capture_or_option(&caps, "theme", options, &THEME_OPTION);
                    extraction.metadata.action =
                        capture_or_option(&caps, "action", options, &ACTION_OPTION);
                }

                claimed.insert(identifier.to_string());
                extractions.push(extraction);
            }
        }

        extractions
    }
}

fn capture_or_option(
    caps: &regex::Captures<'_>,
    group: &str,
    options: &str,
    option_regex: &Regex,
) -> Option<String> {
    caps.name(group)
        .map(|m| m.as_str().to_string())
        .or_else(|| {
            option_regex
                .captures(options)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        })
}

/// Extract identifiers from text using the built-in matcher table.
pub fn extract(text: &str) -> Vec<Extraction> {
    DEFAULT_MATCHERS.extract(text)
}

/// Rejects truncated captures and template fragments.
pub fn is_plausible_identifier(candidate: &str) -> bool {
    let trimmed = candidate.trim();
    trimmed.chars().count() > MIN_IDENTIFIER_LEN
        && !trimmed.starts_with(['<', '>', '{', '}'])
        && !REJECTED_IDENTIFIERS
            .iter()
            .any(|rejected| trimmed.eq_ignore_ascii_case(rejected))
}

/// Extract identifiers carried in a URL: loader script query parameters,
/// widget iframe parameters, and key-bearing path segments.
pub fn extract_from_url(url: &Url) -> Vec<Extraction> {
    let host = url.host_str().unwrap_or("").to_lowercase();
    let path = url.path().to_lowercase();
    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };

    let mut candidates: Vec<Extraction> = Vec::new();

    if host.contains("hcaptcha") || path.contains("hcaptcha") {
        if let Some(key) = param("sitekey") {
            candidates.push(Extraction::new(HCAPTCHA, &key));
        }
    } else if host.contains("recaptcha") || path.contains("recaptcha") {
        if let Some(key) = param("render") {
            candidates.push(Extraction::new(RECAPTCHA_V3, &key));
        }
        if let Some(key) = param("k") {
            let mut extraction = Extraction::new(RECAPTCHA, &key);
            extraction.metadata.size = param("size");
            extraction.metadata.theme = param("theme");
            candidates.push(extraction);
        }
    } else if host.contains("challenges.cloudflare.com") || path.contains("turnstile") {
        if let Some(key) = param("sitekey") {
            candidates.push(Extraction::new(TURNSTILE, &key));
        }
        if let Some(segment) = url
            .path_segments()
            .and_then(|mut segments| segments.find(|s| s.starts_with("0x4")))
        {
            candidates.push(Extraction::new(TURNSTILE, segment));
        }
    } else if host.contains("arkoselabs") || host.contains("funcaptcha") {
        if let Some(key) = param("pk") {
            candidates.push(Extraction::new(FUNCAPTCHA, &key));
        }
        if let Some(segment) = url.path_segments().and_then(|segments| {
            let segments: Vec<&str> = segments.collect();
            segments
                .windows(2)
                .find(|pair| pair[0] == "v2")
                .map(|pair| pair[1].to_string())
        }) {
            candidates.push(Extraction::new(FUNCAPTCHA, &segment));
        }
    } else if let Some(key) = param("sitekey") {
        candidates.push(Extraction::new(UNKNOWN_CAPTCHA, &key));
    }

    let mut claimed: HashSet<String> = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| is_plausible_identifier(&c.identifier))
        .filter(|c| claimed.insert(c.identifier.clone()))
        .collect()
}
