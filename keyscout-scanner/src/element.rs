//! Attribute-based widget detection over parsed markup.

use crate::extractor::{
    FRIENDLY_CAPTCHA, FUNCAPTCHA, HCAPTCHA, MTCAPTCHA, PERIMETERX, RECAPTCHA_V2, TURNSTILE,
    UNKNOWN_CAPTCHA, is_plausible_identifier,
};
use crate::record::{CaptchaRecord, Location, WidgetMetadata};
use scraper::node::Element;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

const WIDGET_SELECTOR: &str = "[data-sitekey], [data-pkey], [data-px-appid], \
    [data-arkose-public-key], [data-mtcaptcha-sitekey], [data-turnstile-key], \
    [data-cf-turnstile], .cf-turnstile, .g-recaptcha, .h-captcha";

static WIDGETS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(WIDGET_SELECTOR).expect("hardcoded selector is valid"));

const DEFAULT_THEME: &str = "light";
const DEFAULT_SIZE: &str = "normal";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Recaptcha,
    Hcaptcha,
    Turnstile,
    FriendlyCaptcha,
    FunCaptcha,
    PerimeterX,
    MtCaptcha,
    Unknown,
}

impl WidgetKind {
    pub fn vendor_type(&self) -> &'static str {
        match self {
            WidgetKind::Recaptcha => RECAPTCHA_V2,
            WidgetKind::Hcaptcha => HCAPTCHA,
            WidgetKind::Turnstile => TURNSTILE,
            WidgetKind::FriendlyCaptcha => FRIENDLY_CAPTCHA,
            WidgetKind::FunCaptcha => FUNCAPTCHA,
            WidgetKind::PerimeterX => PERIMETERX,
            WidgetKind::MtCaptcha => MTCAPTCHA,
            WidgetKind::Unknown => UNKNOWN_CAPTCHA,
        }
    }

    /// Attributes that may carry the identifier, most specific first.
    fn key_attributes(&self) -> &'static [&'static str] {
        match self {
            WidgetKind::Turnstile => &["data-sitekey", "data-turnstile-key", "data-cf-turnstile"],
            WidgetKind::FunCaptcha => &["data-pkey", "data-arkose-public-key", "data-sitekey"],
            WidgetKind::PerimeterX => &["data-px-appid"],
            WidgetKind::MtCaptcha => &["data-mtcaptcha-sitekey", "data-sitekey"],
            _ => &["data-sitekey"],
        }
    }
}

fn has_class(element: &Element, class: &str) -> bool {
    element.classes().any(|c| c.eq_ignore_ascii_case(class))
}

fn has_attr(element: &Element, name: &str) -> bool {
    element.attr(name).is_some()
}

/// Decide which vendor an element declares.
///
/// Explicit vendor classes win over vendor-specific attribute names, which
/// win over a bare `data-sitekey`.
pub fn classify(element: &Element) -> Option<WidgetKind> {
    if has_class(element, "g-recaptcha") {
        Some(WidgetKind::Recaptcha)
    } else if has_class(element, "h-captcha") {
        Some(WidgetKind::Hcaptcha)
    } else if has_class(element, "cf-turnstile") {
        Some(WidgetKind::Turnstile)
    } else if has_class(element, "frc-captcha") {
        Some(WidgetKind::FriendlyCaptcha)
    } else if has_attr(element, "data-pkey") || has_attr(element, "data-arkose-public-key") {
        Some(WidgetKind::FunCaptcha)
    } else if has_attr(element, "data-px-appid") {
        Some(WidgetKind::PerimeterX)
    } else if has_attr(element, "data-mtcaptcha-sitekey") {
        Some(WidgetKind::MtCaptcha)
    } else if has_attr(element, "data-turnstile-key") || has_attr(element, "data-cf-turnstile") {
        Some(WidgetKind::Turnstile)
    } else if has_attr(element, "data-sitekey") {
        Some(WidgetKind::Unknown)
    } else {
        None
    }
}

fn identifier_for(element: &Element, kind: WidgetKind) -> Option<String> {
    kind.key_attributes()
        .iter()
        .filter_map(|name| element.attr(name))
        .map(str::trim)
        .find(|value| is_plausible_identifier(value))
        .map(String::from)
}

fn attr_string(element: &Element, name: &str) -> Option<String> {
    element
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn turnstile_variant(appearance: &str) -> String {
    match appearance.to_ascii_lowercase().as_str() {
        "always" => "Always Visible".to_string(),
        "execute" => "Execute".to_string(),
        "interaction-only" => "Interaction Only".to_string(),
        other => other.to_string(),
    }
}

fn metadata_for(element: &Element, kind: WidgetKind) -> WidgetMetadata {
    let action = attr_string(element, "data-action");

    match kind {
        WidgetKind::Recaptcha | WidgetKind::Hcaptcha => {
            let size = attr_string(element, "data-size").unwrap_or_else(|| DEFAULT_SIZE.to_string());
            let theme = attr_string(element, "data-theme").unwrap_or_else(|| DEFAULT_THEME.to_string());
            let product = if kind == WidgetKind::Recaptcha { "reCAPTCHA" } else { "hCaptcha" };
            let variant = if size.eq_ignore_ascii_case("invisible") {
                format!("Invisible {}", product)
            } else {
                format!("Checkbox {}", product)
            };

            WidgetMetadata {
                difficulty: Some(size.clone()),
                variant: Some(variant),
                theme: Some(theme),
                size: Some(size),
                action,
            }
        }
        WidgetKind::Turnstile => {
            let appearance =
                attr_string(element, "data-appearance").unwrap_or_else(|| "always".to_string());

            WidgetMetadata {
                difficulty: None,
                variant: Some(turnstile_variant(&appearance)),
                theme: Some(attr_string(element, "data-theme").unwrap_or_else(|| DEFAULT_THEME.to_string())),
                size: Some(attr_string(element, "data-size").unwrap_or_else(|| DEFAULT_SIZE.to_string())),
                action,
            }
        }
        _ => WidgetMetadata {
            theme: attr_string(element, "data-theme"),
            size: attr_string(element, "data-size"),
            action,
            ..WidgetMetadata::default()
        },
    }
}

/// Scan a parsed page for widgets declared through markup attributes.
pub fn scan(document: &Html, page_url: &str) -> Vec<CaptchaRecord> {
    let mut records = Vec::new();

    for element in document.select(&WIDGETS) {
        let element = element.value();
        let Some(kind) = classify(element) else {
            continue;
        };
        let Some(identifier) = identifier_for(element, kind) else {
            debug!("{:?} widget on {} has no usable key", kind, page_url);
            continue;
        };

        debug!("Found {} widget {} on {}", kind.vendor_type(), identifier, page_url);
        records.push(
            CaptchaRecord::new(kind.vendor_type(), identifier, Location::HtmlElement, page_url)
                .with_metadata(metadata_for(element, kind)),
        );
    }

    records
}
