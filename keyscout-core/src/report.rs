// Report generation from lookup results

use crate::lookup::SiteReport;
use colored::Colorize;
use keyscout_scanner::CaptchaRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const HEAVY_RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";
const LIGHT_RULE: &str = "────────────────────────────────────────────────────────────────────────────────\n";

const CSV_HEADER: &str =
    "seed,vendor_type,identifier,location,found_on_url,difficulty,variant,theme,size,action";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Csv,
    Markdown,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }
}

/// Render `sites` in `format`. Only JSON serialisation can fail.
pub fn generate_report(sites: &[SiteReport], format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(sites)),
        ReportFormat::Json => generate_json_report(sites),
        ReportFormat::Csv => Ok(generate_csv_report(sites)),
        ReportFormat::Markdown => Ok(generate_markdown_report(sites)),
    }
}

fn total_records(sites: &[SiteReport]) -> usize {
    sites.iter().map(|s| s.result.captchas.len()).sum()
}

/// Record counts per vendor type, in name order.
pub fn vendor_breakdown(sites: &[SiteReport]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in sites.iter().flat_map(|s| s.result.captchas.iter()) {
        *counts.entry(record.vendor_type.clone()).or_insert(0) += 1;
    }
    counts
}

fn metadata_pairs(record: &CaptchaRecord) -> Vec<(&'static str, &str)> {
    [
        ("Difficulty", record.difficulty.as_deref()),
        ("Variant", record.variant.as_deref()),
        ("Theme", record.theme.as_deref()),
        ("Size", record.size.as_deref()),
        ("Action", record.action.as_deref()),
    ]
    .into_iter()
    .filter_map(|(label, value)| value.map(|v| (label, v)))
    .collect()
}

pub fn generate_text_report(sites: &[SiteReport]) -> String {
    let mut report = String::new();

    report.push_str(HEAVY_RULE);
    report.push_str("                         KEYSCOUT CAPTCHA REPORT\n");
    report.push_str(HEAVY_RULE);
    report.push('\n');

    report.push_str(&format!(
        "Generated:    {}\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    report.push_str(&format!("Targets:      {}\n", sites.len()));
    report.push_str(&format!(
        "Pages:        {}\n",
        sites.iter().map(|s| s.pages_visited).sum::<usize>()
    ));
    report.push_str(&format!("Records:      {}\n\n", total_records(sites)));

    let breakdown = vendor_breakdown(sites);
    if !breakdown.is_empty() {
        for (vendor, count) in &breakdown {
            report.push_str(&format!("  {:<24} {}\n", vendor, count));
        }
        report.push('\n');
    }

    for site in sites {
        report.push_str(HEAVY_RULE);
        report.push_str(&format!("{}\n", site.seed.bright_white().bold()));
        report.push_str(&format!("Pages visited: {}\n", site.pages_visited));
        report.push_str(HEAVY_RULE);
        report.push('\n');

        if let Some(ref error) = site.result.error {
            report.push_str(&format!("  {} {}\n\n", "✗".red().bold(), error));
            continue;
        }

        if site.result.captchas.is_empty() {
            report.push_str("  No CAPTCHA configurations found\n\n");
            continue;
        }

        for (idx, record) in site.result.captchas.iter().enumerate() {
            report.push_str(&format!(
                "[{}] {}\n",
                idx + 1,
                record.vendor_type.green().bold()
            ));
            report.push_str(&format!("Identifier:   {}\n", record.identifier.bright_white()));
            report.push_str(&format!("Location:     {}\n", record.location));
            report.push_str(&format!("Found on:     {}\n", record.found_on_url));
            for (label, value) in metadata_pairs(record) {
                report.push_str(&format!("{:<14}{}\n", format!("{}:", label), value));
            }
            report.push('\n');
            report.push_str(LIGHT_RULE);
            report.push('\n');
        }
    }

    report.push_str("\nGenerated by keyscout\n");
    report.push_str("For authorized security testing only.\n\n");

    report
}

pub fn generate_json_report(sites: &[SiteReport]) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "keyscout",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json",
                "disclaimer": "For authorized security testing only"
            },
            "summary": {
                "targets": sites.len(),
                "pages_visited": sites.iter().map(|s| s.pages_visited).sum::<usize>(),
                "total_records": total_records(sites),
                "vendors": vendor_breakdown(sites)
            },
            "sites": sites
        }
    });

    serde_json::to_string_pretty(&json_report)
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn generate_csv_report(sites: &[SiteReport]) -> String {
    let mut report = String::from(CSV_HEADER);
    report.push('\n');

    for site in sites {
        for record in &site.result.captchas {
            let fields = [
                site.seed.as_str(),
                record.vendor_type.as_str(),
                record.identifier.as_str(),
                record.location.as_str(),
                record.found_on_url.as_str(),
                record.difficulty.as_deref().unwrap_or(""),
                record.variant.as_deref().unwrap_or(""),
                record.theme.as_deref().unwrap_or(""),
                record.size.as_deref().unwrap_or(""),
                record.action.as_deref().unwrap_or(""),
            ];
            let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
            report.push_str(&row.join(","));
            report.push('\n');
        }
    }

    report
}

fn markdown_cell(value: &str) -> String {
    value.replace('|', "\\|").replace(['\n', '\r'], " ")
}

pub fn generate_markdown_report(sites: &[SiteReport]) -> String {
    let mut report = String::from("# keyscout CAPTCHA report\n\n");
    report.push_str(&format!(
        "_Generated {}, {} target(s), {} record(s)_\n\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        sites.len(),
        total_records(sites)
    ));

    for site in sites {
        report.push_str(&format!("## {}\n\n", markdown_cell(&site.seed)));
        report.push_str(&format!("Pages visited: {}\n\n", site.pages_visited));

        if let Some(ref error) = site.result.error {
            report.push_str(&format!("> {}\n\n", markdown_cell(error)));
            continue;
        }
        if site.result.captchas.is_empty() {
            report.push_str("_No CAPTCHA configurations found._\n\n");
            continue;
        }

        report.push_str("| Vendor | Identifier | Location | Found on | Details |\n");
        report.push_str("|---|---|---|---|---|\n");
        for record in &site.result.captchas {
            let details: Vec<String> = metadata_pairs(record)
                .into_iter()
                .map(|(label, value)| format!("{}: {}", label.to_lowercase(), value))
                .collect();
            report.push_str(&format!(
                "| {} | `{}` | {} | {} | {} |\n",
                markdown_cell(&record.vendor_type),
                markdown_cell(&record.identifier),
                record.location,
                markdown_cell(&record.found_on_url),
                markdown_cell(&details.join(", "))
            ));
        }
        report.push('\n');
    }

    report
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
