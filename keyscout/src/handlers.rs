use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use keyscout_core::lookup::{
    LookupOptions, LookupProgressCallback, SiteReport, execute_lookup, normalize_seed,
};
use keyscout_core::report::{ReportFormat, generate_report, save_report};
use keyscout_scanner::DedupPolicy;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use url::Url;

// Helper functions for the scan handler

/// Load URLs from either a file or a single URL argument
pub fn load_urls_from_source(url: Option<&String>, hosts_file: Option<&PathBuf>) -> Result<Vec<String>> {
    if let Some(hosts_file_path) = hosts_file {
        load_urls_from_file(hosts_file_path)
    } else if let Some(url) = url {
        parse_url_line(url)
            .map(|u| vec![u])
            .ok_or_else(|| anyhow!("Invalid URL '{}'", url))
    } else {
        bail!("Either --url or --hosts-file must be provided")
    }
}

/// Load and parse URLs from a newline-delimited file
pub fn load_urls_from_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read hosts file {}", path.display()))?;

    let urls: Vec<String> = content.lines().filter_map(parse_url_line).collect();

    if urls.is_empty() {
        bail!("No valid URLs found in {}", path.display());
    }

    Ok(urls)
}

/// Parse a single line as a seed URL, adding https:// if needed.
///
/// Blank lines and `#` comments yield `None` quietly; anything that still
/// isn't an http(s) URL with a host is skipped with a warning.
pub fn parse_url_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let seed = normalize_seed(line);
    match Url::parse(&seed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => Some(seed),
        _ => {
            eprintln!("⚠️  Skipping invalid URL '{}'", line);
            None
        }
    }
}

pub fn parse_report_format(value: Option<&String>) -> Result<ReportFormat> {
    let value = value.map(String::as_str).unwrap_or("text");
    ReportFormat::from_str(value).ok_or_else(|| anyhow!("Unknown report format '{}'", value))
}

pub fn parse_dedup_policy(value: Option<&String>) -> Result<DedupPolicy> {
    match value {
        None => Ok(DedupPolicy::default()),
        Some(v) => DedupPolicy::from_str(v).ok_or_else(|| anyhow!("Unknown dedup policy '{}'", v)),
    }
}

/// Expand `~` in a user-supplied output path
pub fn resolve_output_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

// Status output goes to stderr; stdout carries only the report.
fn print_scan_summary(urls: &[String], budget: usize, dedup: DedupPolicy) {
    eprintln!(
        "\n🔑 Looking up CAPTCHA keys on {} host(s)",
        urls.len().to_string().bright_white()
    );
    eprintln!("Page budget: {}", budget);
    let dedup_str = match dedup {
        DedupPolicy::Identifier => "by identifier",
        DedupPolicy::Composite => "by identifier, vendor and location",
    };
    eprintln!("Dedup: {}\n", dedup_str);
}

/// Save the report to `output`, or write it to `out` when no path is given.
///
/// Saved reports are rendered without ANSI colours.
pub fn write_report<W: Write>(
    sites: &[SiteReport],
    format: ReportFormat,
    output: Option<&str>,
    out: &mut W,
) -> Result<()> {
    match output {
        Some(path) => {
            colored::control::set_override(false);
            let report = generate_report(sites, format);
            colored::control::unset_override();
            let report = report.context("Failed to render report")?;

            let path = resolve_output_path(path);
            save_report(&report, &path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            eprintln!("{} Report saved to {}", "✓".green().bold(), path.display());
        }
        None => {
            let report = generate_report(sites, format).context("Failed to render report")?;
            out.write_all(report.as_bytes())
                .and_then(|_| out.flush())
                .context("Failed to write report")?;
        }
    }

    Ok(())
}

async fn run_scan(sub_matches: &ArgMatches, quiet: bool) -> Result<()> {
    let urls = load_urls_from_source(
        sub_matches.get_one::<String>("url"),
        sub_matches.get_one::<PathBuf>("hosts-file"),
    )?;
    let budget = *sub_matches.get_one::<usize>("budget").unwrap_or(&10);
    let timeout_secs = *sub_matches.get_one::<u64>("timeout").unwrap_or(&10);
    let script_timeout_secs = *sub_matches.get_one::<u64>("script-timeout").unwrap_or(&5);
    let dedup_policy = parse_dedup_policy(sub_matches.get_one::<String>("dedup"))?;
    let format = parse_report_format(sub_matches.get_one::<String>("format"))?;
    let output = sub_matches.get_one::<String>("output").map(String::as_str);

    if !quiet {
        print_scan_summary(&urls, budget, dedup_policy);
    }

    let options = LookupOptions {
        urls,
        budget,
        timeout_secs,
        script_timeout_secs,
        dedup_policy,
        show_progress: !quiet,
    };

    let progress_callback: LookupProgressCallback = Arc::new(|msg: String| {
        eprintln!("{}", msg);
    });

    let sites = execute_lookup(options, (!quiet).then_some(progress_callback))
        .await
        .map_err(|e| anyhow!("Lookup failed: {}", e))?;

    for site in sites.iter().filter(|s| s.result.error.is_some()) {
        warn!("No result for {}", site.seed);
    }

    if !quiet {
        eprintln!("\n{} Lookup complete!\n", "✓".green().bold());
    }

    write_report(&sites, format, output, &mut std::io::stdout().lock())
}

pub async fn handle_scan(sub_matches: &ArgMatches, quiet: bool) {
    // Logs go to stderr so reports on stdout stay machine-readable
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    if let Err(e) = run_scan(sub_matches, quiet).await {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}
