pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    load_urls_from_file, load_urls_from_source, parse_dedup_policy, parse_report_format,
    parse_url_line, resolve_output_path, write_report,
};

// Re-export lookup functionality from keyscout-core
pub use keyscout_core::lookup::{
    LookupOptions, LookupProgressCallback, SiteReport, execute_lookup, extract_url_path,
    normalize_seed,
};
