pub mod lookup;
pub mod report;

use colored::Colorize;

const BANNER: &str = r#"
  _              _____                 _
 | | _____ _   _/ ___/ ___ ___  _   _| |_
 | |/ / _ \ | | \___ \/ __/ _ \| | | | __|
 |   <  __/ |_| |___) | (_| (_) | |_| | |_
 |_|\_\___|\__, |____/ \___\___/ \__,_|\__|
           |___/
"#;

/// Written to stderr.
pub fn print_banner() {
    eprintln!("{}", BANNER.bright_cyan().bold());
    eprintln!(
        "  {} {}\n",
        "CAPTCHA site key reconnaissance".bright_white(),
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black()
    );
}
