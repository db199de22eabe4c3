//! Terminal styling utilities for step headers, warnings and summaries

use console::style;
use std::path::Path;

/// Print the application banner
pub fn print_banner(version: &str) {
    println!();
    println!(
        "    {} {}",
        style("pscore").cyan().bold(),
        style("propensity & disease-risk score estimation").dim()
    );
    println!("    {}", style(format!("v{}", version)).dim());
    println!("    {}", style("-".repeat(50)).dim());
    println!();
}

/// Print a configuration card for a run
pub fn print_config(input: &Path, config: &Path, output: &Path) {
    println!("    {}", style("Configuration").cyan().bold());
    println!("      Input:  {}", input.display());
    println!("      Config: {}", config.display());
    println!("      Output: {}", output.display());
    println!();
}

/// Print a step header with styling
pub fn print_step_header(step_num: u8, title: &str) {
    println!();
    println!(
        "    {} {} {}",
        style(format!("STEP {}", step_num)).cyan().bold(),
        style("|").dim(),
        style(title).white().bold()
    );
    println!("    {}", style("-".repeat(50)).dim());
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("    {} {}", style("+").green().bold(), style(message).green());
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("    {} {}", style("*").cyan(), message);
}

/// Print a warning message (non-fatal schema drift etc.)
pub fn print_warning(message: &str) {
    println!(
        "    {} {}",
        style("!").yellow().bold(),
        style(message).yellow()
    );
}

/// Print a styled count message
pub fn print_count(description: &str, count: usize, extra: Option<&str>) {
    if let Some(info) = extra {
        println!(
            "      Found {} {} {}",
            style(count).yellow().bold(),
            description,
            style(info).dim()
        );
    } else {
        println!("      Found {} {}", style(count).yellow().bold(), description);
    }
}

/// Print elapsed time for a step
pub fn print_step_time(elapsed: std::time::Duration) {
    println!(
        "      {}",
        style(format!("({:.2}s)", elapsed.as_secs_f64())).dim()
    );
}

/// Print the final completion message
pub fn print_completion(what: &str) {
    println!();
    println!("    {} {}", style(">>").green(), style(what).green().bold());
    println!();
}
