use colored::*;
use kamyroll::downloader::QueueSummary;
use kamyroll_api::{Channel, ServiceConfig};

pub fn print_services(config: &ServiceConfig) {
    println!("\n{}", "Supported services:".green().bold());
    for service in &config.services {
        let name = Channel::from_id(&service.id)
            .map(|channel| channel.to_string())
            .unwrap_or_else(|| service.name.clone());
        let state = if service.active {
            "active".green()
        } else {
            "inactive".red()
        };
        let bypass = if service.bypass { " (bypass)" } else { "" };
        println!("  {} [{}]{}", name.cyan(), state, bypass.yellow());
    }
    if let Some(updated) = config.updated {
        println!("{} {}", "Updated:".green(), updated.to_string().cyan());
    }
}

pub fn print_summary(summary: &QueueSummary, urls: &[String]) {
    println!();
    if summary.succeeded.is_empty() {
        println!("{}", summary.message().yellow().bold());
    } else {
        println!("{}", summary.message().green().bold());
    }
    println!(
        "  {}: {} of {}",
        "Downloaded".green(),
        summary.succeeded.len().to_string().cyan(),
        summary.total.to_string().cyan()
    );

    if !summary.failed.is_empty() {
        println!("  {}:", "Failed".red());
        for (index, message) in &summary.failed {
            let url = urls.get(*index).map(String::as_str).unwrap_or_default();
            println!("    {} {}", url.blue(), message.lines().next().unwrap_or_default());
        }
    }
    if summary.halted {
        println!("  {}", "Stopped before the end of the list.".yellow());
    }
}
