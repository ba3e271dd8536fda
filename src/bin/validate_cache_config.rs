//! Standalone binary to validate a command cache config file.
//! Used by CI to catch broken TTL or invalidation tables before release.
//!
//! Usage: `validate-cache-config [PATH]`. Without a path the file named by
//! `COMMAND_CACHE_CONFIG` is checked, or the built-in defaults if it is unset.

use command_cache::config::CONFIG_ENV_VAR;
use command_cache::{classify, CommandCacheConfig};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args().nth(1);
    let loaded = match path.as_deref() {
        Some(path) => {
            info!(path, "validating config file");
            CommandCacheConfig::from_path(path)
        }
        None => {
            info!(var = CONFIG_ENV_VAR, "no path given, reading from environment");
            CommandCacheConfig::from_env()
        }
    };

    let config = match loaded {
        Ok(config) => config,
        Err(err) => {
            error!(kind = %classify(&err), "{}", err);
            return ExitCode::FAILURE;
        }
    };

    println!("default ttl: {} ms", config.default_ttl_ms);

    println!("\n=== TTL table ===");
    for (command, ttl_ms) in config.ttl.iter() {
        println!("  {:<20} {} ms", command, ttl_ms);
    }

    println!("\n=== Invalidation rules ===");
    for (mutation, reads) in config.invalidation.iter() {
        let uncached: Vec<&str> = reads
            .iter()
            .map(String::as_str)
            .filter(|r| config.ttl.get(r).is_none())
            .collect();
        println!("  {:<20} -> {}", mutation, reads.join(", "));
        if !uncached.is_empty() {
            // Falls back to the default TTL; usually a typo in the read name.
            println!("  {:<20}    no TTL entry: {}", "", uncached.join(", "));
        }
    }

    match config.retry {
        Some(ref retry) => {
            let schedule: Vec<String> = retry
                .schedule()
                .iter()
                .map(|d| format!("{}ms", d.as_millis()))
                .collect();
            println!(
                "\n=== Retry ===\n  max_retries: {}\n  delays: [{}]",
                retry.max_retries,
                schedule.join(", ")
            );
        }
        None => println!("\n=== Retry ===\n  disabled"),
    }

    println!("\n✅ config is valid");
    ExitCode::SUCCESS
}
