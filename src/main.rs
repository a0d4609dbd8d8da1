//! Proxy Invalidate command-line tool
//!
//! Queues invalidations from the command line and flushes them to the caching
//! proxies named in the configuration file.

use anyhow::{bail, Context};
use http::HeaderMap;
use proxy_invalidate::{CacheInvalidator, InvalidatorConfig};
use std::env;
use std::process::ExitCode;
use tracing::{error, info};

const USAGE: &str = "usage: proxy-invalidate <config.yaml> <command> [args]

commands:
  purge <url>...                     remove URLs or paths from the cache
  refresh <url>...                   fetch fresh copies of URLs or paths
  ban-path <pattern> [content-type]  ban every URL matching a regex
  tags <tag>...                      ban every object carrying a tag";

/// Main entry point
///
/// # Usage
/// ```bash
/// proxy-invalidate invalidator.yaml purge /news/42 http://www.example.com/
/// proxy-invalidate invalidator.yaml ban-path '^/static/' 'text/css'
/// proxy-invalidate invalidator.yaml tags news-42 front-page
/// ```
#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    match run(env::args().skip(1).collect()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let (config_path, command, rest) = match args.as_slice() {
        [config_path, command, rest @ ..] => (config_path, command.as_str(), rest),
        _ => bail!("{}", USAGE),
    };

    info!("Loading configuration from: {}", config_path);
    let config = InvalidatorConfig::from_file(config_path)
        .with_context(|| format!("failed to load {}", config_path))?;
    info!("  - Servers: {:?}", config.servers);
    info!("  - Base URL: {:?}", config.base_url);

    let invalidator = CacheInvalidator::from_config(&config)?;

    match command {
        "purge" | "refresh" => {
            if rest.is_empty() {
                bail!("{} needs at least one URL\n\n{}", command, USAGE);
            }
            for url in rest {
                if command == "purge" {
                    invalidator.invalidate_path(url, HeaderMap::new())?;
                } else {
                    invalidator.refresh_path(url, HeaderMap::new())?;
                }
            }
        }
        "ban-path" => match rest {
            [pattern] => {
                invalidator.invalidate_regex(pattern, None, None)?;
            }
            [pattern, content_type] => {
                invalidator.invalidate_regex(pattern, Some(content_type.as_str()), None)?;
            }
            _ => bail!("ban-path needs a pattern and an optional content type\n\n{}", USAGE),
        },
        "tags" => {
            if rest.is_empty() {
                bail!("tags needs at least one tag\n\n{}", USAGE);
            }
            let tags: Vec<&str> = rest.iter().map(String::as_str).collect();
            invalidator.invalidate_tags(&tags)?;
        }
        other => bail!("unknown command {:?}\n\n{}", other, USAGE),
    }

    let count = invalidator.flush().await?;
    info!(
        "Sent {} invalidation(s) to {} server(s)",
        count,
        invalidator.client().queue().servers().len()
    );
    Ok(())
}
