//! # Review Harvest
//!
//! Collects user reviews for a business from three independently paginated
//! review APIs and writes one JSON document per source.
//!
//! ## Sources
//!
//! - **Booking** reviews, keyed by a `bookingBusinessId` scraped from the
//!   business detail page
//! - **Blog** reviews, whose linked posts are fetched for their body text
//! - **Receipt** reviews
//!
//! ## Usage
//!
//! ```sh
//! review_harvest -j ./json 1234567
//! ```
//!
//! ## Architecture
//!
//! 1. **Resolution**: scrape the booking id from the detail page
//! 2. **Pagination**: walk each source's pages and merge them in order
//! 3. **Extraction**: pull body text out of each linked blog post
//! 4. **Output**: write `<dir>/<business>/<source>.json`
//!
//! Businesses are processed one at a time; within a business all three
//! sources run concurrently under a shared request cap.

use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod aggregator;
mod cli;
mod config;
mod error;
mod extractor;
mod http;
mod models;
mod outputs;
mod pagination;
mod resolver;
mod utils;

use aggregator::ReviewAggregator;
use cli::Cli;
use config::Settings;
use http::{HttpFetcher, RetryFetch};
use models::EntityId;
use outputs::json;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("review_harvest starting up");

    let args = Cli::parse();
    debug!(?args.entity_ids, ?args.json_output_dir, ?args.config, "Parsed CLI arguments");

    if let Err(e) = ensure_writable_dir(&args.json_output_dir).await {
        error!(
            path = %args.json_output_dir,
            error = %e,
            "JSON output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let settings = Settings::load(args.config.as_deref()).await?;
    let fetcher = RetryFetch::from_settings(HttpFetcher::new(&settings)?, &settings);
    let aggregator = ReviewAggregator::new(fetcher, settings).korean_only(args.korean_only);

    let mut failed_sources = 0usize;
    for raw_id in &args.entity_ids {
        let entity_t0 = std::time::Instant::now();
        let entity_id = EntityId(raw_id.clone());

        let reviews = aggregator.collect(&entity_id).await;
        let failures = reviews
            .by_source()
            .into_iter()
            .filter(|(_, outcome)| outcome.is_err())
            .count();
        failed_sources += failures;

        match json::write_reviews(&reviews, Path::new(&args.json_output_dir)).await {
            Ok(paths) => info!(
                %entity_id,
                files = paths.len(),
                failed_sources = failures,
                elapsed_ms = entity_t0.elapsed().as_millis() as u64,
                "Business complete"
            ),
            Err(e) => error!(%entity_id, error = %e, "Failed to write review JSON"),
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        businesses = args.entity_ids.len(),
        failed_sources,
        "Execution complete"
    );

    Ok(())
}
