//! JSON documents, one per business per source.
//!
//! Only sources that finished write a file. A failed source leaves any
//! previous file in place rather than overwriting it with a partial merge.

use crate::aggregator::EntityReviews;
use crate::error::Result;
use crate::models::{EntityId, Harvest, ReviewPage, Source};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

#[derive(Debug, Serialize)]
pub struct ReviewDocument<'a> {
    pub entity_id: &'a EntityId,
    pub source: Source,
    pub collected_at: DateTime<Utc>,
    /// `complete` or `no_reviews`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_total: Option<u64>,
    pub item_count: usize,
    /// Blog items whose post page failed to fetch; each carries `extractionError`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_failures: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<&'a ReviewPage>,
}

impl<'a> ReviewDocument<'a> {
    pub fn new(entity_id: &'a EntityId, source: Source, harvest: &'a Harvest, collected_at: DateTime<Utc>) -> Self {
        let (status, reported_total, extraction_failures, page) = match harvest {
            Harvest::Complete {
                reported_total,
                page,
                extraction_failures,
            } => (
                "complete",
                Some(*reported_total),
                (source == Source::Blog).then_some(*extraction_failures),
                Some(page),
            ),
            Harvest::NoReviews => ("no_reviews", None, None, None),
        };
        Self {
            entity_id,
            source,
            collected_at,
            status,
            reported_total,
            item_count: harvest.items().len(),
            extraction_failures,
            page,
        }
    }
}

/// Directory name for a business; anything outside `[A-Za-z0-9_-]` becomes `_`.
fn entity_dir_name(entity_id: &EntityId) -> String {
    entity_id
        .0
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Write `{json_output_dir}/{entity_id}/{source}.json` for every source that succeeded.
///
/// # Arguments
///
/// * `reviews` - Outcome of one aggregation run
/// * `json_output_dir` - Root output directory; a sub-directory per business is created
///
/// # Returns
///
/// The paths written, in source order. Failed sources write nothing.
///
/// # Errors
///
/// Fails on the first directory creation, serialization or write error.
#[instrument(level = "info", skip_all, fields(entity_id = %reviews.entity_id, json_output_dir = %json_output_dir.display()))]
pub async fn write_reviews(reviews: &EntityReviews, json_output_dir: &Path) -> Result<Vec<PathBuf>> {
    let entity_dir = json_output_dir.join(entity_dir_name(&reviews.entity_id));
    if let Err(e) = fs::create_dir_all(&entity_dir).await {
        error!(path = %entity_dir.display(), error = %e, "Failed to create entity dir");
        return Err(e.into());
    }

    let collected_at = Utc::now();
    let mut written = Vec::new();
    for (source, outcome) in reviews.by_source() {
        let Ok(harvest) = outcome else {
            info!(%source, "Skipping output for failed source");
            continue;
        };

        let document = ReviewDocument::new(&reviews.entity_id, source, harvest, collected_at);
        let json = serde_json::to_string(&document)?;
        let path = entity_dir.join(format!("{source}.json"));
        fs::write(&path, json).await?;
        info!(path = %path.display(), items = document.item_count, "Wrote review JSON");
        written.push(path);
    }

    Ok(written)
}
