//! Collect all three review sources for one business.
//!
//! ```text
//! collect(entity)
//!   ├─ resolve bookingBusinessId ─▶ fetch_all(BOOKING)
//!   ├─ fetch_all(BLOG) ─▶ extract body text per non-cafe post
//!   └─ fetch_all(RECEIPT)
//! ```
//!
//! The three branches run concurrently inside one future and fail
//! independently. Dropping the future returned by [`ReviewAggregator::collect`]
//! cancels every request still in flight.

use crate::config::Settings;
use crate::error::Result;
use crate::extractor;
use crate::http::Fetch;
use crate::models::{EntityId, Harvest, ReviewItem, Source};
use crate::pagination::{self, BLOG, BOOKING, RECEIPT};
use crate::resolver;
use futures::stream::{self, StreamExt};
use tracing::{info, instrument, warn};

/// Blog feed category for cafe (forum) posts, whose markup varies too much to extract.
pub const EXCLUDED_CATEGORY: &str = "카페";

/// Per-source outcome of one aggregation run.
#[derive(Debug)]
pub struct EntityReviews {
    pub entity_id: EntityId,
    pub booking: Result<Harvest>,
    pub blog: Result<Harvest>,
    pub receipt: Result<Harvest>,
}

impl EntityReviews {
    pub fn by_source(&self) -> [(Source, &Result<Harvest>); 3] {
        [
            (Source::Booking, &self.booking),
            (Source::Blog, &self.blog),
            (Source::Receipt, &self.receipt),
        ]
    }
}

#[derive(Debug)]
pub struct ReviewAggregator<F> {
    fetcher: F,
    settings: Settings,
    korean_only: bool,
}

impl<F: Fetch> ReviewAggregator<F> {
    pub fn new(fetcher: F, settings: Settings) -> Self {
        Self {
            fetcher,
            settings,
            korean_only: false,
        }
    }

    /// Keep only Hangul in extracted post bodies.
    pub fn korean_only(mut self, enabled: bool) -> Self {
        self.korean_only = enabled;
        self
    }

    /// Collect booking, blog and receipt reviews for one business.
    ///
    /// # Arguments
    ///
    /// * `entity_id` - Business to collect for
    ///
    /// # Returns
    ///
    /// One outcome per source. A source fails only on its own page fetches
    /// (or, for booking, on resolution); the other two are unaffected.
    #[instrument(level = "info", skip(self), fields(entity_id = %entity_id))]
    pub async fn collect(&self, entity_id: &EntityId) -> EntityReviews {
        let (booking, blog, receipt) = tokio::join!(
            self.collect_booking(entity_id),
            self.collect_blog(entity_id),
            pagination::fetch_all(&self.fetcher, &self.settings, &RECEIPT, &entity_id.0),
        );

        for (source, outcome) in [
            (Source::Booking, &booking),
            (Source::Blog, &blog),
            (Source::Receipt, &receipt),
        ] {
            match outcome {
                Ok(harvest) => info!(%source, items = harvest.items().len(), "Source collected"),
                Err(e) => warn!(%source, error = %e, "Source failed"),
            }
        }

        EntityReviews {
            entity_id: entity_id.clone(),
            booking,
            blog,
            receipt,
        }
    }

    async fn collect_booking(&self, entity_id: &EntityId) -> Result<Harvest> {
        let booking_id = resolver::resolve(&self.fetcher, &self.settings, entity_id).await?;
        pagination::fetch_all(&self.fetcher, &self.settings, &BOOKING, booking_id.as_str()).await
    }

    async fn collect_blog(&self, entity_id: &EntityId) -> Result<Harvest> {
        let mut harvest = pagination::fetch_all(&self.fetcher, &self.settings, &BLOG, &entity_id.0).await?;
        if let Harvest::Complete {
            page,
            extraction_failures,
            ..
        } = &mut harvest
        {
            *extraction_failures = self.attach_sub_texts(&mut page.items).await;
        }
        Ok(harvest)
    }

    /// Fill `sub_text` on every extractable blog item.
    ///
    /// Extractions run concurrently; `buffered` returns them in item order so
    /// each text lands on the item it came from.
    ///
    /// # Arguments
    ///
    /// * `items` - Merged blog items; cafe posts and items without a url are left alone
    ///
    /// # Returns
    ///
    /// The number of posts that could not be fetched. Each of those items
    /// keeps no `sub_text` and carries the failure in `extraction_error`, so a
    /// dead link is distinguishable from a post with no recognizable layout.
    async fn attach_sub_texts(&self, items: &mut [ReviewItem]) -> usize {
        let targets: Vec<(usize, String)> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.type_name.as_deref() != Some(EXCLUDED_CATEGORY))
            .filter_map(|(i, item)| item.url.clone().map(|url| (i, url)))
            .collect();

        let korean_only = self.korean_only;
        let outcomes: Vec<(usize, Result<Option<String>>)> = stream::iter(targets)
            .map(|(i, url)| async move {
                let outcome = extractor::extract(&self.fetcher, &url, korean_only).await;
                if let Err(e) = &outcome {
                    warn!(%url, error = %e, "Post fetch failed; recording extraction error");
                }
                (i, outcome)
            })
            .buffered(self.settings.max_concurrent_requests.max(1))
            .collect()
            .await;

        let mut extracted = 0usize;
        let mut failed = 0usize;
        for (i, outcome) in outcomes {
            match outcome {
                Ok(text) => {
                    if text.is_some() {
                        extracted += 1;
                    }
                    items[i].sub_text = text;
                }
                Err(e) => {
                    failed += 1;
                    items[i].sub_text = None;
                    items[i].extraction_error = Some(e.to_string());
                }
            }
        }
        info!(extracted, failed, items = items.len(), "Attached blog body text");
        failed
    }
}
