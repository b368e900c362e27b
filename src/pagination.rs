//! Per-source pagination policies and the generic page walker.
//!
//! The three review APIs page differently and each needs its own correction
//! to the naive `ceil(total / per_page)` page count:
//!
//! | Source | first index | param | per page | total field | paginate when | loop count |
//! |---|---|---|---|---|---|---|
//! | booking | 0 | `page` | 50 | `selectedTotal` | total > 50 | `ceil(total/50)` |
//! | blog | 1 | `start` | 50 | `maxItemCount` | total > 100 | `ceil(total/50) - 1` |
//! | receipt | 1 | `page` | 100 | `total` | total > 100 | `ceil(total/100) + 1` |
//!
//! Follow-up pages are `i = 1 .. loop_count` (exclusive). For `page` params
//! the index is `first + i`; for `start` params it is `first + i * per_page`.
//!
//! The blog threshold is the receipt page size, not the blog one. Totals in
//! `51..=100` therefore stop after the first 50 blog items. The receipt
//! `+ 1` asks for one page past the last full one, which comes back with an
//! empty item list.
//!
//! Totals come from the server, so they are checked against
//! [`MAX_REPORTED_TOTAL`] before any follow-up request is planned.

use crate::config::Settings;
use crate::error::{ReviewError, Result};
use crate::http::Fetch;
use crate::models::{Harvest, ReviewItem, ReviewPage, Source};
use crate::utils::truncate_for_log;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Name of the query parameter carrying the page position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageParam {
    /// Page number; consecutive pages differ by one.
    Page,
    /// Item offset; consecutive pages differ by `per_page`.
    Start,
}

impl PageParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageParam::Page => "page",
            PageParam::Start => "start",
        }
    }
}

/// Largest total a first page may report. Anything above is treated as a
/// malformed response rather than planned into requests.
pub const MAX_REPORTED_TOTAL: u64 = 100_000;

/// How one review source pages through its results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationPolicy {
    pub source: Source,
    /// Path segment under the API base, e.g. `receiptReviews`.
    pub endpoint: &'static str,
    /// Query parameter carrying the source key.
    pub key_param: &'static str,
    pub page_param: PageParam,
    /// Value of the page parameter on the first request (`0` or `1`).
    pub start_index: u64,
    /// Sent as `display`; the API caps what it returns per request.
    pub per_page: u64,
    /// First-page field holding the grand total of reviews.
    pub total_field: &'static str,
    /// Field holding the review list on every page.
    pub items_field: &'static str,
    /// Follow-up pages are fetched only when the total exceeds this.
    pub paginate_above: u64,
    /// Added to `ceil(total / per_page)` to get the loop count. The APIs
    /// disagree on whether the first page counts and on trailing pages.
    pub loop_count_adjustment: i64,
    /// A total of zero ends the walk with [`Harvest::NoReviews`].
    pub zero_means_no_reviews: bool,
}

pub const BOOKING: PaginationPolicy = PaginationPolicy {
    source: Source::Booking,
    endpoint: "bookingReviews",
    key_param: "bookingBusinessId",
    page_param: PageParam::Page,
    start_index: 0,
    per_page: 50,
    total_field: "selectedTotal",
    items_field: "items",
    paginate_above: 50,
    loop_count_adjustment: 0,
    zero_means_no_reviews: false,
};

pub const BLOG: PaginationPolicy = PaginationPolicy {
    source: Source::Blog,
    endpoint: "fsasReviews",
    key_param: "businessId",
    page_param: PageParam::Start,
    start_index: 1,
    per_page: 50,
    total_field: "maxItemCount",
    items_field: "items",
    paginate_above: RECEIPT.per_page,
    loop_count_adjustment: -1,
    zero_means_no_reviews: false,
};

pub const RECEIPT: PaginationPolicy = PaginationPolicy {
    source: Source::Receipt,
    endpoint: "receiptReviews",
    key_param: "businessId",
    page_param: PageParam::Page,
    start_index: 1,
    per_page: 100,
    total_field: "total",
    items_field: "items",
    paginate_above: 100,
    loop_count_adjustment: 1,
    zero_means_no_reviews: true,
};

/// Totals arrive as JSON numbers on some endpoints and numeric strings on others.
#[derive(Deserialize)]
#[serde(untagged)]
enum Count {
    Number(u64),
    Text(String),
}

impl PaginationPolicy {
    /// `ceil(total / per_page)` plus this source's correction, floored at zero.
    pub fn loop_count(&self, total: u64) -> u64 {
        let pages = total.div_ceil(self.per_page) as i64;
        (pages + self.loop_count_adjustment).max(0) as u64
    }

    /// Page index (or item offset) of the `i`-th request, the first being `i = 0`.
    pub fn index_for(&self, i: u64) -> u64 {
        match self.page_param {
            PageParam::Page => self.start_index + i,
            PageParam::Start => self.start_index + i * self.per_page,
        }
    }

    /// Number of requests issued after the first page for a reported `total`.
    pub fn follow_up_count(&self, total: u64) -> u64 {
        if total <= self.paginate_above {
            0
        } else {
            self.loop_count(total).saturating_sub(1)
        }
    }

    /// Indices requested after the first page, produced lazily in request order.
    pub fn follow_up_indices(&self, total: u64) -> impl Iterator<Item = u64> + '_ {
        (1..=self.follow_up_count(total)).map(|i| self.index_for(i))
    }

    pub fn page_url(&self, endpoint: &str, key: &str, index: u64) -> Result<String> {
        let url = Url::parse_with_params(
            endpoint,
            &[
                (self.key_param, key.to_string()),
                (self.page_param.as_str(), index.to_string()),
                ("display", self.per_page.to_string()),
            ],
        )?;
        Ok(url.into())
    }

    fn malformed(&self, field: &'static str, detail: impl Into<String>) -> ReviewError {
        ReviewError::MalformedResponse {
            feed: self.source.as_str(),
            field,
            detail: detail.into(),
        }
    }

    /// Split the first page's body into its item list and remaining metadata.
    ///
    /// The first page must carry an item list; a missing or null one is
    /// [`ReviewError::MalformedResponse`].
    pub fn decode_page(&self, body: &str) -> Result<ReviewPage> {
        self.decode(body, true)
    }

    /// Like [`decode_page`](Self::decode_page), but a missing or null item
    /// list reads as empty: pages past the end come back that way.
    pub fn decode_follow_up(&self, body: &str) -> Result<ReviewPage> {
        self.decode(body, false)
    }

    fn decode(&self, body: &str, require_items: bool) -> Result<ReviewPage> {
        let mut metadata: Map<String, Value> = serde_json::from_str(body).map_err(|e| {
            self.malformed(
                "(body)",
                format!("is not a JSON object ({e}): {}", truncate_for_log(body, 120)),
            )
        })?;

        let items = match metadata.remove(self.items_field) {
            None | Some(Value::Null) if require_items => {
                return Err(self.malformed(self.items_field, "is missing from the first page"));
            }
            None | Some(Value::Null) => Vec::new(),
            Some(raw) => serde_json::from_value::<Vec<ReviewItem>>(raw)
                .map_err(|e| self.malformed(self.items_field, format!("is not an item list: {e}")))?,
        };

        Ok(ReviewPage { items, metadata })
    }

    /// Read the grand total from the first page's metadata.
    ///
    /// Totals above [`MAX_REPORTED_TOTAL`] are rejected as malformed.
    pub fn reported_total(&self, page: &ReviewPage) -> Result<u64> {
        let raw = page
            .metadata
            .get(self.total_field)
            .ok_or_else(|| self.malformed(self.total_field, "is missing"))?;

        let total = match Count::deserialize(raw) {
            Ok(Count::Number(n)) => n,
            Ok(Count::Text(s)) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| self.malformed(self.total_field, format!("is not a count: {s:?}")))?,
            Err(_) => return Err(self.malformed(self.total_field, format!("is not a count: {raw}"))),
        };

        if total > MAX_REPORTED_TOTAL {
            return Err(self.malformed(
                self.total_field,
                format!("{total} exceeds the ceiling of {MAX_REPORTED_TOTAL}"),
            ));
        }
        Ok(total)
    }
}

async fn fetch_page<F: Fetch>(
    fetcher: &F,
    endpoint: &str,
    policy: &PaginationPolicy,
    key: &str,
    index: u64,
) -> Result<ReviewPage> {
    let url = policy.page_url(endpoint, key, index)?;
    let body = fetcher.get_text(&url).await?;
    let page = if index == policy.start_index {
        policy.decode_page(&body)?
    } else {
        policy.decode_follow_up(&body)?
    };
    debug!(source = %policy.source, index, items = page.items.len(), "Fetched review page");
    Ok(page)
}

/// Walk every page of one source and merge them in request order.
///
/// The first page is awaited on its own since it carries the total. The
/// follow-ups then run concurrently, and `buffered` hands them back in
/// the order they were issued. Any failed page fails the whole walk.
///
/// # Arguments
///
/// * `fetcher` - Transport for every page request
/// * `settings` - Supplies the API base URL and the concurrency bound
/// * `policy` - One of [`BOOKING`], [`BLOG`] or [`RECEIPT`]
/// * `key` - Value of the policy's key parameter (business or booking id)
///
/// # Returns
///
/// [`Harvest::NoReviews`] when a receipt total is zero, otherwise
/// [`Harvest::Complete`] holding the first page's metadata and every
/// page's items.
///
/// # Errors
///
/// The first transport or decode error of any page, or a missing,
/// non-numeric or oversized total on the first page.
#[instrument(level = "info", skip(fetcher, settings, policy), fields(source = %policy.source))]
pub async fn fetch_all<F: Fetch>(
    fetcher: &F,
    settings: &Settings,
    policy: &PaginationPolicy,
    key: &str,
) -> Result<Harvest> {
    let endpoint = settings.endpoint(policy.endpoint);

    let mut merged = fetch_page(fetcher, &endpoint, policy, key, policy.start_index).await?;
    let total = policy.reported_total(&merged)?;

    if total == 0 && policy.zero_means_no_reviews {
        info!(key, "Source reports no reviews");
        return Ok(Harvest::NoReviews);
    }

    let follow_ups = policy.follow_up_count(total);
    debug!(key, total, follow_ups, "Planned page requests");
    let pages: Vec<ReviewPage> = stream::iter(policy.follow_up_indices(total))
        .map(|index| fetch_page(fetcher, &endpoint, policy, key, index))
        .buffered(settings.max_concurrent_requests.max(1))
        .try_collect()
        .await?;

    for page in pages {
        merged.absorb(page);
    }

    if (merged.items.len() as u64) < total {
        // The APIs cap how deep they page; a short merge is normal.
        warn!(
            key,
            total,
            collected = merged.items.len(),
            "Collected fewer items than the reported total"
        );
    }
    info!(
        key,
        total,
        pages = follow_ups + 1,
        items = merged.items.len(),
        "Merged review pages"
    );

    Ok(Harvest::Complete {
        reported_total: total,
        page: merged,
        extraction_failures: 0,
    })
}
