//! Data models for review pages and the values that key them.
//!
//! - [`EntityId`] / [`SecondaryId`]: the business id supplied by the caller and
//!   the booking id resolved from its detail page
//! - [`ReviewItem`]: one review as returned by an API, kept as an open field map
//! - [`ReviewPage`]: an item list plus the first page's metadata
//! - [`Harvest`]: what a source yields once every page has been merged
//!
//! Field names on the wire are camelCase; the serde renames keep them intact
//! when a merged page is written back out.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Primary identifier of the business, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

/// `bookingBusinessId`: an unrelated id namespace, only ever obtained by resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SecondaryId(String);

impl SecondaryId {
    /// Only digit runs are valid booking ids.
    pub(crate) fn from_digits(digits: &str) -> Option<Self> {
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            Some(SecondaryId(digits.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecondaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three independent review feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Booking,
    Blog,
    Receipt,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Booking => "booking",
            Source::Blog => "blog",
            Source::Receipt => "receipt",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One review as returned by an API.
///
/// Blog items carry `typeName` and `url`; after extraction they also carry
/// `subText`. Every other field passes through untouched.
///
/// After extraction a blog item is in one of three states:
///
/// | `subText` | `extractionError` | Meaning |
/// |---|---|---|
/// | set | absent | body text extracted |
/// | absent | absent | skipped: cafe post, no url, or no markup tier matched |
/// | absent | set | the post page could not be fetched |
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReviewItem {
    /// Feed category, e.g. `블로그` or `카페`.
    #[serde(rename = "typeName", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Link to the post the review was written in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Extracted post body text.
    #[serde(rename = "subText", default, skip_serializing_if = "Option::is_none")]
    pub sub_text: Option<String>,
    /// Why the post page could not be fetched.
    #[serde(rename = "extractionError", default, skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<String>,
    /// Every other field the API returned.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A fetched page, or the merge of several.
///
/// `metadata` holds every top-level field other than the item list and is
/// taken from the first page only.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ReviewPage {
    /// Items of every page, in the order the pages were requested.
    pub items: Vec<ReviewItem>,
    /// Top-level fields of the first page, totals included.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl ReviewPage {
    /// Append a later page's items, keeping fetch order.
    pub fn absorb(&mut self, next: ReviewPage) {
        self.items.extend(next.items);
    }
}

/// Merged result of one source.
#[derive(Debug, Clone, PartialEq)]
pub enum Harvest {
    /// Every page was fetched.
    Complete {
        /// The API's own count; the merged item list may fall short of it.
        reported_total: u64,
        page: ReviewPage,
        /// Items whose post page failed to fetch (see [`ReviewItem::extraction_error`]).
        extraction_failures: usize,
    },
    /// The receipt source reported a total of zero.
    NoReviews,
}

impl Harvest {
    pub fn items(&self) -> &[ReviewItem] {
        match self {
            Harvest::Complete { page, .. } => &page.items,
            Harvest::NoReviews => &[],
        }
    }
}
