//! Booking identifier resolution.
//!
//! Businesses that accept reservations carry a `bookingBusinessId` unrelated
//! to their business id, and the booking review API only accepts the former.
//! No endpoint exposes it, so it is scraped out of the state blob embedded in
//! the business detail page.

use crate::config::Settings;
use crate::error::{ReviewError, Result};
use crate::http::Fetch;
use crate::models::{EntityId, SecondaryId};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, instrument, warn};
use url::Url;

static BOOKING_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""bookingBusinessId":"(?P<booking_id>\d+)""#).expect("valid bookingBusinessId pattern")
});

/// Find the first `"bookingBusinessId":"<digits>"` in raw markup.
pub fn find_booking_business_id(markup: &str) -> Option<SecondaryId> {
    BOOKING_ID_PATTERN
        .captures(markup)
        .and_then(|caps| caps.name("booking_id"))
        .and_then(|m| SecondaryId::from_digits(m.as_str()))
}

pub fn detail_url(settings: &Settings, entity_id: &EntityId) -> Result<String> {
    let url = Url::parse_with_params(&settings.detail_base_url, &[("id", entity_id.0.as_str())])?;
    Ok(url.into())
}

/// Fetch the detail page of `entity_id` and pull out its booking id.
///
/// # Arguments
///
/// * `fetcher` - Transport for the detail page request
/// * `settings` - Supplies `detail_base_url`
/// * `entity_id` - Business whose booking id is wanted
///
/// # Returns
///
/// The first `bookingBusinessId` digit run found in the page source.
///
/// # Errors
///
/// [`ReviewError::IdentifierNotFound`] when the page has no booking id, plus
/// whatever the fetch itself fails with.
#[instrument(level = "info", skip(fetcher, settings), fields(entity_id = %entity_id))]
pub async fn resolve<F: Fetch>(
    fetcher: &F,
    settings: &Settings,
    entity_id: &EntityId,
) -> Result<SecondaryId> {
    let url = detail_url(settings, entity_id)?;
    let markup = fetcher.get_text(&url).await?;

    match find_booking_business_id(&markup) {
        Some(booking_id) => {
            info!(%booking_id, "Resolved bookingBusinessId");
            Ok(booking_id)
        }
        None => {
            warn!(bytes = markup.len(), "Detail page has no bookingBusinessId");
            Err(ReviewError::IdentifierNotFound {
                entity_id: entity_id.to_string(),
            })
        }
    }
}
