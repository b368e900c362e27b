//! Error taxonomy shared by every stage of a review harvest.
//!
//! Two outcomes that look like failures are deliberately *not* represented
//! here: a receipt source reporting zero reviews is
//! [`Harvest::NoReviews`](crate::models::Harvest::NoReviews), and a post page
//! whose markup matches no extraction tier simply yields no body text.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReviewError>;

#[derive(Debug, Error)]
pub enum ReviewError {
    /// Connection failure, body read failure, or request timeout.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected status {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// A required field was missing from (or undecodable in) a response body.
    #[error("Malformed {feed} response: field `{field}` {detail}")]
    MalformedResponse {
        feed: &'static str,
        field: &'static str,
        detail: String,
    },

    #[error("bookingBusinessId not found in detail page of business {entity_id}")]
    IdentifierNotFound { entity_id: String },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: usize,
        last: Box<ReviewError>,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReviewError {
    /// Whether a failed request is worth sending again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ReviewError::Network(_) | ReviewError::UnexpectedStatus { .. }
        )
    }
}

impl From<reqwest::Error> for ReviewError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ReviewError::Network(format!("request timed out: {err}"))
        } else {
            ReviewError::Network(err.to_string())
        }
    }
}

impl From<serde_yaml::Error> for ReviewError {
    fn from(err: serde_yaml::Error) -> Self {
        ReviewError::Config(err.to_string())
    }
}

impl From<url::ParseError> for ReviewError {
    fn from(err: url::ParseError) -> Self {
        ReviewError::Config(format!("bad endpoint url: {err}"))
    }
}
