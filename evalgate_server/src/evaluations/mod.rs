//! Evaluations and their storage

use aliri_base64::Base64Url;
use serde::Serialize;
use thiserror::Error;

mod model;
mod store;

pub use model::{
    Evaluation, EvaluationFields, EvaluationUpdate, NewEvaluation, ValidationError, DEFAULT_MOOD,
    DEFAULT_STATUS, MAX_MOOD, MIN_MOOD,
};
pub use store::{EvaluationRepository, InMemoryEvaluationRepository, StoreError};

/// The page size used when none is requested
pub const DEFAULT_PAGE_SIZE: usize = 20;
/// The largest page size a caller may request
pub const MAX_PAGE_SIZE: usize = 100;

/// The cursor could not be decoded
#[derive(Debug, Error)]
#[error("invalid cursor")]
pub struct InvalidCursor;

/// An opaque position in the ID-ordered list of evaluations
///
/// Encoded as the unpadded URL-safe base64 of the decimal ID of the last
/// evaluation returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor(pub u64);

impl Cursor {
    /// Encodes the cursor for a client
    pub fn encode(self) -> String {
        Base64Url::from_raw(self.0.to_string()).to_string()
    }

    /// Decodes a cursor previously handed to a client
    ///
    /// # Errors
    ///
    /// Returns an error if `encoded` is not a cursor.
    pub fn decode(encoded: &str) -> Result<Self, InvalidCursor> {
        let raw = Base64Url::from_encoded(encoded.trim_end_matches('='))
            .map_err(|_| InvalidCursor)?;
        let decimal = std::str::from_utf8(raw.as_slice()).map_err(|_| InvalidCursor)?;
        decimal.parse().map(Self).map_err(|_| InvalidCursor)
    }
}

/// One page of evaluations
#[derive(Debug, Serialize)]
pub struct Page {
    /// The evaluations on this page
    pub items: Vec<Evaluation>,
    /// The cursor for the next page, present only if there is one
    pub next_cursor: Option<String>,
    /// Whether more evaluations follow this page
    pub has_more: bool,
}

impl Page {
    /// Builds a page from up to `limit + 1` evaluations
    ///
    /// The extra evaluation, if present, signals that another page follows
    /// and is dropped.
    pub fn from_lookahead(mut items: Vec<Evaluation>, limit: usize) -> Self {
        let has_more = items.len() > limit;
        items.truncate(limit);

        let next_cursor = has_more
            .then(|| items.last().map(|e| Cursor(e.id).encode()))
            .flatten();

        Self {
            items,
            next_cursor,
            has_more,
        }
    }
}
