//! Content filter pipeline
//!
//! Filters adapt content for human editing: a filter's match predicate
//! inspects the request headers and body and, when it applies, yields a
//! codec whose `decode` produces the text shown in the editor and whose
//! `encode` restores the original representation on read-back.
//!
//! Filters are resolved by name from configuration into a fixed ordered
//! table; selection is first-match-wins, so order is significant.

pub mod gmail;

use axum::http::HeaderMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::filters::gmail::GmailFilter;

// ============================================================================
// Codec and Filter Traits
// ============================================================================

/// Error types for codec transforms and match predicates
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Codec failure: {reason}")]
    Transform { reason: String },
}

impl CodecError {
    /// Create a transform failure with context
    pub fn transform(reason: impl Into<String>) -> Self {
        Self::Transform {
            reason: reason.into(),
        }
    }
}

/// A matched pair of content transforms
///
/// `decode` turns inbound content into the form shown to the human;
/// `encode` is its inverse, applied to the edited result. For content
/// a filter accepted, `decode(encode(decoded))` must reproduce
/// `decoded` byte for byte (verified at spawn time when careful
/// filtering is enabled).
pub trait ContentCodec: Send + Sync {
    fn decode(&self, contents: &str) -> Result<String, CodecError>;
    fn encode(&self, contents: &str) -> Result<String, CodecError>;
}

/// Selection predicate for a codec
pub trait ContentFilter: Send + Sync {
    /// Filter name as used in configuration specs
    fn name(&self) -> &'static str;

    /// Decide whether this filter applies to a request
    ///
    /// Returns the codec to use when it does; the codec need not be
    /// tied to this filter instance. Errors are treated as a non-match
    /// by the caller.
    fn matches(
        &self,
        headers: &HeaderMap,
        contents: &str,
    ) -> Result<Option<Arc<dyn ContentCodec>>, CodecError>;
}

// ============================================================================
// Filter Set
// ============================================================================

/// Ordered set of content filters, immutable after load
pub struct FilterSet {
    filters: Vec<Box<dyn ContentFilter>>,
}

impl FilterSet {
    /// Create an empty filter set (filters become a no-op feature)
    pub fn empty() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Create a filter set from an explicit filter list
    pub fn new(filters: Vec<Box<dyn ContentFilter>>) -> Self {
        Self { filters }
    }

    /// Resolve a comma-separated list of filter names
    ///
    /// Unknown names are logged and skipped rather than failing
    /// startup; a completely unresolvable spec degrades to an empty
    /// set.
    pub fn from_spec(spec: &str) -> Self {
        let mut filters: Vec<Box<dyn ContentFilter>> = Vec::new();
        for name in spec.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match name {
                "gmail" => filters.push(Box::new(GmailFilter)),
                other => warn!("Unknown filter name in spec, skipping: {}", other),
            }
        }
        debug!("Loaded {} filters from spec: {:?}", filters.len(), spec);
        Self::new(filters)
    }

    /// Select the codec for a request, first match wins
    ///
    /// A filter whose predicate errors is logged and treated as a
    /// non-match; later filters are still consulted.
    pub fn select_codec(
        &self,
        headers: &HeaderMap,
        contents: &str,
    ) -> Option<Arc<dyn ContentCodec>> {
        for filter in &self.filters {
            match filter.matches(headers, contents) {
                Ok(Some(codec)) => {
                    debug!("Filter matched: {}", filter.name());
                    return Some(codec);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to check filter match for {}: {}", filter.name(), e);
                }
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
