//! Paginated listing results.

use serde::{Deserialize, Serialize};

use crate::object::KeySummary;

/// Opaque position in a paginated listing.
///
/// Backends that list object versions need both markers; plain key listings
/// only use `key_marker`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCursor {
    /// Key to resume after.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_marker: Option<String>,
    /// Version ID to resume after, within `key_marker`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id_marker: Option<String>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Key summaries in listing order.
    pub entries: Vec<KeySummary>,
    /// Whether more pages remain.
    pub truncated: bool,
    /// Where the next page starts. Only meaningful when `truncated` is set.
    pub next: Option<ListCursor>,
}

impl ListPage {
    /// Number of entries on the page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the page carries no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cursor for the next page, or `None` once the listing is exhausted.
    #[must_use]
    pub fn next_cursor(&self) -> Option<&ListCursor> {
        if self.truncated {
            self.next.as_ref()
        } else {
            None
        }
    }
}
