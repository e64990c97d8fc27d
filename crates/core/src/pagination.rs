//! Keyset cursor pagination for list endpoints
//!
//! A cursor is an opaque base64 encoding of the sort key of the last row on
//! the previous page. The next page resumes strictly after that key, so rows
//! inserted ahead of it never shift later pages. Clients must only echo back
//! the `next_cursor` they received.
//!
//! # Example
//!
//! ```
//! use vidfeed_core::pagination::{decode_cursor, encode_cursor, PageRequest};
//!
//! let cursor = encode_cursor(&(1638360000_i64, 42_i64)).unwrap();
//! let page = PageRequest::new(Some(&cursor), Some(25));
//! assert_eq!(page.limit, 25);
//! assert_eq!(page.position::<(i64, i64)>(), Some((1638360000, 42)));
//! assert_eq!(decode_cursor::<(i64, i64)>(&cursor).unwrap().1, 42);
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Default number of items per page
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Maximum number of items per page
pub const MAX_PAGE_SIZE: i64 = 50;

/// A resolved page window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Cursor of the last row already seen, `None` for the first page
    pub cursor: Option<String>,
    /// Rows to return
    pub limit: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            cursor: None,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Resolve a page from an optional client cursor and page size
    ///
    /// The page size is clamped to `1..=MAX_PAGE_SIZE`.
    pub fn new(cursor: Option<&str>, page_size: Option<i64>) -> Self {
        let limit = page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        Self {
            cursor: cursor.filter(|c| !c.is_empty()).map(str::to_string),
            limit,
        }
    }

    /// Decoded key to resume after
    ///
    /// An undecodable cursor restarts from the first page.
    pub fn position<K: DeserializeOwned>(&self) -> Option<K> {
        self.cursor
            .as_deref()
            .and_then(|cursor| decode_cursor(cursor).ok())
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    /// Items in the current page
    pub items: Vec<T>,

    /// Cursor for the next page, absent on the last page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,

    /// Whether there are more items available
    pub has_more: bool,
}

impl<T> PaginatedResponse<T> {
    /// Build a page from rows fetched with `limit + 1` lookahead
    ///
    /// The extra row, if present, is dropped and signals that another page
    /// exists. `key` yields the sort key encoded into `next_cursor`.
    pub fn from_lookahead<K, F>(mut rows: Vec<T>, limit: i64, key: F) -> Self
    where
        K: Serialize,
        F: Fn(&T) -> K,
    {
        let has_more = rows.len() as i64 > limit;
        if has_more {
            rows.truncate(limit.max(0) as usize);
        }

        let next_cursor = if has_more {
            rows.last().and_then(|row| encode_cursor(&key(row)).ok())
        } else {
            None
        };

        Self {
            items: rows,
            next_cursor,
            has_more,
        }
    }

    /// Convert the items, keeping the page metadata
    pub fn map<U, F>(self, f: F) -> PaginatedResponse<U>
    where
        F: FnMut(T) -> U,
    {
        PaginatedResponse {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
            has_more: self.has_more,
        }
    }
}

impl<T> Default for PaginatedResponse<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            has_more: false,
        }
    }
}

/// Encode a sort key as an opaque cursor
pub fn encode_cursor<K: Serialize>(key: &K) -> Result<String, String> {
    let json = serde_json::to_vec(key).map_err(|e| format!("Invalid cursor key: {}", e))?;
    Ok(BASE64.encode(json))
}

/// Decode a cursor produced by [`encode_cursor`]
pub fn decode_cursor<K: DeserializeOwned>(cursor: &str) -> Result<K, String> {
    let decoded = BASE64
        .decode(cursor.as_bytes())
        .map_err(|e| format!("Invalid cursor encoding: {}", e))?;

    serde_json::from_slice(&decoded).map_err(|e| format!("Invalid cursor format: {}", e))
}
