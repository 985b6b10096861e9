//! Page cursors.
//!
//! On the wire, a page is selected by two overloaded integers: a negative
//! `change_id` means "start from the most recent record" and a negative
//! `records` means "scan backwards". Here both are explicit variants, and
//! the sign convention only exists in [`PageCursor::query_pairs`].

use std::fmt;
use std::num::NonZeroU32;

use super::record::ChangeId;

/// Wire value of [`FeedStart::MostRecent`].
pub const MOST_RECENT_SENTINEL: &str = "-1";

/// Page size used when the caller does not choose one.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Where a page starts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeedStart {
    /// Let the server choose (the beginning of history).
    #[default]
    ServerDefault,
    /// Start after the record with this identifier.
    Absolute(ChangeId),
    /// Start from the newest record.
    MostRecent,
}

/// Scan direction and bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLimit {
    /// Ascending from the start, at most `n` records.
    Forward(NonZeroU32),
    /// Descending from the start, at most `n` records.
    Backward(NonZeroU32),
}

impl PageLimit {
    /// Forward page of `n` records; `n` is clamped to at least 1.
    #[must_use]
    pub fn forward(n: u32) -> Self {
        Self::Forward(NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN))
    }

    /// Backward page of `n` records; `n` is clamped to at least 1.
    #[must_use]
    pub fn backward(n: u32) -> Self {
        Self::Backward(NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN))
    }

    /// Maximum number of records returned.
    #[must_use]
    pub const fn magnitude(self) -> u32 {
        match self {
            Self::Forward(n) | Self::Backward(n) => n.get(),
        }
    }

    /// Signed wire value of the `records` term.
    #[must_use]
    pub fn wire_value(self) -> i64 {
        match self {
            Self::Forward(n) => i64::from(n.get()),
            Self::Backward(n) => -i64::from(n.get()),
        }
    }
}

impl Default for PageLimit {
    fn default() -> Self {
        Self::forward(DEFAULT_PAGE_SIZE)
    }
}

/// A bounded, directional window over the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageCursor {
    /// Start position.
    pub start: FeedStart,
    /// Direction and size.
    pub limit: PageLimit,
}

impl PageCursor {
    /// Creates a cursor.
    #[must_use]
    pub const fn new(start: FeedStart, limit: PageLimit) -> Self {
        Self { start, limit }
    }

    /// The first `n` records of history.
    #[must_use]
    pub fn head(n: u32) -> Self {
        Self::new(FeedStart::ServerDefault, PageLimit::forward(n))
    }

    /// The newest `n` records.
    #[must_use]
    pub fn latest(n: u32) -> Self {
        Self::new(FeedStart::MostRecent, PageLimit::forward(n))
    }

    /// `n` records after `id`.
    #[must_use]
    pub fn after(id: ChangeId, n: u32) -> Self {
        Self::new(FeedStart::Absolute(id), PageLimit::forward(n))
    }

    /// `n` records before `id`.
    #[must_use]
    pub fn before(id: ChangeId, n: u32) -> Self {
        Self::new(FeedStart::Absolute(id), PageLimit::backward(n))
    }

    /// Query terms in wire order: `change_id` (omitted for the server
    /// default) then `records`.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(2);
        match &self.start {
            FeedStart::ServerDefault => {},
            FeedStart::Absolute(id) => pairs.push(("change_id", id.as_str().to_string())),
            FeedStart::MostRecent => pairs.push(("change_id", MOST_RECENT_SENTINEL.to_string())),
        }
        pairs.push(("records", self.limit.wire_value().to_string()));
        pairs
    }

    /// Query string without the leading `?`.
    #[must_use]
    pub fn query_string(&self) -> String {
        self.query_pairs()
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query_string())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_server_default_omits_change_id() {
        assert_eq!(PageCursor::head(1).query_string(), "records=1");
        assert_eq!(PageCursor::default().query_string(), "records=100");
    }

    #[test]
    fn test_most_recent_uses_negative_sentinel() {
        assert_eq!(PageCursor::latest(1).query_string(), "change_id=-1&records=1");
    }

    #[test]
    fn test_absolute_start_both_directions() {
        let id = ChangeId::from_text("42");
        assert_eq!(
            PageCursor::after(id.clone(), 1).query_string(),
            "change_id=42&records=1"
        );
        assert_eq!(
            PageCursor::before(id, 1).query_string(),
            "change_id=42&records=-1"
        );
    }

    #[test]
    fn test_zero_page_size_is_clamped() {
        assert_eq!(PageLimit::forward(0).magnitude(), 1);
        assert_eq!(PageLimit::backward(0).wire_value(), -1);
    }

    proptest! {
        #[test]
        fn records_term_is_always_present_and_signed_by_direction(n in 1u32..100_000, back in any::<bool>(), id in 0u64..1_000_000) {
            let limit = if back { PageLimit::backward(n) } else { PageLimit::forward(n) };
            let cursor = PageCursor::new(FeedStart::Absolute(ChangeId::from_number(id)), limit);
            let pairs = cursor.query_pairs();

            prop_assert_eq!(pairs.len(), 2);
            prop_assert_eq!(pairs[0].0, "change_id");
            prop_assert_eq!(&pairs[0].1, &id.to_string());
            prop_assert_eq!(pairs[1].0, "records");
            let records: i64 = pairs[1].1.parse().unwrap();
            prop_assert_eq!(records.unsigned_abs(), u64::from(n));
            prop_assert_eq!(records < 0, back);
        }
    }
}
