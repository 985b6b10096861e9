//! Paginated access to the remote change feed.
//!
//! The feed is an append-only, totally ordered log of every operation that
//! changed an identity's published metadata. Pages are selected with a
//! [`PageCursor`]; [`FeedProbe`] adds the settling wait used after
//! mutations.

mod cursor;
mod error;
mod http;
mod record;
mod settle;

pub use cursor::{DEFAULT_PAGE_SIZE, FeedStart, MOST_RECENT_SENTINEL, PageCursor, PageLimit};
pub use error::ChangeFeedError;
pub use http::HttpChangeFeed;
pub use record::{ChangeCategory, ChangeId, ChangePage, ChangeRecord};
pub use settle::{FeedProbe, HISTORY_PAGE_SIZE, SettlePolicy};

/// Source of change-feed pages.
///
/// Implementations return the page as the server sent it; ordering and
/// content checks belong to the caller.
pub trait ChangeFeed {
    /// Fetches one page for `identity`, or across all identities when
    /// `None`.
    fn fetch_page(
        &self,
        identity: Option<&str>,
        cursor: &PageCursor,
    ) -> Result<ChangePage, ChangeFeedError>;
}

impl<F: ChangeFeed + ?Sized> ChangeFeed for &F {
    fn fetch_page(
        &self,
        identity: Option<&str>,
        cursor: &PageCursor,
    ) -> Result<ChangePage, ChangeFeedError> {
        (**self).fetch_page(identity, cursor)
    }
}
