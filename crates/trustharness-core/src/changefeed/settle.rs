//! Waiting for the change feed to reflect recent mutations.
//!
//! Feed backends may lag behind the metadata store. [`SettlePolicy::Fixed`]
//! sleeps once before querying; [`SettlePolicy::Poll`] queries the full
//! history until the expected number of records is visible or a deadline
//! passes. Neither retries on errors.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::ChangeFeed;
use super::cursor::PageCursor;
use super::error::ChangeFeedError;
use super::record::ChangePage;

/// Page size used to read a whole history in one query.
pub const HISTORY_PAGE_SIZE: u32 = 1000;

/// How to wait for the feed to catch up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlePolicy {
    /// Sleep once, then query.
    Fixed(Duration),
    /// Query every `interval` until the count is reached or `timeout`
    /// elapses.
    Poll {
        /// Sleep between queries.
        interval: Duration,
        /// Deadline measured from the first query.
        timeout: Duration,
    },
}

/// A change feed paired with a settling policy.
pub struct FeedProbe<F> {
    feed: F,
    policy: SettlePolicy,
}

impl<F: ChangeFeed> FeedProbe<F> {
    /// Creates a probe.
    pub const fn new(feed: F, policy: SettlePolicy) -> Self {
        Self { feed, policy }
    }

    /// The wrapped feed.
    pub const fn feed(&self) -> &F {
        &self.feed
    }

    /// The configured policy.
    pub const fn policy(&self) -> SettlePolicy {
        self.policy
    }

    /// Fetches one page and checks that its count matches its records.
    pub fn fetch(
        &self,
        identity: Option<&str>,
        cursor: &PageCursor,
    ) -> Result<ChangePage, ChangeFeedError> {
        let page = self.feed.fetch_page(identity, cursor)?;
        page.ensure_consistent()
            .map_err(|message| ChangeFeedError::Decode { message })?;
        Ok(page)
    }

    /// Fetches the whole history, oldest first.
    pub fn history(&self, identity: Option<&str>) -> Result<ChangePage, ChangeFeedError> {
        self.fetch(identity, &PageCursor::head(HISTORY_PAGE_SIZE))
    }

    /// Waits until the history holds at least `expected` records.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeFeedError::SettleTimeout`] if polling reaches its
    /// deadline first, or any error from the feed itself.
    pub fn settle(&self, identity: Option<&str>, expected: usize) -> Result<(), ChangeFeedError> {
        match self.policy {
            SettlePolicy::Fixed(delay) => {
                info!(delay_secs = delay.as_secs(), "waiting for change feed to settle");
                std::thread::sleep(delay);
                Ok(())
            },
            SettlePolicy::Poll { interval, timeout } => {
                let started = Instant::now();
                loop {
                    let observed = self.history(identity)?.count;
                    if observed >= expected {
                        debug!(observed, expected, "change feed settled");
                        return Ok(());
                    }
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(ChangeFeedError::SettleTimeout {
                            expected,
                            observed,
                            waited_secs: waited.as_secs(),
                        });
                    }
                    debug!(observed, expected, "change feed behind, polling again");
                    std::thread::sleep(interval.min(timeout.saturating_sub(waited)));
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::changefeed::record::{ChangeCategory, ChangeId, ChangeRecord};

    /// Feed whose history grows by one record per query, up to `limit`.
    struct GrowingFeed {
        queries: Cell<usize>,
        limit: usize,
    }

    impl ChangeFeed for GrowingFeed {
        fn fetch_page(
            &self,
            identity: Option<&str>,
            _cursor: &PageCursor,
        ) -> Result<ChangePage, ChangeFeedError> {
            let seen = (self.queries.get() + 1).min(self.limit);
            self.queries.set(self.queries.get() + 1);
            let gun = identity.unwrap_or("gun");
            Ok(ChangePage::from_records(
                (1..=seen as u64)
                    .map(|id| ChangeRecord::new(ChangeId::from_number(id), gun, ChangeCategory::Update))
                    .collect(),
            ))
        }
    }

    fn poll(interval_ms: u64, timeout_ms: u64) -> SettlePolicy {
        SettlePolicy::Poll {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[test]
    fn test_poll_returns_once_count_reached() {
        let probe = FeedProbe::new(
            GrowingFeed {
                queries: Cell::new(0),
                limit: 10,
            },
            poll(1, 5_000),
        );
        probe.settle(Some("gun"), 3).unwrap();
        assert_eq!(probe.feed().queries.get(), 3);
    }

    #[test]
    fn test_poll_times_out_when_feed_stalls() {
        let probe = FeedProbe::new(
            GrowingFeed {
                queries: Cell::new(0),
                limit: 2,
            },
            poll(5, 30),
        );
        match probe.settle(Some("gun"), 4).unwrap_err() {
            ChangeFeedError::SettleTimeout {
                expected, observed, ..
            } => {
                assert_eq!(expected, 4);
                assert_eq!(observed, 2);
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fixed_never_queries() {
        let probe = FeedProbe::new(
            GrowingFeed {
                queries: Cell::new(0),
                limit: 10,
            },
            SettlePolicy::Fixed(Duration::from_millis(1)),
        );
        probe.settle(Some("gun"), 100).unwrap();
        assert_eq!(probe.feed().queries.get(), 0);
    }

    #[test]
    fn test_fetch_rejects_inconsistent_page() {
        struct Lying;
        impl ChangeFeed for Lying {
            fn fetch_page(
                &self,
                _identity: Option<&str>,
                _cursor: &PageCursor,
            ) -> Result<ChangePage, ChangeFeedError> {
                Ok(ChangePage {
                    count: 2,
                    records: Vec::new(),
                })
            }
        }

        let probe = FeedProbe::new(Lying, SettlePolicy::Fixed(Duration::ZERO));
        assert!(matches!(
            probe.history(None),
            Err(ChangeFeedError::Decode { .. })
        ));
    }
}
