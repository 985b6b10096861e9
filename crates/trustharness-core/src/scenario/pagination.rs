use tracing::info;

use super::assertions::{ensure_ascending, ensure_feed_count, ensure_records_for};
use super::{Scenario, ScenarioContext};
use crate::changefeed::{ChangeCategory, ChangeFeed, ChangePage, ChangeRecord, PageCursor};
use crate::error::HarnessError;
use crate::executor::CommandExecutor;

const NAME: &str = "changefeed_test";
const BEFORE: u64 = 7;
const AFTER: u64 = 8;

/// Index into the pre-deletion history used as the absolute page anchor.
const ANCHOR: usize = 4;

/// Exercise default, full, most-recent, and anchored pages, deleting the
/// identity remotely along the way.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedPagination;

impl<E: CommandExecutor, F: ChangeFeed> Scenario<E, F> for FeedPagination {
    fn name(&self) -> &'static str {
        NAME
    }

    fn changes_before(&self) -> u64 {
        BEFORE
    }

    fn changes_added(&self) -> u64 {
        AFTER - BEFORE
    }

    fn run(&self, ctx: &ScenarioContext<'_, E, F>) -> Result<(), HarnessError> {
        let id = ctx.identity;

        info!("paging through existing history");
        let history = ctx.settled_history(BEFORE)?;
        let first = ctx.page(&PageCursor::head(1))?;
        ensure_feed_count(NAME, &first, 1)?;

        ensure_feed_count(NAME, &history, BEFORE)?;
        ensure_records_for(NAME, &history, id, ChangeCategory::Update)?;
        ensure_ascending(NAME, &history)?;
        if first.records[0].id != history.records[0].id {
            return Err(HarnessError::assertion(
                NAME,
                format!(
                    "first page starts at {}, history starts at {}",
                    first.records[0].id, history.records[0].id
                ),
            ));
        }

        info!("deleting the repo remotely");
        ctx.client.delete_remote(ctx.secondary, id)?;
        ctx.settled_history(AFTER)?;

        let latest = ctx.page(&PageCursor::latest(1))?;
        ensure_feed_count(NAME, &latest, 1)?;
        ensure_records_for(NAME, &latest, id, ChangeCategory::Deletion)?;

        info!("paging around an absolute change id");
        let anchor = record_at(&history, ANCHOR)?;

        let next = ctx.page(&PageCursor::after(anchor.id.clone(), 1))?;
        ensure_neighbour(&next, record_at(&history, ANCHOR + 1)?, "forward")?;

        let previous = ctx.page(&PageCursor::before(anchor.id.clone(), 1))?;
        ensure_neighbour(&previous, record_at(&history, ANCHOR - 1)?, "backward")
    }
}

fn record_at(history: &ChangePage, index: usize) -> Result<&ChangeRecord, HarnessError> {
    history.record(index).ok_or_else(|| {
        HarnessError::assertion(
            NAME,
            format!("history has {} records, needed index {index}", history.count),
        )
    })
}

fn ensure_neighbour(
    page: &ChangePage,
    expected: &ChangeRecord,
    direction: &str,
) -> Result<(), HarnessError> {
    ensure_feed_count(NAME, page, 1)?;
    if page.records[0].id == expected.id {
        return Ok(());
    }
    Err(HarnessError::assertion(
        NAME,
        format!(
            "{direction} page returned record {}, expected {}",
            page.records[0].id, expected.id
        ),
    ))
}
