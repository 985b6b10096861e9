use tracing::info;

use super::assertions::{
    ensure_contains, ensure_feed_count, ensure_listings_match, ensure_records_for,
};
use super::{Scenario, ScenarioContext};
use crate::changefeed::{ChangeCategory, ChangeFeed};
use crate::error::HarnessError;
use crate::executor::CommandExecutor;

const NAME: &str = "basic_repo_test";
const BEFORE: u64 = 0;
const AFTER: u64 = 1;

/// Initialise the identity, publish one target, read it back from both
/// copies.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicLifecycle;

impl<E: CommandExecutor, F: ChangeFeed> Scenario<E, F> for BasicLifecycle {
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
        let (client, id) = (ctx.client, ctx.identity);

        info!("initializing a repo, adding a target, and pushing");
        client.init(ctx.primary, id)?;
        client.add(ctx.primary, id, NAME, ctx.marker, None)?;
        client.publish(ctx.primary, id)?;

        info!("listing and validating basic repo test targets");
        let primary = client.list(ctx.primary, id)?;
        let relisted = client.list(ctx.primary, id)?;
        ensure_listings_match(NAME, "repeated targets", &primary, &relisted)?;

        let secondary = client.list(ctx.secondary, id)?;
        ensure_listings_match(NAME, "targets", &primary, &secondary)?;
        ensure_contains(NAME, &primary, NAME)?;

        client.verify(ctx.primary, id, NAME, ctx.marker)?;

        let history = ctx.settled_history(AFTER)?;
        ensure_feed_count(NAME, &history, AFTER)?;
        ensure_records_for(NAME, &history, id, ChangeCategory::Update)
    }
}
