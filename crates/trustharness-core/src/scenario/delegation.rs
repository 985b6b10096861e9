use tracing::info;

use super::assertions::{
    ensure_contains, ensure_feed_count, ensure_listings_match, ensure_records_for, ensure_single,
};
use super::{DELEGATION_ROLE, Scenario, ScenarioContext};
use crate::changefeed::{ChangeCategory, ChangeFeed};
use crate::error::HarnessError;
use crate::executor::CommandExecutor;
use crate::listing::entries_matching;

const NAME: &str = "add_delegation_test";
const BEFORE: u64 = 1;
const AFTER: u64 = 4;

/// Move the snapshot key to the server, add a delegation, and publish a
/// target signed by it from the secondary copy.
///
/// Three publishes are recorded: the snapshot rotation, the primary's
/// delegation publish, and the secondary's delegated target.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelegationIntroduction;

impl<E: CommandExecutor, F: ChangeFeed> Scenario<E, F> for DelegationIntroduction {
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

        info!("rotating the snapshot key to server and adding a delegation");
        client.rotate_key(ctx.primary, id, "snapshot", true)?;
        client.add_delegation(ctx.primary, id, DELEGATION_ROLE, &ctx.fixtures.delegation_cert)?;
        client.publish(ctx.primary, id)?;

        info!("listing delegations");
        let primary = client.list_delegations(ctx.primary, id)?;
        let secondary = client.list_delegations(ctx.secondary, id)?;
        ensure_listings_match(NAME, "delegation", &primary, &secondary)?;
        ensure_contains(NAME, &primary, DELEGATION_ROLE)?;

        info!("publishing a target using a delegation");
        client.import_key(ctx.secondary, &ctx.fixtures.delegation_key, Some(DELEGATION_ROLE))?;
        client.add(ctx.secondary, id, NAME, ctx.marker, Some(DELEGATION_ROLE))?;
        client.publish(ctx.secondary, id)?;

        info!("listing and validating delegation repo test targets");
        let primary = client.list(ctx.primary, id)?;
        let secondary = client.list(ctx.secondary, id)?;
        ensure_listings_match(NAME, "targets", &primary, &secondary)?;
        ensure_single(
            NAME,
            "target signed by the delegation",
            &entries_matching(&primary, NAME, DELEGATION_ROLE),
        )?;

        let history = ctx.settled_history(AFTER)?;
        ensure_feed_count(NAME, &history, AFTER)?;
        ensure_records_for(NAME, &history, id, ChangeCategory::Update)
    }
}
