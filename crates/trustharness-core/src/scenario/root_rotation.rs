use tracing::info;

use super::assertions::{ensure_feed_count, ensure_listings_match, ensure_records_for, ensure_single};
use super::{DELEGATION_ROLE, Scenario, ScenarioContext};
use crate::changefeed::{ChangeCategory, ChangeFeed};
use crate::error::HarnessError;
use crate::executor::CommandExecutor;
use crate::listing::{entries_matching, root_key_lines};
use crate::metadata::{RootMetadata, check_root_rotation};

const NAME: &str = "root_rotation_test";
const BEFORE: u64 = 4;
const AFTER: u64 = 7;

/// Rotate the root key and check that a fresh copy picks up exactly one
/// new trusted root key, then publish from both copies.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootRotation;

impl<E: CommandExecutor, F: ChangeFeed> Scenario<E, F> for RootRotation {
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

        info!("figuring out what the old keys are");
        client.list(ctx.secondary, id)?;

        let keys = client.list_keys(ctx.primary)?;
        let original_root = ensure_single(NAME, "root key", &root_key_lines(&keys))?.to_string();

        let before = RootMetadata::load(ctx.secondary, id)?;
        ensure_single(
            NAME,
            "trusted root key before rotation",
            &before
                .trusted_root_keys()
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>(),
        )?;

        info!("rotating root key");
        client.rotate_root_key(ctx.primary, id)?;
        let keys = client.list_keys(ctx.primary)?;
        let new_roots: Vec<&str> = root_key_lines(&keys)
            .into_iter()
            .filter(|line| *line != original_root)
            .collect();
        ensure_single(NAME, "new root key", &new_roots)?;

        client.list(ctx.secondary, id)?;
        let after = RootMetadata::load(ctx.secondary, id)?;
        check_root_rotation(&before, &after)
            .map_err(|message| HarnessError::assertion(NAME, message))?;

        info!("ensuring we can still publish");
        client.import_key(ctx.secondary, &ctx.fixtures.delegation_key, Some(DELEGATION_ROLE))?;
        client.add(
            ctx.secondary,
            id,
            "root_rotation_test_delegation_add",
            ctx.marker,
            Some(DELEGATION_ROLE),
        )?;
        client.publish(ctx.secondary, id)?;
        client.add(ctx.primary, id, "root_rotation_test_targets_add", ctx.marker, None)?;
        client.publish(ctx.primary, id)?;

        let primary = client.list(ctx.primary, id)?;
        let secondary = client.list(ctx.secondary, id)?;
        ensure_listings_match(NAME, "targets", &primary, &secondary)?;
        ensure_single(
            NAME,
            "delegated target after rotation",
            &entries_matching(&primary, "root_rotation_test_delegation_add", DELEGATION_ROLE),
        )?;
        ensure_single(
            NAME,
            "targets-role target after rotation",
            &entries_matching(&primary, "root_rotation_test_targets_add", "targets"),
        )?;

        let history = ctx.settled_history(AFTER)?;
        ensure_feed_count(NAME, &history, AFTER)?;
        ensure_records_for(NAME, &history, id, ChangeCategory::Update)
    }
}
