//! Ordered conformance pipeline.
//!
//! Scenarios are not independent: each one asserts cumulative change-feed
//! counts that depend on how many mutations every earlier scenario made.
//! Every scenario therefore declares the count it expects to find and the
//! count it adds, and [`Pipeline::validate`] checks the chain before any
//! command runs.
//!
//! ```text
//! basic_repo_test      0 -> 1   init, add, publish
//! add_delegation_test  1 -> 4   snapshot rotation, delegation, delegated target
//! root_rotation_test   4 -> 7   root rotation, publish from both copies
//! changefeed_test      7 -> 8   pagination, remote delete
//! ```

mod assertions;
mod basic;
mod delegation;
mod pagination;
mod root_rotation;
mod runner;

use std::path::{Path, PathBuf};

pub use assertions::{
    ensure_ascending, ensure_contains, ensure_feed_count, ensure_listings_match,
    ensure_records_for, ensure_single,
};
pub use basic::BasicLifecycle;
pub use delegation::DelegationIntroduction;
pub use pagination::FeedPagination;
pub use root_rotation::RootRotation;
pub use runner::Tester;

use crate::changefeed::{ChangeFeed, ChangePage, FeedProbe, PageCursor};
use crate::client::TrustClient;
use crate::error::HarnessError;
use crate::executor::CommandExecutor;

/// Delegation role the pipeline creates and signs with.
pub const DELEGATION_ROLE: &str = "targets/releases";

/// Certificate and key backing the delegation role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixtures {
    /// Public certificate passed to `delegation add`.
    pub delegation_cert: PathBuf,
    /// Private key imported into the secondary copy.
    pub delegation_key: PathBuf,
}

impl Fixtures {
    /// The standard fixture names under `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            delegation_cert: dir.join("secure.example.com.crt"),
            delegation_key: dir.join("secure.example.com.key"),
        }
    }
}

/// Everything a scenario may touch.
pub struct ScenarioContext<'a, E, F> {
    /// Identity under test.
    pub identity: &'a str,
    /// Long-lived working directory shared by every scenario.
    pub primary: &'a Path,
    /// Fresh, empty working directory for this scenario only.
    pub secondary: &'a Path,
    /// File containing `<scenario name>\n`, used as target content.
    pub marker: &'a Path,
    /// Trust client.
    pub client: &'a TrustClient<E>,
    /// Change feed with its settling policy.
    pub probe: &'a FeedProbe<F>,
    /// Delegation certificate and key.
    pub fixtures: &'a Fixtures,
}

impl<E: CommandExecutor, F: ChangeFeed> ScenarioContext<'_, E, F> {
    /// Waits for `expected` records and returns the identity's full
    /// history.
    pub fn settled_history(&self, expected: u64) -> Result<ChangePage, HarnessError> {
        let expected = usize::try_from(expected).unwrap_or(usize::MAX);
        self.probe.settle(Some(self.identity), expected)?;
        Ok(self.probe.history(Some(self.identity))?)
    }

    /// Fetches one page of the identity's feed.
    pub fn page(&self, cursor: &PageCursor) -> Result<ChangePage, HarnessError> {
        Ok(self.probe.fetch(Some(self.identity), cursor)?)
    }
}

/// One step of the pipeline.
pub trait Scenario<E, F> {
    /// Name used for logging and written into the marker file.
    fn name(&self) -> &'static str;

    /// Records the feed must already hold when this scenario starts.
    fn changes_before(&self) -> u64;

    /// Records this scenario adds.
    fn changes_added(&self) -> u64;

    /// Records the feed must hold when this scenario finishes.
    fn changes_after(&self) -> u64 {
        self.changes_before() + self.changes_added()
    }

    /// Runs the scenario, failing on the first broken expectation.
    fn run(&self, ctx: &ScenarioContext<'_, E, F>) -> Result<(), HarnessError>;
}

/// Scenarios in execution order.
pub struct Pipeline<E, F> {
    scenarios: Vec<Box<dyn Scenario<E, F>>>,
}

impl<E, F> Default for Pipeline<E, F> {
    fn default() -> Self {
        Self {
            scenarios: Vec::new(),
        }
    }
}

impl<E: CommandExecutor, F: ChangeFeed> Pipeline<E, F> {
    /// The four conformance scenarios in their required order.
    #[must_use]
    pub fn standard() -> Self {
        Self::default()
            .with(BasicLifecycle)
            .with(DelegationIntroduction)
            .with(RootRotation)
            .with(FeedPagination)
    }
}

impl<E, F> Pipeline<E, F> {
    /// Appends a scenario.
    #[must_use]
    pub fn with(mut self, scenario: impl Scenario<E, F> + 'static) -> Self {
        self.scenarios.push(Box::new(scenario));
        self
    }

    /// Scenarios in order.
    #[must_use]
    pub fn scenarios(&self) -> &[Box<dyn Scenario<E, F>>] {
        &self.scenarios
    }

    /// Scenario names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.scenarios.iter().map(|s| s.name()).collect()
    }

    /// Number of scenarios.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Returns `true` if the pipeline has no scenarios.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Checks that every scenario's precondition equals the changes made by
    /// the scenarios before it, and returns the final total.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::PipelineOrder`] naming the first misplaced
    /// scenario.
    pub fn validate(&self) -> Result<u64, HarnessError> {
        let mut total = 0;
        for scenario in &self.scenarios {
            if scenario.changes_before() != total {
                return Err(HarnessError::PipelineOrder {
                    scenario: scenario.name(),
                    declared: scenario.changes_before(),
                    actual: total,
                });
            }
            total += scenario.changes_added();
        }
        Ok(total)
    }
}
