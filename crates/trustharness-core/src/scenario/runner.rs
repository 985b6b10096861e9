//! Scenario runner.
//!
//! The primary working directory lives for the whole run. Each scenario
//! gets its own marker file and secondary directory, removed when the
//! scenario passes and kept on disk when it fails.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile, TempDir};
use tracing::{error, info, warn};

use super::{Fixtures, Pipeline, Scenario, ScenarioContext};
use crate::changefeed::{ChangeFeed, FeedProbe};
use crate::client::TrustClient;
use crate::error::HarnessError;
use crate::executor::CommandExecutor;

/// Drives a [`Pipeline`] against one identity.
pub struct Tester<E, F> {
    identity: String,
    client: TrustClient<E>,
    probe: FeedProbe<F>,
    fixtures: Fixtures,
    scratch: Option<PathBuf>,
    primary: TempDir,
}

impl<E: CommandExecutor, F: ChangeFeed> Tester<E, F> {
    /// Creates a runner with a fresh primary working directory in the
    /// system temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Io`] if the directory cannot be created.
    pub fn new(
        identity: impl Into<String>,
        client: TrustClient<E>,
        probe: FeedProbe<F>,
        fixtures: Fixtures,
    ) -> Result<Self, HarnessError> {
        Self::build(identity.into(), client, probe, fixtures, None)
    }

    /// Like [`Tester::new`], placing every temporary file under `scratch`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Io`] if the directory cannot be created.
    pub fn in_dir(
        scratch: impl Into<PathBuf>,
        identity: impl Into<String>,
        client: TrustClient<E>,
        probe: FeedProbe<F>,
        fixtures: Fixtures,
    ) -> Result<Self, HarnessError> {
        Self::build(identity.into(), client, probe, fixtures, Some(scratch.into()))
    }

    fn build(
        identity: String,
        client: TrustClient<E>,
        probe: FeedProbe<F>,
        fixtures: Fixtures,
        scratch: Option<PathBuf>,
    ) -> Result<Self, HarnessError> {
        let primary = temp_dir(scratch.as_deref(), "_main")?;
        Ok(Self {
            identity,
            client,
            probe,
            fixtures,
            scratch,
            primary,
        })
    }

    /// Identity under test.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Primary working directory.
    #[must_use]
    pub fn primary_dir(&self) -> &Path {
        self.primary.path()
    }

    /// Runs every scenario in order, stopping at the first failure.
    ///
    /// The pipeline is validated before any command runs. On success all
    /// temporary files are removed; on failure they are left in place and
    /// their paths logged.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by validation or by a scenario.
    pub fn run(self, pipeline: &Pipeline<E, F>) -> Result<(), HarnessError> {
        let total = pipeline.validate()?;
        info!(
            identity = %self.identity,
            primary = %self.primary.path().display(),
            scenarios = pipeline.len(),
            expected_changes = total,
            "starting conformance run"
        );

        for scenario in pipeline.scenarios() {
            if let Err(error) = self.run_scenario(scenario.as_ref()) {
                let primary = self.primary.keep();
                error!(
                    scenario = scenario.name(),
                    kind = %error.kind(),
                    primary = %primary.display(),
                    "scenario failed, leaving working directories for inspection"
                );
                return Err(error);
            }
        }

        info!(identity = %self.identity, "all scenarios passed");
        Ok(())
    }

    fn run_scenario(&self, scenario: &dyn Scenario<E, F>) -> Result<(), HarnessError> {
        let name = scenario.name();
        let marker = write_marker(self.scratch.as_deref(), name)?;
        let secondary = temp_dir(self.scratch.as_deref(), "_temp")?;

        info!(
            scenario = name,
            secondary = %secondary.path().display(),
            "running scenario"
        );

        let ctx = ScenarioContext {
            identity: &self.identity,
            primary: self.primary.path(),
            secondary: secondary.path(),
            marker: marker.path(),
            client: &self.client,
            probe: &self.probe,
            fixtures: &self.fixtures,
        };

        match scenario.run(&ctx) {
            Ok(()) => {
                info!(scenario = name, "scenario passed");
                Ok(())
            },
            Err(error) => {
                let secondary = secondary.keep();
                match marker.into_temp_path().keep() {
                    Ok(marker) => {
                        warn!(
                            scenario = name,
                            marker = %marker.display(),
                            secondary = %secondary.display(),
                            "kept scenario files"
                        );
                    },
                    Err(keep_error) => {
                        warn!(
                            scenario = name,
                            secondary = %secondary.display(),
                            error = %keep_error,
                            "kept secondary directory, marker file could not be kept"
                        );
                    },
                }
                Err(error)
            },
        }
    }
}

fn temp_dir(scratch: Option<&Path>, suffix: &str) -> Result<TempDir, HarnessError> {
    let mut builder = Builder::new();
    builder.suffix(suffix);
    match scratch {
        Some(dir) => builder.tempdir_in(dir),
        None => builder.tempdir(),
    }
    .map_err(|e| HarnessError::io(format!("failed to create {suffix} directory"), e))
}

fn write_marker(scratch: Option<&Path>, name: &str) -> Result<NamedTempFile, HarnessError> {
    let file = match scratch {
        Some(dir) => NamedTempFile::new_in(dir),
        None => NamedTempFile::new(),
    }
    .map_err(|e| HarnessError::io("failed to create marker file", e))?;

    writeln!(file.as_file(), "{name}")
        .map_err(|e| HarnessError::io("failed to write marker file", e))?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::changefeed::{ChangeFeedError, ChangePage, PageCursor, SettlePolicy};
    use crate::executor::{ExecutionOutput, Invocation};

    /// Records the directories and marker contents each invocation saw.
    #[derive(Default)]
    struct Snooper {
        seen: RefCell<Vec<(String, String)>>,
    }

    impl CommandExecutor for Snooper {
        fn execute(&self, invocation: &Invocation) -> Result<ExecutionOutput, HarnessError> {
            let dir = invocation.flag_value("-d").unwrap_or_default().to_string();
            let marker = invocation
                .args
                .iter()
                .find_map(|arg| std::fs::read_to_string(arg).ok())
                .unwrap_or_default();
            self.seen.borrow_mut().push((dir, marker));
            Ok(ExecutionOutput::success(""))
        }
    }

    struct EmptyFeed;

    impl ChangeFeed for EmptyFeed {
        fn fetch_page(
            &self,
            _identity: Option<&str>,
            _cursor: &PageCursor,
        ) -> Result<ChangePage, ChangeFeedError> {
            Ok(ChangePage::from_records(Vec::new()))
        }
    }

    /// Adds a target from the secondary copy, then fails or passes.
    struct Probe {
        fail: bool,
    }

    impl Scenario<Snooper, EmptyFeed> for Probe {
        fn name(&self) -> &'static str {
            "probe_test"
        }

        fn changes_before(&self) -> u64 {
            0
        }

        fn changes_added(&self) -> u64 {
            0
        }

        fn run(&self, ctx: &ScenarioContext<'_, Snooper, EmptyFeed>) -> Result<(), HarnessError> {
            ctx.client.add(ctx.secondary, ctx.identity, "t", ctx.marker, None)?;
            if self.fail {
                return Err(HarnessError::assertion("probe_test", "forced"));
            }
            Ok(())
        }
    }

    fn tester(scratch: &Path) -> Tester<Snooper, EmptyFeed> {
        let client = TrustClient::new("notary", "https://server", "/ca.crt", Snooper::default());
        let probe = FeedProbe::new(EmptyFeed, SettlePolicy::Fixed(std::time::Duration::ZERO));
        Tester::in_dir(scratch, "gun", client, probe, Fixtures::in_dir(scratch)).unwrap()
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_marker_holds_scenario_name_and_files_are_removed_on_success() {
        let scratch = tempfile::tempdir().unwrap();
        let tester = tester(scratch.path());
        assert!(tester.primary_dir().to_string_lossy().ends_with("_main"));
        assert_eq!(tester.identity(), "gun");

        let pipeline = Pipeline::default().with(Probe { fail: false });
        tester.run(&pipeline).unwrap();
        assert!(entries(scratch.path()).is_empty());
    }

    #[test]
    fn test_files_are_kept_on_failure() {
        let scratch = tempfile::tempdir().unwrap();
        let tester = tester(scratch.path());

        let pipeline = Pipeline::default()
            .with(Probe { fail: false })
            .with(Probe { fail: true });
        let error = tester.run(&pipeline).unwrap_err();
        assert!(matches!(error, HarnessError::Assertion { .. }));

        let kept = entries(scratch.path());
        assert_eq!(kept.len(), 3, "kept: {kept:?}");
        assert_eq!(kept.iter().filter(|n| n.ends_with("_main")).count(), 1);
        assert_eq!(kept.iter().filter(|n| n.ends_with("_temp")).count(), 1);

        let marker = kept
            .iter()
            .find(|n| !n.ends_with("_main") && !n.ends_with("_temp"))
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(scratch.path().join(marker)).unwrap(),
            "probe_test\n"
        );
    }

    #[test]
    fn test_each_scenario_gets_its_own_secondary_dir() {
        let scratch = tempfile::tempdir().unwrap();
        let tester = tester(scratch.path());
        let pipeline = Pipeline::default()
            .with(Probe { fail: false })
            .with(Probe { fail: false });

        let mut dirs = Vec::new();
        for scenario in pipeline.scenarios() {
            tester.run_scenario(scenario.as_ref()).unwrap();
        }
        for (dir, marker) in tester.client.executor().seen.borrow().iter() {
            assert!(dir.ends_with("_temp"));
            assert_eq!(marker, "probe_test\n");
            dirs.push(dir.clone());
        }
        assert_eq!(dirs.len(), 2);
        assert_ne!(dirs[0], dirs[1]);
    }

    #[test]
    fn test_invalid_pipeline_runs_nothing() {
        struct Late;
        impl Scenario<Snooper, EmptyFeed> for Late {
            fn name(&self) -> &'static str {
                "late_test"
            }
            fn changes_before(&self) -> u64 {
                3
            }
            fn changes_added(&self) -> u64 {
                1
            }
            fn run(&self, _ctx: &ScenarioContext<'_, Snooper, EmptyFeed>) -> Result<(), HarnessError> {
                panic!("must not run");
            }
        }

        let scratch = tempfile::tempdir().unwrap();
        let error = tester(scratch.path())
            .run(&Pipeline::default().with(Late))
            .unwrap_err();
        assert!(matches!(error, HarnessError::PipelineOrder { .. }));
    }
}
