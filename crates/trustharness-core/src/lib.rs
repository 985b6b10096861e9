//! Conformance harness for a trust-metadata client and its change feed.
//!
//! Two independent working copies of one remote identity are driven through
//! an ordered pipeline of scenarios. After every scenario the copies must
//! agree on what they observe, and the remote change feed must record
//! exactly the operations the pipeline performed.
//!
//! # Architecture
//!
//! ```text
//! Tester (scenario::runner)
//!    |
//!    +-- Pipeline [BasicLifecycle, DelegationIntroduction,
//!    |             RootRotation, FeedPagination]
//!    |
//!    +-- TrustClient<E: CommandExecutor>   (client, executor)
//!    |       subprocess per invocation, typed subcommands
//!    |
//!    +-- FeedProbe<F: ChangeFeed>          (changefeed)
//!            token exchange, cursor pagination, settling
//! ```
//!
//! The executor and the feed are traits so the whole pipeline can run
//! against an in-process simulation in tests.

pub mod changefeed;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod listing;
pub mod metadata;
pub mod scenario;

pub use changefeed::{
    ChangeCategory, ChangeFeed, ChangeFeedError, ChangeId, ChangePage, ChangeRecord, FeedProbe,
    FeedStart, HttpChangeFeed, PageCursor, PageLimit, SettlePolicy,
};
pub use client::{Credentials, TrustClient};
pub use config::{ConfigError, HarnessConfig};
pub use error::{FailureKind, HarnessError};
pub use executor::{CommandExecutor, ExecutionOutput, Invocation, PromptResponse, ShellExecutor, StdinScript};
pub use scenario::{Fixtures, Pipeline, Scenario, ScenarioContext, Tester};
