//! Scenario execution pipeline.
//!
//! Every scenario goes through the same stages, driven by the
//! [`harness::ScenarioRunner`]:
//!
//! ```text
//! Extractor → Executor → Verifier → Aggregator
//! ```
//!
//! - [`extractor`] turns GIVEN cells into facts and EXPECTED cells into
//!   checks, using the descriptor resolved once per run.
//! - [`executor`] inserts the facts into a rule session and fires all rules.
//! - [`verifier`] reads facts back and records one [`data::ScenarioResult`]
//!   per EXPECTED cell.
//! - [`aggregator`] combines the results and reports every mismatch of the
//!   scenario at once.
//!
//! The harness isolates scenarios from each other: any failure, a panic
//! included, is reported through the [`notifier::RunNotifier`] as a failure
//! of that scenario only.

pub mod aggregator;
pub mod data;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod harness;
pub mod notifier;
pub mod verifier;

pub use aggregator::{validate_assertion, AssertionFailure, CellMismatch};
pub use data::{
    ExpectedCheck, MismatchKind, ResultState, ScenarioExpect, ScenarioGiven, ScenarioResult,
    ScenarioRunnerData,
};
pub use error::{
    RunError, RunResult, ScenarioError, ScenarioExecutionError, ValueExtractionError,
    VerificationError,
};
pub use executor::execute_scenario;
pub use extractor::{extract_expected_values, extract_given_values, Extraction, ResolvedDescriptor};
pub use harness::{RunReport, RunnerState, ScenarioOutcome, ScenarioRunner};
pub use notifier::{
    Description, EachTestNotifier, Failure, FailureKind, MockRunNotifier, NotificationEvent, RecordingNotifier,
    RunNotifier,
};
pub use verifier::{
    verify_conditions, CandidatePolicy, CandidateSelection, FactCheckerHandle, FactLocator,
    InsertedFactLocator,
};
