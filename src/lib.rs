//! # scesim: scenario based testing for rule sessions
//!
//! A simulation is a table: columns declare a fact type, a field path and a
//! role (GIVEN or EXPECTED), rows are scenarios. Running a simulation builds
//! the given facts of each row, lets a rule session evaluate them, and checks
//! the facts it ends up with against the expected cells.
//!
//! ## Components
//!
//! - Document model ([`model`]) and fact type resolution ([`types`])
//! - Expression evaluation of cells ([`eval`])
//! - The rule session contract and an in-memory engine ([`session`])
//! - The per scenario pipeline and test notifications ([`runner`])
//! - Runs over an editable document with results written back ([`service`])
//!
//! ## Pipeline
//!
//! ```text
//! Scenario → Extractor → Executor → Verifier → Aggregator → RunNotifier
//! ```
//!
//! Each scenario runs behind its own failure boundary; one failing scenario
//! never prevents the next from running.

pub mod config;
pub mod error;
pub mod eval;
pub mod model;
pub mod runner;
pub mod service;
pub mod session;
pub mod types;

// Re-exports
pub use config::{ConfigError, RunnerConfig, SessionIsolation};
pub use error::*;
pub use runner::{RunReport, ScenarioRunner};
pub use service::{ScenarioRunnerService, TestResultMessage};

#[cfg(test)]
mod tests {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    #[ctor::ctor]
    fn init_tests() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}
