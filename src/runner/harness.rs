use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, info, warn};

use super::aggregator::validate_assertion;
use super::data::{ScenarioResult, ScenarioRunnerData};
use super::error::{panic_message, RunError, RunResult, ScenarioError, ValueExtractionError};
use super::executor::execute_scenario;
use super::extractor::{extract_expected_values, extract_given_values, Extraction, ResolvedDescriptor};
use super::notifier::{Description, EachTestNotifier, Failure, RunNotifier};
use super::verifier::{verify_conditions, CandidateSelection, FactLocator};
use crate::config::{RunnerConfig, SessionIsolation};
use crate::eval::{EvaluatorProvider, ExpressionEvaluator};
use crate::model::{FactIdentifier, Scenario, Simulation, SimulationDescriptor};
use crate::session::{RuleSession, SessionProvider};
use crate::{Error, InternalResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum RunnerState {
    #[default]
    NotStarted,
    /// Running the scenario at this position.
    Running(usize),
    Finished { passed: usize, failed: usize },
    /// The run stopped before every scenario was executed.
    Aborted,
}

/// Outcome of one scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    pub index: usize,
    pub description: String,
    pub passed: bool,
    /// One result per verified EXPECTED cell; empty when the scenario failed
    /// before verification.
    pub results: Vec<ScenarioResult>,
    pub failure: Option<Failure>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub description: Description,
    pub outcomes: Vec<ScenarioOutcome>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.passed)
    }

    pub fn run_count(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| !outcome.passed).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Failure> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.failure.as_ref())
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{}: {}/{} scenario(s) passed",
            self.description.display_name(),
            self.run_count() - self.failure_count(),
            self.run_count()
        )?;
        for outcome in self.outcomes.iter().filter(|outcome| !outcome.passed) {
            let Some(failure) = &outcome.failure else {
                writeln!(f, "  FAILED #{} {}", outcome.index + 1, outcome.description)?;
                continue;
            };
            writeln!(
                f,
                "  FAILED #{} {} ({})",
                outcome.index + 1,
                outcome.description,
                failure.kind
            )?;
            if failure.mismatches.is_empty() {
                for line in failure.message.lines() {
                    writeln!(f, "    {}", line)?;
                }
            } else {
                for mismatch in &failure.mismatches {
                    writeln!(f, "    - {}", mismatch)?;
                }
            }
        }
        Ok(())
    }
}

/// Runs the scenarios of one simulation against sessions from a provider
/// and reports each of them through a [`RunNotifier`].
pub struct ScenarioRunner {
    session_provider: Arc<dyn SessionProvider>,
    evaluator_provider: Arc<dyn EvaluatorProvider>,
    descriptor: SimulationDescriptor,
    scenarios: Vec<Scenario>,
    config: RunnerConfig,
    selection: CandidateSelection,
    description: Description,
    state: RunnerState,
}

impl ScenarioRunner {
    pub fn new(
        session_provider: Arc<dyn SessionProvider>,
        evaluator_provider: Arc<dyn EvaluatorProvider>,
        simulation: Simulation,
        config: RunnerConfig,
    ) -> Self {
        Self {
            session_provider,
            evaluator_provider,
            descriptor: simulation.descriptor,
            scenarios: simulation.scenarios,
            selection: CandidateSelection::new(config.candidate_policy),
            description: Description::suite(&config.suite_name),
            config,
            state: RunnerState::NotStarted,
        }
    }

    /// Picks the candidate fact explicitly for `fact_identifier`.
    pub fn with_locator(mut self, fact_identifier: FactIdentifier, locator: Arc<dyn FactLocator>) -> Self {
        self.selection.set_locator(fact_identifier, locator);
        self
    }

    /// Suite description; one child is added per scenario as it runs.
    pub fn description(&self) -> &Description {
        &self.description
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    async fn acquire(&self) -> RunResult<Box<dyn RuleSession>> {
        let mut session = self
            .session_provider
            .acquire()
            .await
            .map_err(RunError::SessionUnavailable)?;
        session.set_max_firings(self.config.max_rule_firings);
        Ok(session)
    }

    /// Runs every scenario in order. A failing scenario never stops the
    /// ones after it; only an invalid descriptor or an unavailable session
    /// ends the run early.
    #[tracing::instrument(skip_all, fields(suite = %self.config.suite_name, scenarios = self.scenarios.len()))]
    pub async fn run(&mut self, notifier: &mut dyn RunNotifier) -> RunResult<RunReport> {
        self.description = Description::suite(&self.config.suite_name);
        let result = self.run_all(notifier).await;
        if result.is_err() {
            self.state = RunnerState::Aborted;
        }
        result
    }

    async fn run_all(&mut self, notifier: &mut dyn RunNotifier) -> RunResult<RunReport> {
        self.descriptor.validate()?;

        let registry = self.session_provider.type_registry();
        let resolved = ResolvedDescriptor::resolve(&self.descriptor, &registry);
        let evaluator = self.evaluator_provider.create(&registry);

        let mut shared = match self.config.session_isolation {
            SessionIsolation::PerRun => Some(self.acquire().await?),
            SessionIsolation::PerScenario => None,
        };
        info!(
            "running {} scenario(s) with {} session isolation",
            self.scenarios.len(),
            self.config.session_isolation
        );

        let mut outcomes = Vec::with_capacity(self.scenarios.len());
        for index in 0..self.scenarios.len() {
            self.state = RunnerState::Running(index);
            let outcome = match shared.as_mut() {
                Some(session) => {
                    self.run_scenario(index, session.as_mut(), &resolved, evaluator.as_ref(), notifier)
                        .await
                }
                None => {
                    let mut session = self.acquire().await?;
                    let outcome = self
                        .run_scenario(index, session.as_mut(), &resolved, evaluator.as_ref(), notifier)
                        .await;
                    dispose(session.as_mut()).await;
                    outcome
                }
            };
            outcomes.push(outcome);
        }
        if let Some(mut session) = shared {
            dispose(session.as_mut()).await;
        }

        let report = RunReport {
            description: self.description.clone(),
            outcomes,
        };
        self.state = RunnerState::Finished {
            passed: report.run_count() - report.failure_count(),
            failed: report.failure_count(),
        };
        info!(
            "{} of {} scenario(s) failed",
            report.failure_count(),
            report.run_count()
        );
        Ok(report)
    }

    /// Runs one scenario behind a failure boundary: domain failures are
    /// reported as they are, anything else (panics included) as an
    /// unexpected error of this scenario.
    async fn run_scenario(
        &mut self,
        index: usize,
        session: &mut dyn RuleSession,
        resolved: &ResolvedDescriptor,
        evaluator: &dyn ExpressionEvaluator,
        notifier: &mut dyn RunNotifier,
    ) -> ScenarioOutcome {
        let scenario = &self.scenarios[index];
        let child = Description::test(&scenario.description);
        self.description.add_child(child.clone());
        info!("scenario #{} '{}' started", index + 1, scenario.description);

        let mut data = ScenarioRunnerData::new();
        let mut each = EachTestNotifier::new(notifier, child);
        each.fire_test_started();

        let pipeline = run_pipeline(
            session,
            &self.descriptor,
            resolved,
            scenario,
            evaluator,
            &self.selection,
            &mut data,
            &mut each,
        );
        let passed = match AssertUnwindSafe(pipeline).catch_unwind().await {
            Ok(Ok(passed)) => passed,
            Ok(Err(Error::Scenario(e))) => {
                warn!("scenario '{}' failed: {}", scenario.description, e);
                each.add_failure(&e);
                false
            }
            Ok(Err(e)) => {
                warn!("scenario '{}' raised an unexpected error: {}", scenario.description, e);
                each.add_failure(&ScenarioError::unexpected(&scenario.description, e));
                false
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!("scenario '{}' panicked: {}", scenario.description, message);
                each.add_failure(&ScenarioError::unexpected(&scenario.description, message));
                false
            }
        };
        let passed = passed && !each.has_failed();
        let failure = each.fire_test_finished();
        info!(
            "scenario #{} '{}' finished: {}",
            index + 1,
            scenario.description,
            if passed { "passed" } else { "failed" }
        );

        ScenarioOutcome {
            index,
            description: scenario.description.clone(),
            passed,
            results: data.into_results(),
            failure,
        }
    }
}

async fn dispose(session: &mut dyn RuleSession) {
    if let Err(e) = session.dispose().await {
        warn!("failed to dispose rule session: {}", e);
    }
}

fn extraction_values<T>(extraction: Extraction<T>, errors: &mut Vec<ValueExtractionError>) -> Vec<T> {
    errors.extend(extraction.errors);
    extraction.values
}

/// Layout check, extraction, execution, verification, aggregation.
#[allow(clippy::too_many_arguments)]
async fn run_pipeline(
    session: &mut dyn RuleSession,
    descriptor: &SimulationDescriptor,
    resolved: &ResolvedDescriptor,
    scenario: &Scenario,
    evaluator: &dyn ExpressionEvaluator,
    selection: &CandidateSelection,
    data: &mut ScenarioRunnerData,
    notifier: &mut EachTestNotifier<'_>,
) -> InternalResult<bool> {
    let layout: Vec<ValueExtractionError> = scenario
        .check_layout(descriptor)
        .into_iter()
        .map(ValueExtractionError::from)
        .collect();
    if !layout.is_empty() {
        return Err(ScenarioError::Extraction(layout).into());
    }

    let cells = &scenario.fact_mapping_values;
    let mut errors = Vec::new();
    let given = extraction_values(extract_given_values(resolved, cells, evaluator), &mut errors);
    let expected = extraction_values(extract_expected_values(resolved, cells, evaluator), &mut errors);
    if !errors.is_empty() {
        return Err(ScenarioError::Extraction(errors).into());
    }
    debug!(
        "{} given fact(s), {} expected fact(s)",
        given.len(),
        expected.len()
    );
    given.into_iter().for_each(|input| data.add_input(input));
    expected.into_iter().for_each(|output| data.add_output(output));

    execute_scenario(session, data)
        .await
        .map_err(ScenarioError::from)?;
    verify_conditions(session, data, evaluator, selection).await?;
    Ok(validate_assertion(data.results(), scenario, notifier))
}
