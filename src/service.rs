use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::RunnerConfig;
use crate::eval::{BaseEvaluatorProvider, EvaluatorProvider, Value};
use crate::model::{FactMappingValueStatus, Scenario, ScenarioSimulationModel};
use crate::runner::{
    Failure, MismatchKind, RecordingNotifier, ResultState, RunReport, RunResult, ScenarioOutcome,
    ScenarioRunner,
};
use crate::session::SessionProvider;

/// Summary of one run, stored on the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResultMessage {
    pub run_id: Uuid,
    pub identifier: String,
    pub document_path: String,
    pub started_at: DateTime<Utc>,
    pub run_count: usize,
    pub failure_count: usize,
    pub run_time_ms: u64,
    #[serde(default)]
    pub failures: Vec<Failure>,
}

impl TestResultMessage {
    pub fn passed(&self) -> bool {
        self.failure_count == 0
    }
}

/// Runs simulation models and writes the outcome back onto them.
pub struct ScenarioRunnerService {
    session_provider: Arc<dyn SessionProvider>,
    evaluator_provider: Arc<dyn EvaluatorProvider>,
    config: RunnerConfig,
}

impl ScenarioRunnerService {
    pub fn new(session_provider: Arc<dyn SessionProvider>, config: RunnerConfig) -> Self {
        Self {
            session_provider,
            evaluator_provider: Arc::new(BaseEvaluatorProvider),
            config,
        }
    }

    pub fn with_evaluator_provider(mut self, evaluator_provider: Arc<dyn EvaluatorProvider>) -> Self {
        self.evaluator_provider = evaluator_provider;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs every scenario of `model`. The returned model carries the status
    /// of each EXPECTED cell and a [`TestResultMessage`] for the run.
    #[tracing::instrument(skip(self, model), fields(path = %path.display()))]
    pub async fn run_test(
        &self,
        identifier: &str,
        path: &Path,
        model: ScenarioSimulationModel,
    ) -> RunResult<ScenarioSimulationModel> {
        self.run_test_with_report(identifier, path, model)
            .await
            .map(|(model, _)| model)
    }

    /// Same as [`run_test`](Self::run_test), also returning the run report.
    pub async fn run_test_with_report(
        &self,
        identifier: &str,
        path: &Path,
        mut model: ScenarioSimulationModel,
    ) -> RunResult<(ScenarioSimulationModel, RunReport)> {
        model
            .simulation
            .scenarios
            .iter_mut()
            .for_each(Scenario::reset_statuses);

        let started_at = Utc::now();
        let clock = Instant::now();
        let mut runner = ScenarioRunner::new(
            self.session_provider.clone(),
            self.evaluator_provider.clone(),
            model.simulation.clone(),
            self.config.clone(),
        );
        let mut notifier = RecordingNotifier::new();
        let report = runner.run(&mut notifier).await?;
        let run_time_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

        for outcome in &report.outcomes {
            if let Some(scenario) = model.simulation.scenarios.get_mut(outcome.index) {
                write_back(scenario, outcome);
            }
        }
        let message = TestResultMessage {
            run_id: Uuid::new_v4(),
            identifier: identifier.to_string(),
            document_path: path.display().to_string(),
            started_at,
            run_count: report.run_count(),
            failure_count: report.failure_count(),
            run_time_ms,
            failures: notifier.into_failures(),
        };
        info!(
            "run {} of '{}': {} scenario(s), {} failure(s) in {}ms",
            message.run_id, identifier, message.run_count, message.failure_count, run_time_ms
        );
        model.last_run = Some(message);
        Ok((model, report))
    }
}

fn error_value(kind: &MismatchKind) -> Option<Value> {
    match kind {
        MismatchKind::ValueDiffers { actual } | MismatchKind::UnexpectedValue { actual } => {
            Some(actual.clone())
        }
        MismatchKind::ExtractionFailed { message } | MismatchKind::EvaluationFailed { message } => {
            Some(Value::Error(message.clone()))
        }
        MismatchKind::MissingFact => None,
    }
}

/// Only EXPECTED cells have results, so GIVEN cells keep their status.
fn write_back(scenario: &mut Scenario, outcome: &ScenarioOutcome) {
    for result in &outcome.results {
        let Some(cell) = scenario.cell_mut(result.column_index()) else {
            continue;
        };
        match result.state() {
            ResultState::NotEvaluated => {}
            ResultState::Matched => cell.status = FactMappingValueStatus::Success,
            ResultState::Mismatched(kind) => {
                cell.status = FactMappingValueStatus::FailedWithError;
                cell.error_value = error_value(kind);
            }
        }
    }
}
