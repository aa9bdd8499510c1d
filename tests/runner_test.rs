mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::*;
use pretty_assertions::assert_eq;
use scesim::config::{RunnerConfig, SessionIsolation};
use scesim::eval::{BaseEvaluatorProvider, Value};
use scesim::model::{
    CellValue, FactIdentifier, FactMapping, FactMappingType, Scenario, Simulation,
    SimulationDescriptor,
};
use scesim::runner::{
    CandidatePolicy, FailureKind, InsertedFactLocator, MismatchKind, RecordingNotifier, ResultState,
    RunError, RunnerState, ScenarioRunner,
};
use scesim::session::{
    Fact, FactEntry, FactHandle, InMemorySession, MockSessionProvider, ObjectFilter, RuleSession,
    SessionError, SessionProvider, SessionResult,
};

fn runner(simulation: Simulation) -> ScenarioRunner {
    runner_with(provider(), simulation, runner_config())
}

fn runner_with(
    provider: Arc<dyn SessionProvider>,
    simulation: Simulation,
    config: RunnerConfig,
) -> ScenarioRunner {
    ScenarioRunner::new(provider, Arc::new(BaseEvaluatorProvider), simulation, config)
}

#[tokio::test]
async fn test_adult_scenario_passes() {
    let mut runner = runner(simulation(vec![adult()]));
    let mut notifier = RecordingNotifier::new();

    let report = runner.run(&mut notifier).await.unwrap();

    assert!(report.passed());
    assert_eq!(report.outcomes[0].results.len(), 1);
    assert!(report.outcomes[0].results[0].is_matched());
    assert!(notifier.failures().is_empty());
    assert_eq!(runner.state(), RunnerState::Finished { passed: 1, failed: 0 });
}

#[tokio::test]
async fn test_rule_defect_reports_single_mismatch() {
    let mut runner = runner(simulation(vec![minor_expected_adult()]));
    let mut notifier = RecordingNotifier::new();

    let report = runner.run(&mut notifier).await.unwrap();

    assert!(!report.passed());
    let failures = notifier.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, FailureKind::Assertion);
    assert_eq!(failures[0].mismatches.len(), 1);
    let mismatch = &failures[0].mismatches[0];
    assert_eq!(mismatch.column_index, IS_ADULT);
    assert_eq!(mismatch.expected, "true");
    assert_eq!(mismatch.actual(), "false");
    assert!(report.to_string().contains("Person.isAdult: expected true, actual false"));
}

#[tokio::test]
async fn test_fact_inserted_by_rules_is_verified() {
    let mut runner = runner(simulation(vec![senior()]));
    let report = runner.run(&mut RecordingNotifier::new()).await.unwrap();

    assert!(report.passed(), "{}", report);
    assert_eq!(report.outcomes[0].results.len(), 2);
}

#[tokio::test]
async fn test_missing_fact_is_its_own_result_kind() {
    let scenario = scenario(
        "no discount for adults",
        &[(AGE, expr("30")), (DISCOUNT_RATE, expr("0.2"))],
    );
    let mut runner = runner(simulation(vec![scenario]));

    let report = runner.run(&mut RecordingNotifier::new()).await.unwrap();

    let results = &report.outcomes[0].results;
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].state(),
        &ResultState::Mismatched(MismatchKind::MissingFact)
    );
}

#[tokio::test]
async fn test_expect_error_matches_failing_field() {
    let failing = scenario(
        "newborn score fails",
        &[(AGE, expr("0")), (SCORE, CellValue::ExpectError)],
    );
    let unset = scenario(
        "name never set",
        &[(AGE, expr("30")), (NAME, CellValue::ExpectError)],
    );
    let set = scenario(
        "adult flag is set",
        &[(AGE, expr("30")), (IS_ADULT, CellValue::ExpectError)],
    );

    let report = runner(simulation(vec![failing, unset, set]))
        .run(&mut RecordingNotifier::new())
        .await
        .unwrap();

    assert!(report.outcomes[0].passed, "{}", report);
    assert_eq!(
        report.outcomes[1].results[0].mismatch(),
        Some(&MismatchKind::UnexpectedValue { actual: Value::Null })
    );
    assert_eq!(
        report.outcomes[2].results[0].mismatch(),
        Some(&MismatchKind::UnexpectedValue {
            actual: Value::Boolean(true)
        })
    );
}

#[tokio::test]
async fn test_expected_null_matches_unset_field() {
    let null = CellValue::Raw(serde_json::Value::Null);
    let unset = scenario(
        "name and score unset",
        &[(AGE, expr("30")), (NAME, null.clone()), (SCORE, expr("null"))],
    );
    let failing = scenario("score failed", &[(AGE, expr("0")), (SCORE, null)]);

    let report = runner(simulation(vec![unset, failing]))
        .run(&mut RecordingNotifier::new())
        .await
        .unwrap();

    assert!(report.outcomes[0].passed, "{}", report);
    assert_eq!(report.outcomes[0].results.len(), 2);
    assert!(matches!(
        report.outcomes[1].results[0].mismatch(),
        Some(MismatchKind::ExtractionFailed { .. })
    ));
}

#[tokio::test]
async fn test_not_expressed_given_in_unknown_column_is_ignored() {
    let person = FactIdentifier::of_type("Person");
    let descriptor = SimulationDescriptor::new()
        .with_mapping(FactMapping::new(0, person.clone(), FactMappingType::Given, "age"))
        .with_mapping(FactMapping::new(1, person.clone(), FactMappingType::Given, "height"))
        .with_mapping(FactMapping::new(2, person, FactMappingType::Expected, "isAdult"));
    let row = Scenario::new("height left empty")
        .with_cell(0, expr("30"))
        .with_cell(1, CellValue::NotExpressed)
        .with_cell(2, expr("true"));

    let report = runner(Simulation::new(descriptor).with_scenario(row))
        .run(&mut RecordingNotifier::new())
        .await
        .unwrap();

    assert!(report.passed(), "{}", report);
}

#[tokio::test]
async fn test_not_expressed_cells_produce_no_result() {
    let mut runner = runner(simulation(vec![scenario("only given", &[(AGE, expr("30"))])]));

    let report = runner.run(&mut RecordingNotifier::new()).await.unwrap();

    assert!(report.passed());
    assert!(report.outcomes[0].results.is_empty());
}

#[tokio::test]
async fn test_execution_error_is_isolated() {
    let mut runner = runner(simulation(vec![adult(), runaway(), senior()]));
    let mut notifier = RecordingNotifier::new();

    let report = runner.run(&mut notifier).await.unwrap();

    let passed: Vec<bool> = report.outcomes.iter().map(|o| o.passed).collect();
    assert_eq!(passed, vec![true, false, true]);
    let failure = report.outcomes[1].failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Execution);
    assert!(failure.message.contains(&FIRING_LIMIT.to_string()));
    assert_eq!(notifier.started_count(), 3);
    assert_eq!(notifier.finished_count(), 3);
}

#[tokio::test]
async fn test_firing_limit_comes_from_config() {
    let config = RunnerConfig {
        max_rule_firings: 7,
        ..runner_config()
    };
    let mut runner = runner_with(provider(), simulation(vec![runaway()]), config);

    let report = runner.run(&mut RecordingNotifier::new()).await.unwrap();

    let failure = report.outcomes[0].failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Execution);
    assert!(failure.message.contains("within 7 firings"), "{}", failure.message);
}

#[tokio::test]
async fn test_extraction_failure_leaves_expectations_unevaluated() {
    let scenario = scenario(
        "bad input",
        &[(AGE, expr("thirty")), (IS_ADULT, expr("maybe"))],
    );
    let mut runner = runner(simulation(vec![scenario, adult()]));

    let report = runner.run(&mut RecordingNotifier::new()).await.unwrap();

    let failure = report.outcomes[0].failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Extraction);
    assert!(failure.message.contains("Column 0"));
    assert!(report.outcomes[0].results.is_empty());
    assert!(report.outcomes[1].passed);
}

#[tokio::test]
async fn test_layout_problems_fail_the_scenario() {
    let broken = Scenario::new("missing cells").with_cell(AGE, expr("30"));
    let mut runner = runner(simulation(vec![broken]));

    let report = runner.run(&mut RecordingNotifier::new()).await.unwrap();

    let failure = report.outcomes[0].failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Extraction);
    assert!(failure.message.contains("No cell for column 1"));
}

#[tokio::test]
async fn test_all_mismatches_reported_together() {
    let scenario = scenario(
        "everything wrong",
        &[
            (AGE, expr("12")),
            (IS_ADULT, expr("true")),
            (DISCOUNT_RATE, expr("0.2")),
            (NAME, expr("Ann")),
        ],
    );
    let mut runner = runner(simulation(vec![scenario]));
    let mut notifier = RecordingNotifier::new();

    runner.run(&mut notifier).await.unwrap();

    let failures = notifier.failures();
    assert_eq!(failures.len(), 1);
    let columns: Vec<usize> = failures[0].mismatches.iter().map(|m| m.column_index).collect();
    assert_eq!(columns, vec![IS_ADULT, DISCOUNT_RATE, NAME]);
    assert!(!failures[0].mismatches[2].is_error());
    assert_eq!(failures[0].mismatches[2].actual(), "null");
}

#[tokio::test]
async fn test_description_tree_grows_per_scenario() {
    let mut runner = runner(simulation(vec![adult(), minor_expected_adult()]));
    assert!(runner.description().children().is_empty());
    assert_eq!(runner.state(), RunnerState::NotStarted);

    let report = runner.run(&mut RecordingNotifier::new()).await.unwrap();

    let description = runner.description();
    assert!(description.is_suite());
    assert_eq!(description.display_name(), "Test Scenarios (Preview) tests");
    let names: Vec<&str> = description.children().iter().map(|c| c.display_name()).collect();
    assert_eq!(names, vec!["adult", "minor"]);
    assert_eq!(report.description.test_count(), 2);

    // A second run starts from a fresh tree.
    runner.run(&mut RecordingNotifier::new()).await.unwrap();
    assert_eq!(runner.description().test_count(), 2);
}

#[tokio::test]
async fn test_runs_are_deterministic() {
    let scenarios = vec![adult(), minor_expected_adult(), runaway(), senior()];
    let first = runner(simulation(scenarios.clone()))
        .run(&mut RecordingNotifier::new())
        .await
        .unwrap();
    let second = runner(simulation(scenarios))
        .run(&mut RecordingNotifier::new())
        .await
        .unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_session_unavailable_is_fatal() {
    let mut provider = MockSessionProvider::new();
    provider
        .expect_type_registry()
        .returning(|| Arc::new(registry()));
    provider
        .expect_acquire()
        .times(1)
        .returning(|| Err(SessionError::Unavailable("no container".to_string())));
    let mut runner = runner_with(
        Arc::new(provider),
        simulation(vec![adult(), senior()]),
        runner_config(),
    );
    let mut notifier = RecordingNotifier::new();

    let result = runner.run(&mut notifier).await;

    assert_eq!(
        result.err(),
        Some(RunError::SessionUnavailable(SessionError::Unavailable(
            "no container".to_string()
        )))
    );
    assert!(notifier.events().is_empty());
    assert_eq!(runner.state(), RunnerState::Aborted);
}

#[tokio::test]
async fn test_invalid_descriptor_is_fatal() {
    let person = FactIdentifier::of_type("Person");
    let descriptor = SimulationDescriptor::new()
        .with_mapping(FactMapping::new(0, person.clone(), FactMappingType::Given, "age"))
        .with_mapping(FactMapping::new(0, person, FactMappingType::Expected, "isAdult"));
    let mut runner = runner(Simulation::new(descriptor).with_scenario(Scenario::new("s")));

    let result = runner.run(&mut RecordingNotifier::new()).await;
    assert!(matches!(result, Err(RunError::InvalidDescriptor(_))));
}

#[tokio::test]
async fn test_per_run_isolation_shares_one_session() {
    let mut provider = MockSessionProvider::new();
    provider
        .expect_type_registry()
        .returning(|| Arc::new(registry()));
    provider.expect_acquire().times(1).returning(|| {
        Ok(Box::new(InMemorySession::new(Arc::new(rules()), FIRING_LIMIT)) as Box<dyn RuleSession>)
    });
    let config = RunnerConfig {
        session_isolation: SessionIsolation::PerRun,
        ..runner_config()
    };
    let mut runner = runner_with(
        Arc::new(provider),
        simulation(vec![adult(), minor_expected_adult(), adult()]),
        config,
    );

    let report = runner.run(&mut RecordingNotifier::new()).await.unwrap();

    let passed: Vec<bool> = report.outcomes.iter().map(|o| o.passed).collect();
    assert_eq!(passed, vec![true, false, true]);
    let checked: Vec<Option<FactHandle>> = report
        .outcomes
        .iter()
        .map(|o| o.results[0].checked_fact)
        .collect();
    assert_eq!(
        checked,
        vec![Some(FactHandle(1)), Some(FactHandle(2)), Some(FactHandle(3))]
    );
}

#[tokio::test]
async fn test_candidate_policy_from_config() {
    let config = RunnerConfig {
        session_isolation: SessionIsolation::PerRun,
        candidate_policy: CandidatePolicy::First,
        ..runner_config()
    };
    let mut runner = runner_with(
        provider(),
        simulation(vec![adult(), minor_expected_adult()]),
        config,
    );

    let report = runner.run(&mut RecordingNotifier::new()).await.unwrap();

    // The minor's expectation is checked against the first Person, the adult.
    assert!(report.passed());
    assert_eq!(report.outcomes[1].results[0].checked_fact, Some(FactHandle(1)));
}

#[tokio::test]
async fn test_aliased_facts_with_inserted_locator() {
    let registry = registry();
    let applicant = FactIdentifier::new("applicant", "Person");
    let spouse = FactIdentifier::new("spouse", "Person");
    let descriptor = SimulationDescriptor::new()
        .with_mapping(FactMapping::new(0, applicant.clone(), FactMappingType::Given, "age"))
        .with_mapping(FactMapping::new(1, spouse.clone(), FactMappingType::Given, "age"))
        .with_mapping(FactMapping::new(2, applicant.clone(), FactMappingType::Expected, "isAdult"))
        .with_mapping(FactMapping::new(3, spouse.clone(), FactMappingType::Expected, "isAdult"));
    let scenario = Scenario::new("couple")
        .with_cell(0, expr("40"))
        .with_cell(1, expr("16"))
        .with_cell(2, expr("true"))
        .with_cell(3, expr("false"));
    let provider = Arc::new(scesim::session::InMemorySessionProvider::new(registry, rules()));
    let simulation = Simulation::new(descriptor).with_scenario(scenario);

    let mut runner = runner_with(provider, simulation, runner_config())
        .with_locator(applicant, Arc::new(InsertedFactLocator))
        .with_locator(spouse, Arc::new(InsertedFactLocator));
    let report = runner.run(&mut RecordingNotifier::new()).await.unwrap();

    assert!(report.passed(), "{}", report);
}

struct PanickingSession;

#[async_trait]
impl RuleSession for PanickingSession {
    async fn insert(&mut self, _fact: Fact) -> SessionResult<FactHandle> {
        Ok(FactHandle(1))
    }

    async fn fire_all_rules(&mut self) -> SessionResult<usize> {
        panic!("engine crashed")
    }

    async fn get_objects(&self, _filter: &ObjectFilter) -> SessionResult<Vec<FactEntry>> {
        Ok(Vec::new())
    }

    async fn dispose(&mut self) -> SessionResult<()> {
        Ok(())
    }
}

struct PanickingProvider;

#[async_trait]
impl SessionProvider for PanickingProvider {
    async fn acquire(&self) -> SessionResult<Box<dyn RuleSession>> {
        Ok(Box::new(PanickingSession))
    }

    fn type_registry(&self) -> Arc<scesim::types::TypeRegistry> {
        Arc::new(registry())
    }
}

#[tokio::test]
async fn test_panic_becomes_unexpected_failure() {
    let mut runner = runner_with(
        Arc::new(PanickingProvider),
        simulation(vec![adult(), adult()]),
        runner_config(),
    );
    let mut notifier = RecordingNotifier::new();

    let report = runner.run(&mut notifier).await.unwrap();

    assert_eq!(report.failure_count(), 2);
    let failures = notifier.failures();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].kind, FailureKind::Unexpected);
    assert!(failures[0].message.contains("Unexpected test error in scenario 'adult'"));
    assert!(failures[0].message.contains("engine crashed"));
    assert_eq!(notifier.finished_count(), 2);
}
