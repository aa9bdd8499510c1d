use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::data::{ExpectedCheck, MismatchKind, ScenarioResult, ScenarioRunnerData};
use super::error::{panic_message, VerificationError};
use crate::eval::{EvaluationContext, ExpectedValue, ExpressionEvaluator};
use crate::model::FactIdentifier;
use crate::session::{Fact, FactEntry, FactHandle, ObjectFilter, RuleSession};

/// How the fact an expectation is checked against is chosen when several
/// facts of the same type are in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum CandidatePolicy {
    /// The most recently inserted candidate.
    #[default]
    MostRecent,
    /// The first inserted candidate.
    First,
    /// Holds when at least one candidate satisfies the expectation.
    AnyMatch,
    /// Holds only when every candidate satisfies the expectation.
    AllMatch,
}

/// Explicit choice of the candidate for one fact identifier.
pub trait FactLocator: Send + Sync {
    /// Index into `candidates` of the fact to check, or `None` when no
    /// candidate qualifies. `inserted` is the handle the identifier was
    /// inserted under, if it was given.
    fn locate(
        &self,
        fact_identifier: &FactIdentifier,
        candidates: &[FactEntry],
        inserted: Option<FactHandle>,
    ) -> Option<usize>;
}

impl<F> FactLocator for F
where
    F: Fn(&FactIdentifier, &[FactEntry], Option<FactHandle>) -> Option<usize> + Send + Sync,
{
    fn locate(
        &self,
        fact_identifier: &FactIdentifier,
        candidates: &[FactEntry],
        inserted: Option<FactHandle>,
    ) -> Option<usize> {
        self(fact_identifier, candidates, inserted)
    }
}

/// Checks the very fact that was inserted for the identifier. Useful when
/// several aliased facts share a type.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertedFactLocator;

impl FactLocator for InsertedFactLocator {
    fn locate(
        &self,
        _fact_identifier: &FactIdentifier,
        candidates: &[FactEntry],
        inserted: Option<FactHandle>,
    ) -> Option<usize> {
        let handle = inserted?;
        candidates.iter().position(|entry| entry.handle == handle)
    }
}

/// Candidate policy plus per identifier locator overrides.
#[derive(Clone, Default)]
pub struct CandidateSelection {
    pub policy: CandidatePolicy,
    locators: HashMap<FactIdentifier, Arc<dyn FactLocator>>,
}

impl std::fmt::Debug for CandidateSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateSelection")
            .field("policy", &self.policy)
            .field("locators", &self.locators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CandidateSelection {
    pub fn new(policy: CandidatePolicy) -> Self {
        Self {
            policy,
            locators: HashMap::new(),
        }
    }

    pub fn with_locator(mut self, fact_identifier: FactIdentifier, locator: Arc<dyn FactLocator>) -> Self {
        self.locators.insert(fact_identifier, locator);
        self
    }

    pub fn set_locator(&mut self, fact_identifier: FactIdentifier, locator: Arc<dyn FactLocator>) {
        self.locators.insert(fact_identifier, locator);
    }

    fn select<'c>(
        &self,
        fact_identifier: &FactIdentifier,
        candidates: &'c [FactEntry],
        inserted: Option<FactHandle>,
    ) -> Candidates<'c> {
        if let Some(locator) = self.locators.get(fact_identifier) {
            return match locator
                .locate(fact_identifier, candidates, inserted)
                .and_then(|index| candidates.get(index))
            {
                Some(entry) => Candidates::One(entry),
                None => Candidates::Missing,
            };
        }
        if candidates.is_empty() {
            return Candidates::Missing;
        }
        match self.policy {
            CandidatePolicy::MostRecent => candidates
                .last()
                .map_or(Candidates::Missing, Candidates::One),
            CandidatePolicy::First => candidates
                .first()
                .map_or(Candidates::Missing, Candidates::One),
            CandidatePolicy::AnyMatch => Candidates::Any(candidates),
            CandidatePolicy::AllMatch => Candidates::All(candidates),
        }
    }
}

enum Candidates<'c> {
    Missing,
    One(&'c FactEntry),
    Any(&'c [FactEntry]),
    All(&'c [FactEntry]),
}

type CheckOutcome = Result<(), MismatchKind>;
type Checker<'a> = Box<dyn Fn(&Fact) -> CheckOutcome + 'a>;

/// Binds a fact type to the check of one EXPECTED cell and the result it
/// produces. Lives for a single verification pass.
pub struct FactCheckerHandle<'a> {
    fact_type: String,
    checker: Checker<'a>,
    result: ScenarioResult,
}

impl<'a> FactCheckerHandle<'a> {
    pub fn new(check: &'a ExpectedCheck, evaluator: &'a dyn ExpressionEvaluator) -> Self {
        Self {
            fact_type: check.field.fact_type.clone(),
            checker: Box::new(move |fact| check_fact(check, fact, evaluator)),
            result: ScenarioResult::new(check),
        }
    }

    pub fn fact_type(&self) -> &str {
        &self.fact_type
    }

    /// Runs the check on one fact. A panic inside the check is reported as
    /// a hard evaluation failure of this cell.
    pub fn check(&self, fact: &Fact) -> CheckOutcome {
        catch_unwind(AssertUnwindSafe(|| (self.checker)(fact))).unwrap_or_else(|payload| {
            Err(MismatchKind::EvaluationFailed {
                message: panic_message(payload.as_ref()),
            })
        })
    }

    fn apply(mut self, candidates: Candidates<'_>) -> ScenarioResult {
        let (checked, outcome) = match candidates {
            Candidates::Missing => (None, Err(MismatchKind::MissingFact)),
            Candidates::One(entry) => (Some(entry.handle), self.check(&entry.fact)),
            Candidates::Any(entries) => {
                let mut last = (None, Err(MismatchKind::MissingFact));
                for entry in entries {
                    let outcome = self.check(&entry.fact);
                    let matched = outcome.is_ok();
                    last = (Some(entry.handle), outcome);
                    if matched {
                        break;
                    }
                }
                last
            }
            Candidates::All(entries) => entries
                .iter()
                .map(|entry| (Some(entry.handle), self.check(&entry.fact)))
                .find(|(_, outcome)| outcome.is_err())
                .unwrap_or_else(|| (entries.last().map(|entry| entry.handle), Ok(()))),
        };
        self.result.checked_fact = checked;
        match outcome {
            Ok(()) => self.result.set_matched(),
            Err(kind) => self.result.set_mismatch(kind),
        }
        self.result
    }
}

fn check_fact(check: &ExpectedCheck, fact: &Fact, evaluator: &dyn ExpressionEvaluator) -> CheckOutcome {
    let actual = fact.value.navigate(&check.field.segments);
    match (&check.expected, actual) {
        (ExpectedValue::Absent, _) => Ok(()),
        (ExpectedValue::ExpectError, Err(_)) => Ok(()),
        (ExpectedValue::ExpectError, Ok(actual)) => Err(MismatchKind::UnexpectedValue {
            actual: actual.clone(),
        }),
        (_, Err(e)) => Err(MismatchKind::ExtractionFailed {
            message: e.to_string(),
        }),
        (ExpectedValue::Literal(expected), Ok(actual)) => {
            if expected.structural_eq(actual) {
                Ok(())
            } else {
                Err(MismatchKind::ValueDiffers {
                    actual: actual.clone(),
                })
            }
        }
        (ExpectedValue::Condition(expression), Ok(actual)) => {
            let context = EvaluationContext::new(&check.field.fact_type, &check.field.logical_path);
            match evaluator.matches(expression, actual, &check.field.value_type, &context) {
                Ok(true) => Ok(()),
                Ok(false) => Err(MismatchKind::ValueDiffers {
                    actual: actual.clone(),
                }),
                Err(e) => Err(MismatchKind::EvaluationFailed {
                    message: e.to_string(),
                }),
            }
        }
    }
}

/// Checks every expectation of `data` against the post-execution session
/// and records exactly one result per EXPECTED cell. A failing check only
/// affects its own result; reading the session is the only error that
/// aborts verification.
#[tracing::instrument(skip_all, fields(outputs = data.outputs().len(), policy = %selection.policy))]
pub async fn verify_conditions(
    session: &dyn RuleSession,
    data: &mut ScenarioRunnerData,
    evaluator: &dyn ExpressionEvaluator,
    selection: &CandidateSelection,
) -> Result<(), VerificationError> {
    let outputs = data.outputs().to_vec();
    for expect in &outputs {
        let fact_type = &expect.fact_identifier.class_name;
        let candidates = session
            .get_objects(&ObjectFilter::by_type(fact_type))
            .await
            .map_err(|source| VerificationError::SessionRead {
                fact_type: fact_type.clone(),
                source,
            })?;
        let inserted = data.handle_of(&expect.fact_identifier);
        debug!(
            "{} candidate(s) for {} ({} check(s))",
            candidates.len(),
            expect.fact_identifier,
            expect.checks.len()
        );

        for check in &expect.checks {
            let handle = FactCheckerHandle::new(check, evaluator);
            let selected = selection.select(&expect.fact_identifier, &candidates, inserted);
            let result = handle.apply(selected);
            match result.mismatch() {
                None => debug!("{} matched", result.label),
                Some(kind) => debug!(
                    "{} mismatched: expected {}, actual {}",
                    result.label,
                    result.expected,
                    kind.describe_actual()
                ),
            }
            data.add_result(result);
        }
    }
    Ok(())
}
