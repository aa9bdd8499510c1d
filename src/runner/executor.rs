use tracing::debug;

use super::data::ScenarioRunnerData;
use super::error::ScenarioExecutionError;
use crate::session::{Fact, RuleSession};

/// Inserts every given fact under its declared type, then fires all rules.
/// The session is left in its post-evaluation state for verification.
#[tracing::instrument(skip_all, fields(inputs = data.inputs().len()))]
pub async fn execute_scenario(
    session: &mut dyn RuleSession,
    data: &mut ScenarioRunnerData,
) -> Result<(), ScenarioExecutionError> {
    let inputs = data.inputs().to_vec();
    for input in inputs {
        let fact = Fact::new(&input.fact_identifier.class_name, input.value);
        let handle = session
            .insert(fact)
            .await
            .map_err(|source| ScenarioExecutionError::Insert {
                fact: input.fact_identifier.clone(),
                source,
            })?;
        debug!("inserted {} as {}", input.fact_identifier, handle);
        data.record_insertion(input.fact_identifier, handle);
    }

    let fired = session
        .fire_all_rules()
        .await
        .map_err(ScenarioExecutionError::FireAllRules)?;
    debug!("{} rule firing(s)", fired);
    data.set_fired_rules(fired);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Value;
    use crate::model::FactIdentifier;
    use crate::runner::data::ScenarioGiven;
    use crate::session::{FactHandle, MockRuleSession, SessionError};
    use mockall::predicate::*;

    fn data_with_person() -> ScenarioRunnerData {
        let mut data = ScenarioRunnerData::new();
        data.add_input(ScenarioGiven {
            fact_identifier: FactIdentifier::of_type("Person"),
            value: Value::object(),
        });
        data
    }

    #[tokio::test]
    async fn test_execute_inserts_then_fires() {
        let mut session = MockRuleSession::new();
        let mut seq = mockall::Sequence::new();
        session
            .expect_insert()
            .with(function(|fact: &Fact| fact.fact_type == "Person"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(FactHandle(7)));
        session
            .expect_fire_all_rules()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(3));

        let mut data = data_with_person();
        execute_scenario(&mut session, &mut data).await.unwrap();

        assert_eq!(
            data.handle_of(&FactIdentifier::of_type("Person")),
            Some(FactHandle(7))
        );
        assert_eq!(data.fired_rules(), 3);
    }

    #[tokio::test]
    async fn test_insert_failure_aborts_before_firing() {
        let mut session = MockRuleSession::new();
        session.expect_insert().returning(|_| {
            Err(SessionError::InsertFailed {
                fact_type: "Person".to_string(),
                message: "rejected".to_string(),
            })
        });
        session.expect_fire_all_rules().never();

        let mut data = data_with_person();
        let result = execute_scenario(&mut session, &mut data).await;
        assert!(matches!(
            result,
            Err(ScenarioExecutionError::Insert { .. })
        ));
    }
}
