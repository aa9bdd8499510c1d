#![allow(dead_code)]

use std::sync::Arc;

use scesim::config::RunnerConfig;
use scesim::eval::Value;
use scesim::model::{
    CellValue, FactIdentifier, FactMapping, FactMappingType, Scenario, Simulation,
    SimulationDescriptor,
};
use scesim::session::{Fact, InMemorySessionProvider, Rule};
use scesim::types::{FactSchema, TypeRegistry, ValueType};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

pub const AGE: usize = 0;
pub const IS_ADULT: usize = 1;
pub const DISCOUNT_RATE: usize = 2;
pub const COUNTER: usize = 3;
pub const NAME: usize = 4;
pub const SCORE: usize = 5;

pub const FIRING_LIMIT: usize = 50;

pub fn registry() -> TypeRegistry {
    TypeRegistry::new()
        .with_type(
            "Person",
            FactSchema::new()
                .with_value_field("age", ValueType::Integer)
                .with_value_field("isAdult", ValueType::Boolean)
                .with_value_field("name", ValueType::String)
                .with_value_field("score", ValueType::Float),
        )
        .with_type(
            "Discount",
            FactSchema::new().with_value_field("rate", ValueType::Float),
        )
        .with_type(
            "Counter",
            FactSchema::new().with_value_field("value", ValueType::Integer),
        )
}

fn age_of(fact: &Fact) -> i64 {
    match fact.field("age") {
        Some(Value::Integer(age)) => *age,
        _ => 0,
    }
}

/// `isAdult` from the age, a discount for seniors, a score that fails for
/// newborns, and a rule that never reaches a fixpoint on counters.
pub fn rules() -> Vec<Rule> {
    vec![
        Rule::new(
            "classify adult",
            "Person",
            |fact| fact.field("isAdult").is_none(),
            |fact, _| {
                let adult = age_of(fact) >= 18;
                fact.set_field("isAdult", Value::Boolean(adult));
            },
        ),
        Rule::new(
            "senior discount",
            "Person",
            |fact| age_of(fact) >= 65 && fact.field("discounted").is_none(),
            |fact, inserts| {
                fact.set_field("discounted", Value::Boolean(true));
                let mut discount = Fact::new("Discount", Value::object());
                discount.set_field("rate", Value::Float(0.2));
                inserts.push(discount);
            },
        )
        .with_salience(10),
        Rule::new(
            "newborn score",
            "Person",
            |fact| {
                matches!(fact.field("age"), Some(Value::Integer(0))) && fact.field("score").is_none()
            },
            |fact, _| {
                fact.set_field("score", Value::Error("division by zero".to_string()));
            },
        ),
        Rule::new(
            "runaway counter",
            "Counter",
            |_| true,
            |fact, _| {
                let next = match fact.field("value") {
                    Some(Value::Integer(value)) => value + 1,
                    _ => 0,
                };
                fact.set_field("value", Value::Integer(next));
            },
        ),
    ]
}

pub fn provider() -> Arc<InMemorySessionProvider> {
    Arc::new(InMemorySessionProvider::new(registry(), rules()))
}

pub fn runner_config() -> RunnerConfig {
    RunnerConfig {
        max_rule_firings: FIRING_LIMIT,
        ..RunnerConfig::default()
    }
}

pub fn descriptor() -> SimulationDescriptor {
    let person = FactIdentifier::of_type("Person");
    SimulationDescriptor::new()
        .with_mapping(FactMapping::new(AGE, person.clone(), FactMappingType::Given, "age"))
        .with_mapping(FactMapping::new(
            IS_ADULT,
            person.clone(),
            FactMappingType::Expected,
            "isAdult",
        ))
        .with_mapping(FactMapping::new(
            DISCOUNT_RATE,
            FactIdentifier::of_type("Discount"),
            FactMappingType::Expected,
            "rate",
        ))
        .with_mapping(FactMapping::new(
            COUNTER,
            FactIdentifier::of_type("Counter"),
            FactMappingType::Given,
            "value",
        ))
        .with_mapping(FactMapping::new(NAME, person.clone(), FactMappingType::Expected, "name"))
        .with_mapping(FactMapping::new(SCORE, person, FactMappingType::Expected, "score"))
}

/// A row of the standard descriptor with every other cell not expressed.
pub fn scenario(description: &str, cells: &[(usize, CellValue)]) -> Scenario {
    let mut scenario = Scenario::new(description);
    for column in [AGE, IS_ADULT, DISCOUNT_RATE, COUNTER, NAME, SCORE] {
        let value = cells
            .iter()
            .find(|(index, _)| *index == column)
            .map(|(_, value)| value.clone())
            .unwrap_or(CellValue::NotExpressed);
        scenario = scenario.with_cell(column, value);
    }
    scenario
}

pub fn expr(expression: &str) -> CellValue {
    CellValue::expression(expression)
}

pub fn simulation(scenarios: Vec<Scenario>) -> Simulation {
    scenarios
        .into_iter()
        .fold(Simulation::new(descriptor()), Simulation::with_scenario)
}

pub fn adult() -> Scenario {
    scenario("adult", &[(AGE, expr("30")), (IS_ADULT, expr("true"))])
}

pub fn minor_expected_adult() -> Scenario {
    scenario("minor", &[(AGE, expr("12")), (IS_ADULT, expr("true"))])
}

pub fn senior() -> Scenario {
    scenario(
        "senior",
        &[
            (AGE, expr("70")),
            (IS_ADULT, expr("true")),
            (DISCOUNT_RATE, expr("0.2")),
        ],
    )
}

pub fn runaway() -> Scenario {
    scenario("runaway", &[(COUNTER, expr("0"))])
}
