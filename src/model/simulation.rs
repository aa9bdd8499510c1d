use serde::{Deserialize, Serialize};

use super::descriptor::SimulationDescriptor;
use super::scenario::Scenario;
use crate::service::TestResultMessage;
use crate::types::TypeRegistry;

/// An ordered batch of scenarios sharing one column schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Simulation {
    #[serde(default)]
    pub descriptor: SimulationDescriptor,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

impl Simulation {
    pub fn new(descriptor: SimulationDescriptor) -> Self {
        Self {
            descriptor,
            scenarios: Vec::new(),
        }
    }

    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }
}

/// The editable document: a simulation plus the outcome of its last run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSimulationModel {
    pub simulation: Simulation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<TestResultMessage>,
}

impl ScenarioSimulationModel {
    pub fn new(simulation: Simulation) -> Self {
        Self {
            simulation,
            last_run: None,
        }
    }
}

/// File format read by the `scesim` binary: the fact types a container
/// knows about, and the model to run against it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationDocument {
    #[serde(default)]
    pub fact_types: TypeRegistry,
    pub model: ScenarioSimulationModel,
}
