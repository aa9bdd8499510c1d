//! Scenario document model.
//!
//! A [`simulation::Simulation`] is a [`descriptor::SimulationDescriptor`]
//! (the column schema) plus an ordered list of [`scenario::Scenario`] rows.
//! Each row holds one [`scenario::FactMappingValue`] per declared column.

pub mod descriptor;
pub mod scenario;
pub mod simulation;

pub use descriptor::{
    DescriptorError, ExpressionIdentifier, FactIdentifier, FactMapping, FactMappingType,
    SimulationDescriptor,
};
pub use scenario::{CellLayoutError, CellValue, FactMappingValue, FactMappingValueStatus, Scenario};
pub use simulation::{ScenarioSimulationModel, Simulation, SimulationDocument};
