pub mod actuator;
pub mod binning;
pub mod classifier;
pub mod control_mode;
mod error;
pub mod forecast;
pub mod optimizer;
pub mod plant;
pub mod rbc;
pub mod series;

pub use self::{
    actuator::Actuator,
    classifier::{Actuation, Classifier},
    control_mode::ControlMode,
    error::Error,
    optimizer::{DispatchPlan, Forecasts, OptimizerSettings},
    plant::{PlantLimits, PlantState},
};
