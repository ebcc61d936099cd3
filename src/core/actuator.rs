use crate::{prelude::*, quantity::power::Kilowatts};

/// Sink of actuation commands.
///
/// Every call must be idempotent: repeating it with the same arguments changes nothing.
/// `None` limits mean "the hardware maximum".
pub trait Actuator {
    fn dispatch(&mut self, export_limit: Option<Kilowatts>) -> Result;

    fn export_all_solar(&mut self) -> Result;

    fn export_excess_solar(&mut self, charge_limit: Option<Kilowatts>) -> Result;

    fn solar_to_load(&mut self) -> Result;

    fn import_power(&mut self, charge_limit: Option<Kilowatts>, pv_limit: Option<Kilowatts>) -> Result;

    fn self_consumption(&mut self, pv_limit: Option<Kilowatts>) -> Result;
}

/// One actuation call with its arguments.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Dispatch { export_limit: Option<Kilowatts> },
    ExportAllSolar,
    ExportExcessSolar { charge_limit: Option<Kilowatts> },
    SolarToLoad,
    ImportPower { charge_limit: Option<Kilowatts>, pv_limit: Option<Kilowatts> },
    SelfConsumption { pv_limit: Option<Kilowatts> },
}

impl Command {
    pub fn apply(self, actuator: &mut impl Actuator) -> Result {
        match self {
            Self::Dispatch { export_limit } => actuator.dispatch(export_limit),
            Self::ExportAllSolar => actuator.export_all_solar(),
            Self::ExportExcessSolar { charge_limit } => actuator.export_excess_solar(charge_limit),
            Self::SolarToLoad => actuator.solar_to_load(),
            Self::ImportPower { charge_limit, pv_limit } => {
                actuator.import_power(charge_limit, pv_limit)
            }
            Self::SelfConsumption { pv_limit } => actuator.self_consumption(pv_limit),
        }
    }
}
