use bon::Builder;

use crate::quantity::{energy::KilowattHours, power::Kilowatts};

/// Hardware and policy limits, fixed for the duration of a cycle.
#[derive(Copy, Clone, Debug, Builder)]
pub struct PlantLimits {
    /// Usable battery capacity.
    pub capacity: KilowattHours,

    /// Backup reserve the plan never dips below.
    pub min_residual_energy: KilowattHours,

    pub max_residual_energy: KilowattHours,
    pub max_charging_power: Kilowatts,
    pub max_discharging_power: Kilowatts,

    /// Maximum DC power the PV strings may deliver.
    pub max_solar_power: Kilowatts,

    /// Maximum AC power of the inverter in either direction.
    pub max_inverter_power: Kilowatts,

    pub max_import_power: Kilowatts,
    pub max_export_power: Kilowatts,
}

/// Telemetry snapshot taken at the start of a cycle.
///
/// Battery power is positive when discharging, grid power is positive when importing.
#[derive(Copy, Clone, Debug, Default)]
pub struct PlantState {
    pub residual_energy: KilowattHours,
    pub battery_power: Kilowatts,
    pub solar_power: Kilowatts,
    pub load_power: Kilowatts,
    pub inverter_power: Kilowatts,
    pub grid_power: Kilowatts,
}
