use chrono::{DateTime, Local};
use serde::Serialize;

use crate::{
    core::{
        classifier::StepPowers,
        control_mode::{ControlMode, label_of},
    },
    quantity::{
        cost::Cost,
        energy::KilowattHours,
        power::Kilowatts,
        rate::KilowattHourRate,
    },
};

/// Planned flows of a single step. All powers are step averages.
#[derive(Clone, Debug)]
pub struct PlanStep {
    pub time: DateTime<Local>,
    pub charge: Kilowatts,
    pub discharge: Kilowatts,
    pub residual_energy_before: KilowattHours,
    pub residual_energy_after: KilowattHours,
    pub solar_forecast: Kilowatts,
    pub solar_used: Kilowatts,
    pub solar_curtailed: Kilowatts,
    pub grid_import: Kilowatts,
    pub grid_export: Kilowatts,

    /// AC power of the inverter, positive towards the house and the grid.
    pub inverter: Kilowatts,

    pub load: Kilowatts,
    pub buy_price: KilowattHourRate,
    pub sell_price: KilowattHourRate,
    pub profit: Cost,

    /// `None` when no classification rule matches the step.
    pub mode: Option<ControlMode>,
}

impl PlanStep {
    /// Net battery power, positive when discharging.
    pub fn battery_power(&self) -> Kilowatts {
        self.discharge - self.charge
    }

    /// Net grid power, positive when importing.
    pub fn grid_net(&self) -> Kilowatts {
        self.grid_import - self.grid_export
    }

    pub fn powers(&self) -> StepPowers {
        StepPowers {
            inverter: self.inverter,
            solar_used: self.solar_used,
            solar_available: self.solar_forecast,
            load: self.load,
            grid_net: self.grid_net(),
            battery: self.battery_power(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DispatchPlan {
    pub min_residual_energy: KilowattHours,
    pub max_residual_energy: KilowattHours,
    pub steps: Vec<PlanStep>,
    pub profit_today: Cost,
    pub profit_tomorrow: Cost,
}

impl DispatchPlan {
    /// Residual energy at every step boundary, one more than the number of steps.
    pub fn residual_energies(&self) -> impl Iterator<Item = KilowattHours> {
        self.steps
            .first()
            .map(|step| step.residual_energy_before)
            .into_iter()
            .chain(self.steps.iter().map(|step| step.residual_energy_after))
    }
}

/// Column-oriented plan as consumed by the dashboard.
#[derive(Serialize)]
pub struct PlanColumns {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub historical_data_length: Option<usize>,

    pub time_index: Vec<DateTime<Local>>,
    pub battery_power: Vec<Kilowatts>,
    pub soc: Vec<KilowattHours>,
    pub grid_net: Vec<Kilowatts>,
    pub prices_buy: Vec<KilowattHourRate>,
    pub prices_sell: Vec<KilowattHourRate>,
    pub profit_today: Cost,
    pub profit_tomorrow: Cost,
    pub inverter_power: Vec<Kilowatts>,
    pub solar_forecast: Vec<Kilowatts>,
    pub solar_used: Vec<Kilowatts>,
    pub load_power: Vec<Kilowatts>,
    pub soc_min: KilowattHours,
    pub soc_max: KilowattHours,
    pub plan_modes: Vec<String>,
    pub charge_power: Vec<Kilowatts>,
    pub discharge_power: Vec<Kilowatts>,
    pub solar_curtailed: Vec<Kilowatts>,
    pub grid_import: Vec<Kilowatts>,
    pub grid_export: Vec<Kilowatts>,
}

impl From<&DispatchPlan> for PlanColumns {
    fn from(plan: &DispatchPlan) -> Self {
        let column =
            |f: fn(&PlanStep) -> Kilowatts| -> Vec<Kilowatts> { plan.steps.iter().map(f).collect() };
        Self {
            historical_data_length: None,
            time_index: plan.steps.iter().map(|step| step.time).collect(),
            battery_power: column(PlanStep::battery_power),
            soc: plan.residual_energies().collect(),
            grid_net: column(PlanStep::grid_net),
            prices_buy: plan.steps.iter().map(|step| step.buy_price).collect(),
            prices_sell: plan.steps.iter().map(|step| step.sell_price).collect(),
            profit_today: plan.profit_today,
            profit_tomorrow: plan.profit_tomorrow,
            inverter_power: column(|step| step.inverter),
            solar_forecast: column(|step| step.solar_forecast),
            solar_used: column(|step| step.solar_used),
            load_power: column(|step| step.load),
            soc_min: plan.min_residual_energy,
            soc_max: plan.max_residual_energy,
            plan_modes: plan.steps.iter().map(|step| label_of(step.mode).to_owned()).collect(),
            charge_power: column(|step| step.charge),
            discharge_power: column(|step| step.discharge),
            solar_curtailed: column(|step| step.solar_curtailed),
            grid_import: column(|step| step.grid_import),
            grid_export: column(|step| step.grid_export),
        }
    }
}
