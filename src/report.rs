use std::{fs, path::Path};

use crate::{
    core::{DispatchPlan, optimizer::PlanColumns},
    plant::PlantHistory,
    prelude::*,
};

/// Plan columns prefixed with the recent telemetry, for plotting the past next to the plan.
///
/// The measured solar power stands in for both the forecast and the used solar.
pub fn with_history(plan: &DispatchPlan, history: &PlantHistory) -> PlanColumns {
    fn prepend<T: Clone>(history: &[T], plan: Vec<T>) -> Vec<T> {
        history.iter().cloned().chain(plan).collect()
    }

    let columns = PlanColumns::from(plan);
    PlanColumns {
        historical_data_length: Some(history.len()),
        time_index: prepend(&history.time, columns.time_index),
        battery_power: prepend(&history.battery_power, columns.battery_power),
        soc: prepend(&history.residual_energy, columns.soc),
        grid_net: prepend(&history.grid_power, columns.grid_net),
        prices_buy: prepend(&history.buy_price, columns.prices_buy),
        prices_sell: prepend(&history.sell_price, columns.prices_sell),
        inverter_power: prepend(&history.inverter_power, columns.inverter_power),
        solar_forecast: prepend(&history.solar_power, columns.solar_forecast),
        solar_used: prepend(&history.solar_power, columns.solar_used),
        load_power: prepend(&history.load_power, columns.load_power),
        plan_modes: prepend(&history.working_mode, columns.plan_modes),
        ..columns
    }
}

#[instrument(skip_all, fields(path = %path.display()))]
pub fn write_plan(path: &Path, columns: &PlanColumns) -> Result {
    fs::write(path, serde_json::to_vec(columns)?).context("failed to write the plan")?;
    info!(n_steps = columns.time_index.len(), "written the plan");
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeDelta, TimeZone};

    use super::*;
    use crate::{
        core::{ControlMode, optimizer::PlanStep},
        quantity::{cost::Cost, energy::KilowattHours, power::Kilowatts, rate::KilowattHourRate},
    };

    fn plan() -> DispatchPlan {
        let start = Local.with_ymd_and_hms(2025, 10, 20, 12, 0, 0).unwrap();
        let step = |index: i32| PlanStep {
            time: start + TimeDelta::minutes(5 * i64::from(index)),
            charge: Kilowatts::ZERO,
            discharge: Kilowatts(1.0),
            residual_energy_before: KilowattHours(10.0 - f64::from(index) * 0.1),
            residual_energy_after: KilowattHours(9.9 - f64::from(index) * 0.1),
            solar_forecast: Kilowatts::ZERO,
            solar_used: Kilowatts::ZERO,
            solar_curtailed: Kilowatts::ZERO,
            grid_import: Kilowatts::ZERO,
            grid_export: Kilowatts::ZERO,
            inverter: Kilowatts(1.0),
            load: Kilowatts(1.0),
            buy_price: KilowattHourRate(0.30),
            sell_price: KilowattHourRate(0.05),
            profit: Cost::ZERO,
            mode: (index == 0).then_some(ControlMode::SelfConsumption),
        };
        DispatchPlan {
            min_residual_energy: KilowattHours(4.0),
            max_residual_energy: KilowattHours(40.0),
            steps: vec![step(0), step(1)],
            profit_today: Cost(-0.5),
            profit_tomorrow: Cost::ZERO,
        }
    }

    #[test]
    fn test_plan_columns() -> Result {
        let json = serde_json::to_value(PlanColumns::from(&plan()))?;
        assert!(json.get("historical_data_length").is_none());
        assert_eq!(json["soc"].as_array().map(Vec::len), Some(3));
        assert_eq!(json["battery_power"][0], 1.0);
        assert_eq!(json["plan_modes"][0], "Self Consumption");
        assert_eq!(json["plan_modes"][1], "Unable to determine");
        assert_eq!(json["profit_today"], -0.5);
        assert_eq!(json["time_index"].as_array().map(Vec::len), Some(2));
        Ok(())
    }

    #[test]
    fn test_with_history() {
        let start = Local.with_ymd_and_hms(2025, 10, 20, 11, 55, 0).unwrap();
        let history = PlantHistory {
            time: vec![start],
            residual_energy: vec![KilowattHours(10.1)],
            battery_power: vec![Kilowatts(0.5)],
            inverter_power: vec![Kilowatts(0.5)],
            solar_power: vec![Kilowatts(2.0)],
            load_power: vec![Kilowatts(2.5)],
            grid_power: vec![Kilowatts::ZERO],
            buy_price: vec![KilowattHourRate(0.25)],
            sell_price: vec![KilowattHourRate(0.04)],
            working_mode: vec!["Dispatching".to_owned()],
        };
        let columns = with_history(&plan(), &history);
        assert_eq!(columns.historical_data_length, Some(1));
        assert_eq!(columns.time_index.len(), 3);
        assert_eq!(columns.soc.len(), 4);
        assert_eq!(columns.solar_used[0], Kilowatts(2.0));
        assert_eq!(columns.plan_modes, ["Dispatching", "Self Consumption", "Unable to determine"]);
        assert_eq!(columns.soc_min, KilowattHours(4.0));
    }
}
