mod plan;
mod settings;

use std::{iter::successors, time::Instant};

use bon::Builder;
use chrono::{DateTime, Local, TimeDelta};
use good_lp::{
    Expression,
    ProblemVariables,
    Solution,
    SolverModel,
    Variable,
    clarabel,
    constraint,
    variable,
};
use itertools::{Itertools, izip};

pub use self::{
    plan::{DispatchPlan, PlanColumns, PlanStep},
    settings::OptimizerSettings,
};
use crate::{
    core::{
        Error,
        classifier::Classifier,
        forecast::load::BUCKET_WIDTH,
        plant::{PlantLimits, PlantState},
    },
    prelude::*,
    quantity::{
        cost::Cost,
        energy::KilowattHours,
        power::Kilowatts,
        rate::KilowattHourRate,
        time::Hours,
    },
};

/// Per-step forecasts aligned to the optimizer grid.
#[derive(Clone, Debug, Default)]
pub struct Forecasts {
    pub load: Vec<Kilowatts>,
    pub solar: Vec<Kilowatts>,
    pub buy: Vec<KilowattHourRate>,
    pub sell: Vec<KilowattHourRate>,
}

impl Forecasts {
    /// Replace the first step with the live measurements.
    pub fn inject_live(&mut self, state: &PlantState) {
        if let Some(load) = self.load.first_mut() {
            *load = state.load_power;
        }
        if let Some(solar) = self.solar.first_mut() {
            *solar = state.solar_power;
        }
    }

    fn ensure_covers(&self, n_steps: usize) -> Result<(), Error> {
        for (series, available) in [
            ("load", self.load.len()),
            ("solar", self.solar.len()),
            ("buy price", self.buy.len()),
            ("sell price", self.sell.len()),
        ] {
            if available < n_steps {
                return Err(Error::ForecastUnavailable { series, available, required: n_steps });
            }
        }
        Ok(())
    }
}

/// Rolling-horizon dispatch of the battery, the solar array and the grid connection.
#[derive(Builder)]
pub struct Optimizer<'a> {
    limits: &'a PlantLimits,
    state: &'a PlantState,
    forecasts: &'a Forecasts,
    settings: &'a OptimizerSettings,

    /// Labels the planned steps.
    classifier: &'a Classifier,

    /// Start of the first step.
    start: DateTime<Local>,

    n_steps: usize,

    #[builder(default = BUCKET_WIDTH)]
    step: TimeDelta,
}

struct Variables {
    charge: Vec<Variable>,
    discharge: Vec<Variable>,
    residual_energy: Vec<Variable>,
    solar_used: Vec<Variable>,
    solar_curtailed: Vec<Variable>,
    grid_import: Vec<Variable>,
    grid_export: Vec<Variable>,
    inverter: Vec<Variable>,
}

impl Optimizer<'_> {
    /// Solve the linear dispatch problem over the horizon.
    ///
    /// Minimizes the import cost minus the export revenue, plus the import penalty, the discharge
    /// wear cost and the curtailment penalty. The battery is bound to the residual energy limits
    /// through the charge and discharge efficiency, the solar and battery DC flows must balance the
    /// inverter, and the inverter and grid must balance the load on the AC side.
    ///
    /// Any solver outcome other than an optimal solution fails the cycle.
    #[instrument(skip_all, fields(start = ?self.start, n_steps = self.n_steps))]
    pub fn solve(self) -> Result<DispatchPlan, Error> {
        let start_instant = Instant::now();
        self.forecasts.ensure_covers(self.n_steps)?;

        let limits = self.limits;
        let initial_residual_energy = self.state.residual_energy.min(limits.max_residual_energy);
        let min_residual_energy = limits.min_residual_energy.min(initial_residual_energy);
        let solar_available = self.forecasts.solar[..self.n_steps]
            .iter()
            .map(|&solar| solar.max(Kilowatts::ZERO))
            .collect_vec();
        info!(?initial_residual_energy, ?min_residual_energy, "optimizing…");

        let mut problem = ProblemVariables::new();
        let n_steps = self.n_steps;
        let variables = Variables {
            charge: problem.add_vector(variable().min(0.0).max(limits.max_charging_power.0), n_steps),
            discharge: problem
                .add_vector(variable().min(0.0).max(limits.max_discharging_power.0), n_steps),
            residual_energy: problem.add_vector(
                variable().min(min_residual_energy.0).max(limits.max_residual_energy.0),
                n_steps,
            ),
            solar_used: solar_available
                .iter()
                .map(|&solar| problem.add(variable().min(0.0).max(solar.min(limits.max_solar_power).0)))
                .collect(),
            solar_curtailed: problem.add_vector(variable().min(0.0), n_steps),
            grid_import: problem.add_vector(variable().min(0.0).max(limits.max_import_power.0), n_steps),
            grid_export: problem.add_vector(variable().min(0.0).max(limits.max_export_power.0), n_steps),
            inverter: problem.add_vector(
                variable().min(-limits.max_inverter_power.0).max(limits.max_inverter_power.0),
                n_steps,
            ),
        };

        let dt = Hours::from(self.step).0;
        let settings = self.settings;
        let objective: Expression = (0..n_steps)
            .map(|t| {
                let buy = self.forecasts.buy[t].0 + settings.import_penalty.0;
                let sell = self.forecasts.sell[t].0 - settings.sell_price_bias.0;
                (buy * variables.grid_import[t] - sell * variables.grid_export[t]
                    + settings.curtailment_penalty.0 * variables.solar_curtailed[t]
                    + settings.min_discharge_cost.0 * variables.discharge[t])
                    * dt
            })
            .sum();

        let efficiency = settings.discharge_efficiency;
        let mut model = problem.minimise(objective).using(clarabel);
        for t in 0..n_steps {
            let stored = variables.residual_energy[t] - (dt * efficiency) * variables.charge[t]
                + (dt / efficiency) * variables.discharge[t];
            let balance = if t == 0 {
                constraint!(stored == initial_residual_energy.0)
            } else {
                constraint!(stored == variables.residual_energy[t - 1])
            };
            model = model
                .with(balance)
                .with(constraint!(
                    variables.solar_used[t] + variables.solar_curtailed[t] == solar_available[t].0
                ))
                .with(constraint!(
                    variables.solar_used[t] + variables.discharge[t]
                        == variables.charge[t] + variables.inverter[t]
                ))
                .with(constraint!(
                    variables.grid_import[t] + variables.inverter[t]
                        == variables.grid_export[t] + self.forecasts.load[t].0
                ));
        }

        let solution = model.solve()?;
        let plan = self.collect_plan(&solution, &variables, initial_residual_energy, &solar_available);
        info!(
            elapsed = ?start_instant.elapsed(),
            profit_today = ?plan.profit_today,
            profit_tomorrow = ?plan.profit_tomorrow,
            "optimized",
        );
        Ok(plan)
    }

    fn collect_plan(
        &self,
        solution: &impl Solution,
        variables: &Variables,
        initial_residual_energy: KilowattHours,
        solar_available: &[Kilowatts],
    ) -> DispatchPlan {
        let power = |variable: Variable| Kilowatts(solution.value(variable));
        let step_hours = Hours::from(self.step);
        let today = self.start.date_naive();
        let tomorrow = today.succ_opt();

        let times = successors(Some(self.start), |time| Some(*time + self.step));
        let mut residual_energy_before = initial_residual_energy;
        let mut profit_today = Cost::ZERO;
        let mut profit_tomorrow = Cost::ZERO;
        let mut steps = Vec::with_capacity(self.n_steps);

        for (t, time, solar_forecast) in izip!(0..self.n_steps, times, solar_available) {
            let grid_import = power(variables.grid_import[t]);
            let grid_export = power(variables.grid_export[t]);
            let buy_price = self.forecasts.buy[t];
            let sell_price = self.forecasts.sell[t];
            let profit = grid_export * step_hours * sell_price - grid_import * step_hours * buy_price;
            if time.date_naive() == today {
                profit_today += profit;
            } else if Some(time.date_naive()) == tomorrow {
                profit_tomorrow += profit;
            }

            let residual_energy_after = KilowattHours(solution.value(variables.residual_energy[t]));
            let mut step = PlanStep {
                time,
                charge: power(variables.charge[t]),
                discharge: power(variables.discharge[t]),
                residual_energy_before,
                residual_energy_after,
                solar_forecast: *solar_forecast,
                solar_used: power(variables.solar_used[t]),
                solar_curtailed: power(variables.solar_curtailed[t]),
                grid_import,
                grid_export,
                inverter: power(variables.inverter[t]),
                load: self.forecasts.load[t],
                buy_price,
                sell_price,
                profit,
                mode: None,
            };
            step.mode = self.classifier.classify(&step.powers()).mode();
            residual_energy_before = residual_energy_after;
            steps.push(step);
        }

        DispatchPlan {
            min_residual_energy: self.limits.min_residual_energy,
            max_residual_energy: self.limits.max_residual_energy,
            steps,
            profit_today,
            profit_tomorrow,
        }
    }
}
