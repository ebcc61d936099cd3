use std::path::PathBuf;

use chrono::{Local, TimeDelta, Timelike};
use clap::Parser;

use crate::{
    cli::{
        amber::AmberArgs,
        hardware::HardwareArgs,
        heartbeat::HeartbeatArgs,
        home_assistant::HomeAssistantArgs,
        load_model::LoadModelArgs,
        optimizer::OptimizerArgs,
    },
    controller::EnergyController,
    core::{
        Actuation,
        Classifier,
        Forecasts,
        forecast::ceil_to_step,
        optimizer::{Optimizer, PlanColumns},
    },
    plant::PlantReader,
    prelude::*,
    report,
    tables::build_plan_table,
};

#[derive(Parser)]
pub struct HuntArgs {
    /// Do not push the schedule to the inverter (dry run).
    #[clap(long)]
    scout: bool,

    /// Write the plan as JSON into the file.
    #[clap(long = "plan-path", env = "PLAN_PATH")]
    plan_path: Option<PathBuf>,

    /// Prepend the recent plant history to the written plan.
    #[clap(long = "with-history", env = "WITH_HISTORY")]
    with_history: bool,

    #[clap(long = "history-span", default_value = "6h", env = "HISTORY_SPAN")]
    history_span: humantime::Duration,

    #[clap(flatten)]
    home_assistant: HomeAssistantArgs,

    #[clap(flatten)]
    amber: AmberArgs,

    #[clap(flatten)]
    hardware: HardwareArgs,

    #[clap(flatten)]
    optimizer: OptimizerArgs,

    #[clap(flatten)]
    load_model: LoadModelArgs,

    #[clap(flatten)]
    pub heartbeat: HeartbeatArgs,
}

#[instrument(skip_all)]
pub fn hunt(args: &HuntArgs) -> Result {
    let amber = args.amber.new_client();
    let current_prices = amber.get_current_prices()?;
    if current_prices.is_estimate {
        warn!(?current_prices, "the current prices are estimated, skipping the cycle");
        return Ok(());
    }

    let home_assistant = args.home_assistant.connection.new_client();
    let plant_entities = args.home_assistant.telemetry.plant_entities();
    let reader = PlantReader::new(&home_assistant, &plant_entities, args.hardware.ratings());
    let limits = reader.read_limits()?;
    let state = reader.read_state(limits.capacity)?;
    info!(?limits, ?state, "read the plant");

    let now = Local::now().with_nanosecond(0).context("failed to truncate the current time")?;
    let start = ceil_to_step(now)?;
    let n_steps = args.optimizer.n_steps()?;

    let day_shape = args.load_model.day_shape(&reader, now)?;
    let solar = reader.read_solar_forecast()?;
    let prices = amber.get_extrapolated_forecast(start, n_steps)?;
    let mut forecasts = Forecasts {
        load: day_shape.power_forecast(start.time(), n_steps)?,
        solar: solar.resample(start, n_steps)?,
        buy: prices.buy,
        sell: prices.sell,
    };
    forecasts.inject_live(&state);

    let classifier = Classifier::from_limits(&limits, args.optimizer.tolerance);
    let plan = Optimizer::builder()
        .limits(&limits)
        .state(&state)
        .forecasts(&forecasts)
        .settings(&args.optimizer.settings())
        .classifier(&classifier)
        .start(start)
        .n_steps(n_steps)
        .build()
        .solve()
        .context("failed to optimize the dispatch plan")?;
    println!("{}", build_plan_table(&plan));
    info!(profit_today = ?plan.profit_today, profit_tomorrow = ?plan.profit_tomorrow, "optimized");

    if let Some(path) = &args.plan_path {
        let columns = if args.with_history {
            let history = reader.read_history(now, TimeDelta::from_std(args.history_span.into())?, limits.capacity)?;
            report::with_history(&plan, &history)
        } else {
            PlanColumns::from(&plan)
        };
        report::write_plan(path, &columns)?;
    }

    if !args.scout {
        let first_step = plan.steps.first().context("the plan is empty")?;
        let control_entities = args.home_assistant.controls.control_entities();
        let mut controller = EnergyController::new(&home_assistant, &control_entities, &limits, state);
        match classifier.actuate(&first_step.powers(), &mut controller)? {
            Actuation::Applied(mode) => info!(%mode, "applied"),
            Actuation::ForcedSelfConsumption(ambiguous) => {
                return Err(ambiguous).context("forced self-consumption");
            }
        }
    }

    Ok(())
}
