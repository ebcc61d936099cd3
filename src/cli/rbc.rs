use std::thread::sleep;

use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use clap::Parser;
use enumset::EnumSet;
use itertools::Itertools;

use crate::{
    api::{amber::Resolution, home_assistant::Gateway},
    cli::{
        amber::AmberArgs,
        hardware::HardwareArgs,
        heartbeat::HeartbeatArgs,
        home_assistant::HomeAssistantArgs,
        load_model::LoadModelArgs,
    },
    controller::EnergyController,
    core::{
        ControlMode,
        rbc::{Observations, RbcSettings, RuleBasedController},
    },
    plant::{PlantReader, base_load_days},
    prelude::*,
    quantity::{energy::KilowattHours, power::Kilowatts, rate::KilowattHourRate},
};

/// Number of 30-minute feed-in forecast periods used to rank the dispatch price.
const N_FEED_IN_PERIODS: usize = 24;

#[derive(Parser)]
pub struct RbcArgs {
    #[clap(long = "polling-interval", default_value = "5m", env = "POLLING_INTERVAL")]
    polling_interval: humantime::Duration,

    /// Enabled control modes, self-consumption is always enabled.
    #[clap(
        long = "control-modes",
        env = "CONTROL_MODES",
        value_delimiter = ',',
        num_args = 1..,
        default_value = "dispatch,export-all-solar,export-excess-solar,self-consumption",
    )]
    modes: Vec<ControlMode>,

    #[clap(long = "sunrise", default_value = "06:00:00", env = "SUNRISE")]
    sunrise: NaiveTime,

    #[clap(long = "sundown", default_value = "18:00:00", env = "SUNDOWN")]
    sundown: NaiveTime,

    #[clap(flatten)]
    settings: RbcSettingsArgs,

    #[clap(flatten)]
    home_assistant: HomeAssistantArgs,

    #[clap(flatten)]
    amber: AmberArgs,

    #[clap(flatten)]
    hardware: HardwareArgs,

    #[clap(flatten)]
    load_model: LoadModelArgs,

    #[clap(flatten)]
    heartbeat: HeartbeatArgs,
}

#[derive(Parser)]
struct RbcSettingsArgs {
    /// Safety margin on the forecast consumption, in percent.
    #[clap(long = "consumption-buffer-percent", default_value = "35", env = "CONSUMPTION_BUFFER_PERCENT")]
    buffer_percent: f64,

    #[clap(long = "reserve-offset", default_value = "2", env = "RESERVE_OFFSET")]
    reserve_offset: KilowattHours,

    #[clap(long = "target-price-reduction-percent", default_value = "10", env = "TARGET_PRICE_REDUCTION_PERCENT")]
    target_price_reduction_percent: f64,

    #[clap(long = "min-dispatch-price", default_value = "0.07", env = "MIN_DISPATCH_PRICE")]
    min_dispatch_price: KilowattHourRate,

    #[clap(long = "dispatch-entry-margin", default_value = "1", env = "DISPATCH_ENTRY_MARGIN")]
    dispatch_entry_margin: KilowattHours,

    #[clap(long = "export-all-solar-entry-margin", default_value = "11", env = "EXPORT_ALL_SOLAR_ENTRY_MARGIN")]
    export_all_solar_entry_margin: KilowattHours,

    #[clap(long = "export-all-solar-exit-margin", default_value = "10", env = "EXPORT_ALL_SOLAR_EXIT_MARGIN")]
    export_all_solar_exit_margin: KilowattHours,

    #[clap(long = "min-export-all-solar-price", default_value = "0.02", env = "MIN_EXPORT_ALL_SOLAR_PRICE")]
    min_export_all_solar_price: KilowattHourRate,
}

impl RbcSettingsArgs {
    fn settings(&self) -> RbcSettings {
        RbcSettings::builder()
            .buffer_percent(self.buffer_percent)
            .reserve_offset(self.reserve_offset)
            .target_price_reduction_percent(self.target_price_reduction_percent)
            .min_dispatch_price(self.min_dispatch_price)
            .dispatch_entry_margin(self.dispatch_entry_margin)
            .export_all_solar_entry_margin(self.export_all_solar_entry_margin)
            .export_all_solar_exit_margin(self.export_all_solar_exit_margin)
            .min_export_all_solar_price(self.min_export_all_solar_price)
            .build()
    }
}

/// Base load estimate reused for a day.
struct BaseLoad {
    estimated_at: DateTime<Local>,
    value: Kilowatts,
}

impl BaseLoad {
    const MAX_AGE: TimeDelta = TimeDelta::hours(24);

    fn refresh<G: Gateway>(cached: &mut Option<Self>, reader: &PlantReader<G>, now: DateTime<Local>) -> Result<Kilowatts> {
        if let Some(base_load) = cached
            && now - base_load.estimated_at < Self::MAX_AGE
        {
            return Ok(base_load.value);
        }
        let value = reader.read_base_load(&base_load_days(now.date_naive())?)?;
        *cached = Some(Self { estimated_at: now, value });
        Ok(value)
    }
}

pub fn rbc(args: &RbcArgs) -> Result {
    let modes: EnumSet<ControlMode> = args.modes.iter().copied().collect();
    let mut controller = RuleBasedController::new(args.settings.settings(), modes);
    let mut base_load = None;
    info!(?modes, polling_interval = %args.polling_interval, "starting the rule-based controller…");
    loop {
        match run_cycle(args, &mut controller, &mut base_load) {
            Ok(()) => args.heartbeat.send(),
            Err(error) => error!("the cycle failed: {error:#}"),
        }
        sleep(args.polling_interval.into());
    }
}

#[instrument(skip_all)]
fn run_cycle(args: &RbcArgs, controller: &mut RuleBasedController, base_load: &mut Option<BaseLoad>) -> Result {
    let amber = args.amber.new_client();
    let current_prices = amber.get_current_prices()?;
    if current_prices.is_estimate {
        warn!(?current_prices, "the current prices are estimated, skipping the cycle");
        return Ok(());
    }
    let feed_in_forecast = amber
        .get_forecast(N_FEED_IN_PERIODS, Resolution::HalfHour)?
        .sell
        .into_iter()
        .map(|(_, rate)| rate)
        .collect_vec();

    let home_assistant = args.home_assistant.connection.new_client();
    let plant_entities = args.home_assistant.telemetry.plant_entities();
    let reader = PlantReader::new(&home_assistant, &plant_entities, args.hardware.ratings());
    let limits = reader.read_limits()?;
    let state = reader.read_state(limits.capacity)?;
    let balance = reader.read_energy_balance(limits.capacity)?;

    let now = Local::now();
    let base_load = BaseLoad::refresh(base_load, &reader, now)?;
    let day_shape = args.load_model.day_shape(&reader, now)?;
    let observations = Observations::builder()
        .feed_in_price(current_prices.sell)
        .feed_in_forecast(&feed_in_forecast)
        .energy_available(balance.available)
        .energy_till_full(balance.till_full)
        .solar_remaining_today(reader.read_solar_remaining_today()?)
        .consumption_till_sunrise(day_shape.consumption_between(now.time(), args.sunrise))
        .consumption_till_sundown(day_shape.consumption_between(now.time(), args.sundown))
        .is_solar_daytime(reader.is_solar_daytime(base_load)?)
        .max_export_power(limits.max_export_power)
        .build();
    let conditions = args.settings.settings().conditions(&observations);

    let control_entities = args.home_assistant.controls.control_entities();
    let mut actuator = EnergyController::new(&home_assistant, &control_entities, &limits, state);
    let mode = controller.run(&conditions, &mut actuator)?;
    info!(?mode, "applied");
    Ok(())
}
