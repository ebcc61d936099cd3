use clap::Parser;

use crate::{api::home_assistant, controller::ControlEntities, plant::PlantEntities};

#[derive(Parser)]
pub struct HomeAssistantArgs {
    #[clap(flatten)]
    pub connection: HomeAssistantConnectionArgs,

    #[clap(flatten)]
    pub telemetry: TelemetryEntityArgs,

    #[clap(flatten)]
    pub controls: ControlEntityArgs,
}

#[derive(Parser)]
pub struct HomeAssistantConnectionArgs {
    /// Home Assistant long-lived access token.
    #[clap(long = "home-assistant-access-token", env = "HOME_ASSISTANT_ACCESS_TOKEN")]
    pub access_token: String,

    /// Home Assistant base URL. For example: `http://homeassistant.local:8123`.
    #[clap(long = "home-assistant-api-base-url", env = "HOME_ASSISTANT_API_BASE_URL")]
    pub base_url: String,
}

impl HomeAssistantConnectionArgs {
    pub fn new_client(&self) -> home_assistant::Api {
        home_assistant::Api::new(&self.access_token, &self.base_url)
    }
}

#[derive(Parser)]
pub struct TelemetryEntityArgs {
    #[clap(long, env, default_value = "sensor.sigen_plant_rated_energy_capacity")]
    rated_capacity_entity_id: String,

    #[clap(long, env, default_value = "sensor.sigen_plant_battery_state_of_charge")]
    state_of_charge_entity_id: String,

    #[clap(long, env, default_value = "number.sigen_plant_ess_backup_state_of_charge")]
    backup_state_of_charge_entity_id: String,

    #[clap(long, env, default_value = "number.sigen_plant_ess_charge_cut_off_state_of_charge")]
    charge_cut_off_state_of_charge_entity_id: String,

    #[clap(long, env, default_value = "sensor.sigen_plant_available_max_discharging_capacity")]
    available_discharging_capacity_entity_id: String,

    #[clap(long, env, default_value = "sensor.sigen_plant_available_max_charging_capacity")]
    available_charging_capacity_entity_id: String,

    /// Battery power, positive when discharging.
    #[clap(long, env, default_value = "sensor.reversed_battery_power")]
    battery_power_entity_id: String,

    #[clap(long, env, default_value = "sensor.sigen_plant_pv_power")]
    solar_power_entity_id: String,

    #[clap(long, env, default_value = "sensor.sigen_plant_plant_active_power")]
    inverter_power_entity_id: String,

    #[clap(long, env, default_value = "sensor.sigen_plant_grid_active_power")]
    grid_power_entity_id: String,

    #[clap(long, env, default_value = "sensor.sigen_plant_consumed_power")]
    load_power_entity_id: String,

    #[clap(long, env, default_value = "sensor.sigen_plant_daily_load_consumption")]
    daily_load_consumption_entity_id: String,

    #[clap(long, env, default_value = "sensor.solcast_pv_forecast_forecast_today")]
    solar_forecast_today_entity_id: String,

    #[clap(long, env, default_value = "sensor.solcast_pv_forecast_forecast_tomorrow")]
    solar_forecast_tomorrow_entity_id: String,

    #[clap(long, env, default_value = "sensor.solcast_pv_forecast_forecast_remaining_today")]
    solar_forecast_remaining_today_entity_id: String,

    #[clap(long, env, default_value = "sensor.solcast_pv_forecast_forecast_this_hour")]
    solar_forecast_this_hour_entity_id: String,

    #[clap(long, env, default_value = "sensor.energy_manager_device_general_price")]
    buy_price_entity_id: String,

    #[clap(long, env, default_value = "sensor.energy_manager_device_feed_in_price")]
    sell_price_entity_id: String,

    #[clap(long, env, default_value = "sensor.energy_manager_device_working_mode")]
    working_mode_entity_id: String,
}

impl TelemetryEntityArgs {
    pub fn plant_entities(&self) -> PlantEntities {
        PlantEntities {
            rated_capacity: self.rated_capacity_entity_id.clone(),
            state_of_charge: self.state_of_charge_entity_id.clone(),
            backup_state_of_charge: self.backup_state_of_charge_entity_id.clone(),
            charge_cut_off_state_of_charge: self.charge_cut_off_state_of_charge_entity_id.clone(),
            available_discharging_capacity: self.available_discharging_capacity_entity_id.clone(),
            available_charging_capacity: self.available_charging_capacity_entity_id.clone(),
            battery_power: self.battery_power_entity_id.clone(),
            solar_power: self.solar_power_entity_id.clone(),
            inverter_power: self.inverter_power_entity_id.clone(),
            grid_power: self.grid_power_entity_id.clone(),
            load_power: self.load_power_entity_id.clone(),
            daily_load_consumption: self.daily_load_consumption_entity_id.clone(),
            solar_forecast_today: self.solar_forecast_today_entity_id.clone(),
            solar_forecast_tomorrow: self.solar_forecast_tomorrow_entity_id.clone(),
            solar_forecast_remaining_today: self.solar_forecast_remaining_today_entity_id.clone(),
            solar_forecast_this_hour: self.solar_forecast_this_hour_entity_id.clone(),
            buy_price: self.buy_price_entity_id.clone(),
            sell_price: self.sell_price_entity_id.clone(),
            working_mode: self.working_mode_entity_id.clone(),
        }
    }
}

#[derive(Parser)]
pub struct ControlEntityArgs {
    #[clap(long, env, default_value = "select.sigen_plant_remote_ems_control_mode")]
    remote_ems_mode_entity_id: String,

    #[clap(long, env, default_value = "number.sigen_plant_ess_max_discharging_limit")]
    max_discharging_limit_entity_id: String,

    #[clap(long, env, default_value = "number.sigen_plant_ess_max_charging_limit")]
    max_charging_limit_entity_id: String,

    #[clap(long, env, default_value = "number.sigen_plant_pv_max_power_limit")]
    pv_max_power_limit_entity_id: String,

    #[clap(long, env, default_value = "number.sigen_plant_grid_export_limitation")]
    grid_export_limitation_entity_id: String,

    #[clap(long, env, default_value = "number.sigen_plant_grid_import_limitation")]
    grid_import_limitation_entity_id: String,
}

impl ControlEntityArgs {
    pub fn control_entities(&self) -> ControlEntities {
        ControlEntities {
            remote_ems_mode: self.remote_ems_mode_entity_id.clone(),
            max_discharging_limit: self.max_discharging_limit_entity_id.clone(),
            max_charging_limit: self.max_charging_limit_entity_id.clone(),
            pv_max_power_limit: self.pv_max_power_limit_entity_id.clone(),
            grid_export_limitation: self.grid_export_limitation_entity_id.clone(),
            grid_import_limitation: self.grid_import_limitation_entity_id.clone(),
        }
    }
}
