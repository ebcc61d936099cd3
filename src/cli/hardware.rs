use clap::Parser;

use crate::{plant::PowerRatings, quantity::power::Kilowatts};

#[must_use]
#[derive(Copy, Clone, Parser)]
pub struct HardwareArgs {
    /// Maximum battery charging power in kilowatts.
    #[clap(long = "max-charging-power", default_value = "21", env = "MAX_CHARGING_POWER")]
    max_charging_power: Kilowatts,

    /// Maximum battery discharging power in kilowatts.
    #[clap(long = "max-discharging-power", default_value = "24", env = "MAX_DISCHARGING_POWER")]
    max_discharging_power: Kilowatts,

    /// Maximum DC power of the PV strings in kilowatts.
    #[clap(long = "max-solar-power", default_value = "24", env = "MAX_SOLAR_POWER")]
    max_solar_power: Kilowatts,

    /// Maximum AC power of the inverter in kilowatts.
    #[clap(long = "max-inverter-power", default_value = "15", env = "MAX_INVERTER_POWER")]
    max_inverter_power: Kilowatts,

    #[clap(long = "max-import-power", default_value = "45", env = "MAX_IMPORT_POWER")]
    max_import_power: Kilowatts,

    #[clap(long = "max-export-power", default_value = "15", env = "MAX_EXPORT_POWER")]
    max_export_power: Kilowatts,
}

impl HardwareArgs {
    pub const fn ratings(self) -> PowerRatings {
        PowerRatings {
            max_charging_power: self.max_charging_power,
            max_discharging_power: self.max_discharging_power,
            max_solar_power: self.max_solar_power,
            max_inverter_power: self.max_inverter_power,
            max_import_power: self.max_import_power,
            max_export_power: self.max_export_power,
        }
    }
}
