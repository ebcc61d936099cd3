use std::time::Duration;

use clap::Parser;

use crate::{
    core::{OptimizerSettings, forecast::load::BUCKET_WIDTH},
    prelude::*,
    quantity::{power::Kilowatts, rate::KilowattHourRate},
};

#[derive(Parser)]
pub struct OptimizerArgs {
    /// Planning horizon.
    #[clap(long = "horizon", default_value = "24h", env = "HORIZON")]
    horizon: humantime::Duration,

    #[clap(long = "discharge-efficiency", default_value = "0.95", env = "DISCHARGE_EFFICIENCY")]
    discharge_efficiency: f64,

    /// Battery wear cost per discharged kilowatt-hour.
    #[clap(long = "min-discharge-cost", default_value = "0.07", env = "MIN_DISCHARGE_COST")]
    min_discharge_cost: KilowattHourRate,

    /// Extra cost per imported kilowatt-hour to discourage marginal imports.
    #[clap(long = "import-penalty", default_value = "0.02", env = "IMPORT_PENALTY")]
    import_penalty: KilowattHourRate,

    #[clap(long = "curtailment-penalty", default_value = "0.0001", env = "CURTAILMENT_PENALTY")]
    curtailment_penalty: KilowattHourRate,

    /// Subtracted from the sell price to break ties in favour of not exporting.
    #[clap(long = "sell-price-bias", default_value = "0.0001", env = "SELL_PRICE_BIAS")]
    sell_price_bias: KilowattHourRate,

    /// Plan step powers closer than this are considered equal by the classifier.
    #[clap(long = "classifier-tolerance", default_value = "0.2", env = "CLASSIFIER_TOLERANCE")]
    pub tolerance: Kilowatts,
}

impl OptimizerArgs {
    pub fn settings(&self) -> OptimizerSettings {
        OptimizerSettings::builder()
            .discharge_efficiency(self.discharge_efficiency)
            .min_discharge_cost(self.min_discharge_cost)
            .import_penalty(self.import_penalty)
            .curtailment_penalty(self.curtailment_penalty)
            .sell_price_bias(self.sell_price_bias)
            .build()
    }

    /// Number of optimizer steps in the horizon.
    pub fn n_steps(&self) -> Result<usize> {
        let horizon: Duration = self.horizon.into();
        let step = BUCKET_WIDTH.to_std()?;
        let n_steps = usize::try_from(horizon.as_secs() / step.as_secs())?;
        ensure!(n_steps != 0, "the horizon is shorter than a step");
        Ok(n_steps)
    }
}
