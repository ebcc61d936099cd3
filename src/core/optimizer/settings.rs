use bon::Builder;

use crate::quantity::rate::KilowattHourRate;

/// Economic and physical parameters of the dispatch problem.
#[derive(Copy, Clone, Debug, Builder)]
pub struct OptimizerSettings {
    /// One-way battery efficiency, applied to both charging and discharging.
    #[builder(default = 0.95)]
    pub discharge_efficiency: f64,

    /// Wear cost of discharging the battery.
    #[builder(default = KilowattHourRate(0.07))]
    pub min_discharge_cost: KilowattHourRate,

    /// Added to the buy price to prefer local energy over an equally priced import.
    #[builder(default = KilowattHourRate(0.02))]
    pub import_penalty: KilowattHourRate,

    #[builder(default = KilowattHourRate(0.0001))]
    pub curtailment_penalty: KilowattHourRate,

    /// Tie-breaking bias subtracted from the sell price inside the objective.
    ///
    /// At a zero feed-in price exporting is never strictly better than curtailing,
    /// so the solver does not export for nothing.
    #[builder(default = KilowattHourRate(0.0001))]
    pub sell_price_bias: KilowattHourRate,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}
