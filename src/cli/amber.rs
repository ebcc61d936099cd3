use clap::Parser;

use crate::api::amber;

#[derive(Parser)]
pub struct AmberArgs {
    #[clap(long = "amber-api-key", env = "AMBER_API_KEY")]
    api_key: String,

    #[clap(long = "amber-site-id", env = "AMBER_SITE_ID")]
    site_id: String,

    /// Use Amber's advanced price prediction for the forecasts.
    #[clap(long = "amber-advanced-forecast", env = "AMBER_ADVANCED_FORECAST")]
    advanced_forecast: bool,
}

impl AmberArgs {
    pub fn new_client(&self) -> amber::Api {
        amber::Api::new(&self.api_key, &self.site_id, self.advanced_forecast)
    }
}
