use std::{thread::sleep, time::Duration};

use chrono::{DateTime, DurationRound, Local, TimeDelta};
use http::StatusCode;
use itertools::Itertools;
use serde::Deserialize;
use ureq::Agent;

use crate::{
    core::forecast::price::{MAX_NEAR_TERM_STEPS, PriceForecast, PricePoint},
    prelude::*,
    quantity::rate::KilowattHourRate,
};

/// Amber Electric real-time price API.
pub struct Api {
    client: Agent,
    authorization: String,
    site_url: String,

    /// Use Amber's own price prediction instead of the AEMO forecast.
    advanced_forecast: bool,
}

impl Api {
    const BASE_URL: &'static str = "https://api.amber.com.au/v1";

    /// Waiting time when the rate limit response has no reset header.
    const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(10);

    pub fn new(api_key: &str, site_id: &str, advanced_forecast: bool) -> Self {
        let client = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(10)))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            client,
            authorization: format!("Bearer {api_key}"),
            site_url: format!("{}/sites/{site_id}", Self::BASE_URL),
            advanced_forecast,
        }
    }

    /// Current buy and feed-in prices.
    #[instrument(skip_all)]
    pub fn get_current_prices(&self) -> Result<CurrentPrices> {
        let intervals = self.get_intervals(&[])?;
        let current = Prices::from_intervals(&intervals, false)?;
        let (Some(&(_, buy)), Some(&(_, sell))) = (current.buy.first(), current.sell.first()) else {
            bail!("Amber returned no current prices");
        };
        let is_estimate = intervals.iter().any(|interval| interval.estimate);
        info!(?buy, ?sell, is_estimate, "fetched the current prices");
        Ok(CurrentPrices { buy, sell, is_estimate })
    }

    /// Prices of the `next` upcoming intervals, the current one included.
    #[instrument(skip_all, fields(next = next, ?resolution))]
    pub fn get_forecast(&self, next: usize, resolution: Resolution) -> Result<Prices> {
        let intervals = self.get_intervals(&[
            ("next", next.to_string()),
            ("previous", "0".to_owned()),
            ("resolution", resolution.minutes().to_string()),
        ])?;
        Prices::from_intervals(&intervals, self.advanced_forecast)
    }

    /// Prices of the `previous` past intervals, the current one included.
    #[instrument(skip_all, fields(previous = previous, ?resolution))]
    pub fn get_past_prices(&self, previous: usize, resolution: Resolution) -> Result<Prices> {
        let intervals = self.get_intervals(&[
            ("next", "0".to_owned()),
            ("previous", previous.to_string()),
            ("resolution", resolution.minutes().to_string()),
        ])?;
        Prices::from_intervals(&intervals, false)
    }

    /// Buy and sell prices of the `n_steps` 5-minute steps starting at `start`.
    ///
    /// The 5-minute forecast covers the first hour, the 30-minute forecast the next 12 hours,
    /// and the rest is filled with the past prices.
    #[instrument(skip_all, fields(start = ?start, n_steps = n_steps))]
    pub fn get_extrapolated_forecast(&self, start: DateTime<Local>, n_steps: usize) -> Result<PriceSeries> {
        let near_term = self.get_forecast(MAX_NEAR_TERM_STEPS, Resolution::FiveMinutes)?;
        let mid_term = self.get_forecast(24, Resolution::HalfHour)?;
        let n_look_back = PriceForecast::look_back_periods(n_steps, mid_term.buy.len());
        let history = if n_look_back == 0 {
            Prices::default()
        } else {
            self.get_past_prices(n_look_back, Resolution::HalfHour)?
        };

        let extrapolate = |select: fn(&Prices) -> &[PricePoint]| {
            PriceForecast::builder()
                .near_term(select(&near_term))
                .mid_term(select(&mid_term))
                .history(select(&history))
                .build()
                .extrapolate(start, n_steps)
        };
        Ok(PriceSeries {
            buy: extrapolate(|prices| &prices.buy)?,
            sell: extrapolate(|prices| &prices.sell)?,
        })
    }

    fn get_intervals(&self, query: &[(&str, String)]) -> Result<Vec<Interval>> {
        loop {
            let mut response = self
                .client
                .get(format!("{}/prices/current", self.site_url))
                .header("Authorization", &self.authorization)
                .header("Accept", "application/json")
                .query_pairs(query.iter().map(|(key, value)| (*key, value.as_str())))
                .call()
                .context("failed to call Amber")?;
            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let delay = response
                    .headers()
                    .get("RateLimit-Reset")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<u64>().ok())
                    .map_or(Self::DEFAULT_RATE_LIMIT_DELAY, |seconds| Duration::from_secs(seconds + 5));
                error!(?delay, "exceeded the request rate limit, waiting before retrying…");
                sleep(delay);
                continue;
            }
            ensure!(status.is_success(), "Amber responded with {status}");
            let remaining = response.headers().get("RateLimit-Remaining").and_then(|value| value.to_str().ok());
            debug!(?remaining, "fetched");
            return Ok(response.body_mut().read_json::<Vec<Interval>>()?);
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub enum Resolution {
    FiveMinutes,
    HalfHour,
}

impl Resolution {
    pub const fn minutes(self) -> u32 {
        match self {
            Self::FiveMinutes => 5,
            Self::HalfHour => 30,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct CurrentPrices {
    pub buy: KilowattHourRate,
    pub sell: KilowattHourRate,

    /// The prices are Amber's estimate and will still change within the interval.
    pub is_estimate: bool,
}

/// Prices by interval start, oldest first.
#[derive(Clone, Debug, Default)]
pub struct Prices {
    pub buy: Vec<PricePoint>,

    /// Feed-in prices, positive when exporting earns money.
    pub sell: Vec<PricePoint>,
}

impl Prices {
    /// Amber starts its intervals a second past the boundary, the timestamps are truncated
    /// to the minute.
    fn from_intervals(intervals: &[Interval], advanced_forecast: bool) -> Result<Self> {
        let mut prices = Self::default();
        for interval in intervals.iter().sorted_by_key(|interval| interval.start_time) {
            let start_time = interval.start_time.duration_trunc(TimeDelta::minutes(1))?;
            let cents = interval
                .advanced_price
                .filter(|_| advanced_forecast)
                .map_or(interval.per_kwh, |advanced| advanced.predicted)
                .round();
            match interval.channel {
                Channel::General => {
                    prices.buy.push((start_time, KilowattHourRate::from_cents(cents)));
                }
                Channel::FeedIn => {
                    prices.sell.push((start_time, -KilowattHourRate::from_cents(cents)));
                }
                Channel::Other => {}
            }
        }
        Ok(prices)
    }
}

/// 5-minute buy and sell prices aligned to the optimizer grid.
#[derive(Clone, Debug)]
pub struct PriceSeries {
    pub buy: Vec<KilowattHourRate>,
    pub sell: Vec<KilowattHourRate>,
}

#[derive(Deserialize)]
struct Interval {
    #[serde(rename = "startTime")]
    start_time: DateTime<Local>,

    /// Cents per kilowatt-hour, negative feed-in means earning.
    #[serde(rename = "perKwh")]
    per_kwh: f64,

    #[serde(rename = "channelType")]
    channel: Channel,

    #[serde(default)]
    estimate: bool,

    #[serde(rename = "advancedPrice", default)]
    advanced_price: Option<AdvancedPrice>,
}

#[derive(Copy, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Channel {
    General,
    FeedIn,

    #[serde(other)]
    Other,
}

#[derive(Copy, Clone, Deserialize)]
struct AdvancedPrice {
    predicted: f64,
}
