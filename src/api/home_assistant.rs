use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use serde_with::serde_as;
use ureq::Agent;

use crate::{core::binning::parse_numeric, prelude::*, quantity::power::Kilowatts};

/// Telemetry and setpoint access.
pub trait Gateway {
    fn get_state(&self, entity_id: &str) -> Result<EntityState>;

    fn get_history(
        &self,
        entity_id: &str,
        since: DateTime<Local>,
        until: DateTime<Local>,
    ) -> Result<Vec<StateChange>>;

    fn set_number(&self, entity_id: &str, value: f64) -> Result;

    fn set_select(&self, entity_id: &str, option: &str) -> Result;

    /// `None` when the entity is unavailable or its state is not a number.
    fn get_numeric_state(&self, entity_id: &str) -> Result<Option<f64>> {
        Ok(parse_numeric(&self.get_state(entity_id)?.state))
    }

    /// Same as [`Gateway::get_numeric_state`], but the value is required.
    fn require_numeric_state(&self, entity_id: &str) -> Result<f64> {
        self.get_numeric_state(entity_id)?
            .with_context(|| format!("`{entity_id}` has no numeric state"))
    }
}

/// Home Assistant REST API.
pub struct Api {
    client: Agent,
    authorization: String,
    base_url: String,
}

impl Api {
    pub fn new(access_token: &str, base_url: &str) -> Self {
        let client =
            Agent::config_builder().timeout_global(Some(Duration::from_secs(10))).build().into();
        Self {
            client,
            authorization: format!("Bearer {access_token}"),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    fn call_service(&self, domain: &str, service: &str, body: &Value) -> Result {
        self.client
            .post(format!("{}/api/services/{domain}/{service}", self.base_url))
            .header("Authorization", &self.authorization)
            .send_json(body)
            .with_context(|| format!("failed to call `{domain}.{service}`"))?;
        Ok(())
    }
}

impl Gateway for Api {
    #[instrument(skip_all, fields(entity_id = entity_id))]
    fn get_state(&self, entity_id: &str) -> Result<EntityState> {
        let state = self
            .client
            .get(format!("{}/api/states/{entity_id}", self.base_url))
            .header("Authorization", &self.authorization)
            .call()
            .with_context(|| format!("failed to fetch `{entity_id}`"))?
            .body_mut()
            .read_json::<EntityState>()?;
        trace!(state = %state.state, "fetched");
        Ok(state)
    }

    #[instrument(skip_all, fields(entity_id = entity_id))]
    fn get_history(
        &self,
        entity_id: &str,
        since: DateTime<Local>,
        until: DateTime<Local>,
    ) -> Result<Vec<StateChange>> {
        let history = self
            .client
            .get(format!("{}/api/history/period/{}", self.base_url, since.to_rfc3339()))
            .header("Authorization", &self.authorization)
            .query("filter_entity_id", entity_id)
            .query("end_time", until.to_rfc3339())
            .query("minimal_response", "")
            .query("no_attributes", "")
            .call()
            .with_context(|| format!("failed to fetch the history of `{entity_id}`"))?
            .body_mut()
            .read_json::<EntitiesHistory>()?;
        let changes = history.0.into_iter().next().map_or_else(Vec::new, |entity| entity.0);
        debug!(n_changes = changes.len(), "fetched");
        Ok(changes)
    }

    #[instrument(skip_all, fields(entity_id = entity_id, value = value))]
    fn set_number(&self, entity_id: &str, value: f64) -> Result {
        info!("setting…");
        self.call_service("number", "set_value", &json!({ "entity_id": entity_id, "value": value }))
    }

    #[instrument(skip_all, fields(entity_id = entity_id, option = option))]
    fn set_select(&self, entity_id: &str, option: &str) -> Result {
        info!("selecting…");
        self.call_service(
            "select",
            "select_option",
            &json!({ "entity_id": entity_id, "option": option }),
        )
    }
}

#[must_use]
#[derive(Clone, Debug, Deserialize)]
pub struct EntityState {
    pub state: String,

    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl EntityState {
    /// Deserialize the named attribute.
    pub fn attribute<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.attributes.get(name).with_context(|| format!("missing attribute `{name}`"))?;
        serde_json::from_value(value.clone()).with_context(|| format!("malformed attribute `{name}`"))
    }
}

#[must_use]
#[derive(Deserialize)]
struct EntitiesHistory(Vec<EntityHistory>);

#[must_use]
#[derive(Deserialize)]
struct EntityHistory(Vec<StateChange>);

#[must_use]
#[derive(Clone, Debug, Deserialize)]
pub struct StateChange {
    pub state: String,

    #[serde(rename = "last_changed")]
    pub changed_at: DateTime<Local>,
}

impl StateChange {
    /// The sample as expected by the binner.
    pub fn into_sample(self) -> (DateTime<Local>, String) {
        (self.changed_at, self.state)
    }
}

/// Solcast `detailedForecast` attribute.
#[must_use]
#[serde_as]
#[derive(Deserialize)]
pub struct DetailedForecast(#[serde_as(as = "serde_with::VecSkipError<_>")] pub Vec<ForecastPeriod>);

#[must_use]
#[derive(Copy, Clone, Debug, Deserialize)]
pub struct ForecastPeriod {
    pub period_start: DateTime<Local>,

    #[serde(rename = "pv_estimate")]
    pub power: Kilowatts,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_deserialize_history_ok() -> Result {
        // language=JSON
        const RESPONSE: &str = r#"
            [
                [
                    {
                        "entity_id": "sensor.sigen_plant_pv_power",
                        "state": "unavailable",
                        "last_changed": "2025-10-01T17:08:40.326747+00:00"
                    },
                    {
                        "state": "5.65",
                        "last_changed": "2025-10-01T17:08:41.326747+00:00"
                    }
                ]
            ]
        "#;
        let history = serde_json::from_str::<EntitiesHistory>(RESPONSE)?;
        let changes = &history.0[0].0;
        assert_eq!(changes.len(), 2);
        assert_eq!(parse_numeric(&changes[0].state), None);
        assert_eq!(parse_numeric(&changes[1].state), Some(5.65));
        assert_eq!(changes[1].changed_at, Local.timestamp_micros(1_759_338_521_326_747).unwrap());
        Ok(())
    }

    #[test]
    fn test_detailed_forecast_ok() -> Result {
        // language=JSON
        const RESPONSE: &str = r#"
            {
                "state": "31.5",
                "attributes": {
                    "detailedForecast": [
                        { "period_start": "2025-10-20T06:00:00+10:00", "pv_estimate": 0.4, "pv_estimate10": 0.2 },
                        { "period_start": "invalid", "pv_estimate": 1.0 },
                        { "period_start": "2025-10-20T06:30:00+10:00", "pv_estimate": 1.2, "pv_estimate10": 0.9 }
                    ],
                    "friendly_name": "Solcast PV Forecast Forecast Today"
                }
            }
        "#;
        let state = serde_json::from_str::<EntityState>(RESPONSE)?;
        let forecast = state.attribute::<DetailedForecast>("detailedForecast")?;
        assert_eq!(forecast.0.len(), 2);
        assert_eq!(forecast.0[1].power, Kilowatts(1.2));
        assert!(state.attribute::<DetailedForecast>("missing").is_err());
        Ok(())
    }
}
