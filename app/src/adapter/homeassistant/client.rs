use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context as _;
use infrastructure::HttpClientConfig;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::port::{CommandTransport, DeviceStateAccess, SensorStatePublisher};
use crate::sensor::{ATTR_ADB_RESPONSE, DeviceTarget, PollResult, Reachability, SensorEntity};

#[derive(Debug, Clone)]
pub struct HaHttpClient {
    client: ClientWithMiddleware,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct EntityState {
    entity_id: String,
    state: String,
    #[serde(default)]
    attributes: HashMap<String, Value>,
}

impl HaHttpClient {
    pub fn new(url: &str, token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = HttpClientConfig::new(Some(token.to_owned()))
            .with_timeout(timeout)
            .new_tracing_client()?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_owned(),
        })
    }
}

impl HaHttpClient {
    #[tracing::instrument(skip(self))]
    async fn get_state(&self, entity_id: &str) -> anyhow::Result<Option<EntityState>> {
        let response = self
            .client
            .get(format!("{}/api/states/{}", self.base_url, entity_id))
            .send()
            .await
            .with_context(|| format!("Error requesting state of {entity_id}"))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let state = response
            .error_for_status()?
            .json::<EntityState>()
            .await
            .with_context(|| format!("Error parsing state of {entity_id}"))?;

        Ok(Some(state))
    }

    #[tracing::instrument(skip(self))]
    async fn call_service(&self, domain: &str, service: &str, service_data: Value) -> anyhow::Result<()> {
        let url = format!("{}/api/services/{}/{}", self.base_url, domain, service);

        tracing::debug!("Calling HA service {}: {}", url, service_data);

        self.client
            .post(url)
            .json(&service_data)
            .send()
            .await
            .with_context(|| format!("Error calling service {domain}.{service}"))?
            .error_for_status()?;

        Ok(())
    }

    #[tracing::instrument(skip(self, payload))]
    async fn set_state(&self, entity_id: &str, payload: Value) -> anyhow::Result<()> {
        self.client
            .post(format!("{}/api/states/{}", self.base_url, entity_id))
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Error setting state of {entity_id}"))?
            .error_for_status()?;

        Ok(())
    }
}

impl EntityState {
    fn into_device_target(self) -> DeviceTarget {
        let adb_response = self
            .attributes
            .get(ATTR_ADB_RESPONSE)
            .and_then(Value::as_str)
            .map(str::to_string);

        DeviceTarget {
            reachability: Reachability::from_state(&self.state),
            entity_id: self.entity_id,
            adb_response,
        }
    }
}

impl DeviceStateAccess for HaHttpClient {
    async fn device_target(&self, entity_id: &str) -> anyhow::Result<Option<DeviceTarget>> {
        Ok(self.get_state(entity_id).await?.map(EntityState::into_device_target))
    }
}

impl CommandTransport for HaHttpClient {
    async fn dispatch(&self, entity_id: &str, command: &str) -> anyhow::Result<()> {
        self.call_service(
            "androidtv",
            "adb_command",
            json!({
                "entity_id": entity_id,
                "command": command,
            }),
        )
        .await
    }
}

impl SensorStatePublisher for HaHttpClient {
    async fn publish(&self, entity: &SensorEntity, result: &PollResult) -> anyhow::Result<()> {
        self.set_state(&entity.sensor_entity_id, state_payload(entity, result))
            .await
    }
}

fn state_payload(entity: &SensorEntity, result: &PollResult) -> Value {
    let mut attributes = serde_json::Map::new();
    for (name, value) in result.attributes() {
        attributes.insert(name.clone(), Value::String(value.clone()));
    }
    attributes.insert("friendly_name".to_string(), Value::String(entity.name.clone()));

    json!({
        "state": result.status(),
        "attributes": attributes,
    })
}
