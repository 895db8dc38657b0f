use anyhow::Context as _;
use infrastructure::MqttSubscription;
use serde::Deserialize;
use serde_json::Value;

use crate::port::DeviceStateEvents;
use crate::sensor::DeviceStateChange;

/// Receives the Home Assistant event bus as forwarded by the `mqtt_eventstream` integration.
pub struct HaEventListener {
    subscription: MqttSubscription,
}

#[derive(Debug, Deserialize)]
struct HaEvent {
    event_type: String,
    #[serde(default)]
    event_data: Value,
}

#[derive(Debug, Deserialize)]
struct StateChangedData {
    entity_id: String,
    old_state: Option<EventState>,
    new_state: Option<EventState>,
}

#[derive(Debug, Deserialize)]
struct EventState {
    state: String,
}

impl HaEventListener {
    pub fn new(subscription: MqttSubscription) -> Self {
        Self { subscription }
    }
}

impl DeviceStateEvents for HaEventListener {
    async fn recv(&mut self) -> Option<DeviceStateChange> {
        loop {
            let msg = self.subscription.recv().await?;

            match parse_state_change(&msg.payload) {
                Ok(Some(change)) => return Some(change),
                Ok(None) => {}
                Err(e) => tracing::warn!("Error parsing HA event on {}: {:?}", msg.topic, e),
            }
        }
    }
}

fn parse_state_change(payload: &str) -> anyhow::Result<Option<DeviceStateChange>> {
    let event: HaEvent = serde_json::from_str(payload).context("Invalid HA event")?;

    if event.event_type != "state_changed" {
        return Ok(None);
    }

    let data: StateChangedData =
        serde_json::from_value(event.event_data).context("Invalid state_changed event data")?;

    Ok(Some(DeviceStateChange {
        entity_id: data.entity_id,
        old_state: data.old_state.map(|s| s.state),
        new_state: data.new_state.map(|s| s.state),
    }))
}
