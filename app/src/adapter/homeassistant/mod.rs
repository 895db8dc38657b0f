mod client;
mod events;

pub use client::HaHttpClient;
pub use events::HaEventListener;

use std::time::Duration;

use infrastructure::Mqtt;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct HomeAssistant {
    pub url: String,
    pub token: String,
    pub topic_event: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl HomeAssistant {
    pub fn new_client(&self) -> anyhow::Result<HaHttpClient> {
        HaHttpClient::new(&self.url, &self.token, Duration::from_secs(self.timeout_secs))
    }

    pub async fn new_event_listener(&self, mqtt: &mut Mqtt) -> anyhow::Result<HaEventListener> {
        let subscription = mqtt.subscribe(self.topic_event.clone()).await?;
        Ok(HaEventListener::new(subscription))
    }
}
