mod client;
mod receiver;

pub use client::Mqtt;
pub use receiver::{MqttInMessage, MqttSubscription};

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    host: String,
    port: u16,
    client_id: String,
    username: Option<String>,
    password: Option<String>,
}

impl MqttConfig {
    pub fn new_client(&self) -> Mqtt {
        let credentials = match (&self.username, &self.password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        };

        Mqtt::connect(&self.host, self.port, &self.client_id, credentials)
    }
}
