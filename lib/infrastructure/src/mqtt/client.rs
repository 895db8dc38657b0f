use rumqttc::v5::{
    mqttbytes::{
        v5::{ConnectProperties, Packet, Publish, SubscribeProperties},
        QoS,
    },
    AsyncClient, Event, EventLoop, MqttOptions,
};
use tokio::sync::mpsc;

use super::*;

pub struct Mqtt {
    client: AsyncClient,
    event_loop: EventLoop,
    subscriptions: Vec<MqttSubscriptionHandle>,
}

struct MqttSubscriptionHandle {
    topic: String,
    txs: Vec<mpsc::Sender<MqttInMessage>>,
}

impl Mqtt {
    pub fn connect(host: &str, port: u16, client_id: &str, credentials: Option<(&str, &str)>) -> Self {
        let mut mqttoptions = MqttOptions::new(client_id, host, port);
        mqttoptions.set_keep_alive(std::time::Duration::from_secs(5));
        mqttoptions.set_clean_start(false);

        if let Some((user, password)) = credentials {
            mqttoptions.set_credentials(user, password);
        }

        let mut connect_props = ConnectProperties::new();
        connect_props.session_expiry_interval = 60.into();
        connect_props.max_packet_size = Some(1024 * 1024);
        mqttoptions.set_connect_properties(connect_props);

        let (client, event_loop) = AsyncClient::new(mqttoptions, 10);

        Mqtt {
            client,
            event_loop,
            subscriptions: vec![],
        }
    }

    pub async fn subscribe(&mut self, topic: impl Into<String>) -> anyhow::Result<MqttSubscription> {
        let topic = topic.into();
        let (tx, rx) = mpsc::channel::<MqttInMessage>(32);

        if let Some(subscription) = self.subscriptions.iter_mut().find(|s| s.topic == topic) {
            tracing::info!("Adding receiver to existing subscription of topic {}", topic);
            subscription.txs.push(tx);
            return Ok(MqttSubscription::new(rx));
        }

        tracing::info!("Subscribing to topic {}", topic);

        self.subscriptions.push(MqttSubscriptionHandle {
            topic: topic.clone(),
            txs: vec![tx],
        });

        self.client
            .subscribe_with_properties(
                topic,
                QoS::AtLeastOnce,
                SubscribeProperties {
                    id: Some(self.subscriptions.len()), //must be > 0
                    user_properties: vec![],
                },
            )
            .await?;

        Ok(MqttSubscription::new(rx))
    }

    pub async fn run(mut self) {
        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.forward(publish).await;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("MQTT connection error: {}", e);
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn forward(&self, publish: Publish) {
        let msg = match MqttInMessage::try_from(&publish) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!("Error decoding MQTT message: {}", e);
                return;
            }
        };

        let subscription_ids = match publish.properties {
            Some(p) => p.subscription_identifiers,
            None => {
                tracing::warn!("MQTT message on {} without subscription identifier", msg.topic);
                return;
            }
        };

        for id in subscription_ids {
            let Some(subscription) = id.checked_sub(1).and_then(|idx| self.subscriptions.get(idx)) else {
                tracing::error!("No subscription registered for id {}", id);
                continue;
            };

            tracing::trace!("Forwarding MQTT message of {} to {} receivers", msg.topic, subscription.txs.len());

            for tx in subscription.txs.iter() {
                if let Err(e) = tx
                    .send_timeout(msg.clone(), std::time::Duration::from_secs(5))
                    .await
                {
                    tracing::error!("Failed to forward MQTT message of {}: {}", subscription.topic, e);
                }
            }
        }
    }
}
