use futures::future::join_all;
use settings::Settings;

use crate::sensor::{DeviceLocks, EventRouter, SensorRegistry, SensorRunner};

mod adapter;
pub mod port;
mod sensor;
mod settings;

#[tokio::main(flavor = "multi_thread")]
pub async fn main() {
    let settings = Settings::new().expect("Error reading configuration");
    settings.monitoring.init().expect("Error initializing monitoring");

    let ha_client = settings
        .homeassistant
        .new_client()
        .expect("Error initializing Home Assistant REST client");

    let mut mqtt_client = settings.mqtt.new_client();
    let event_listener = settings
        .homeassistant
        .new_event_listener(&mut mqtt_client)
        .await
        .expect("Error subscribing to Home Assistant events");

    let definitions = sensor::config::load_definitions(settings.sensors);
    if definitions.is_empty() {
        tracing::error!("No valid sensor configured, exiting");
        return;
    }

    let settle = settings.polling.settle_policy();
    let mut device_locks = DeviceLocks::default();

    tracing::info!("Running first refresh of {} sensors", definitions.len());
    let runners = join_all(definitions.into_iter().map(|definition| {
        let device_lock = device_locks.lock_for(&definition.entity.device_entity_id);

        SensorRunner::start(
            definition,
            device_lock,
            ha_client.clone(),
            ha_client.clone(),
            ha_client.clone(),
            settle.clone(),
        )
    }))
    .await;
    tracing::info!("First refresh completed");

    let bindings = runners.iter().map(SensorRunner::binding).collect::<Vec<_>>();
    let router = EventRouter::new(bindings.clone());
    let registry = SensorRegistry::new(bindings);

    let http_server = settings.http_server;
    let http_server_exec = async move {
        http_server
            .run_server(move || vec![adapter::api::new_routes(registry.clone())])
            .await
            .expect("HTTP server execution failed");
    };

    tracing::info!("Starting main loop");

    tokio::select!(
        _ = mqtt_client.run() => {},
        _ = router.run(event_listener) => {},
        _ = join_all(runners.into_iter().map(SensorRunner::run)) => {},
        _ = http_server_exec => {},
    );
}
