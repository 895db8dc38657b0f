use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::port::SensorStatePublisher;

use super::schedule::{RefreshHandle, RefreshTrigger};
use super::{DeviceStateChange, PollResult, SensorStatus};

/// Identity of the published sensor and the device it observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorEntity {
    pub name: String,
    pub sensor_entity_id: String,
    pub device_entity_id: String,
}

impl SensorEntity {
    pub fn new(name: impl Into<String>, device_entity_id: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            sensor_entity_id: format!("sensor.{}", slugify(&name)),
            name,
            device_entity_id: device_entity_id.into(),
        }
    }
}

/// Exposes the latest poll result of one sensor to the host and turns device changes into refresh requests.
#[derive(Debug, Clone)]
pub struct SensorBinding {
    entity: Arc<SensorEntity>,
    current: Arc<RwLock<Option<PollResult>>>,
    refresh: RefreshHandle,
}

impl SensorBinding {
    pub fn new(entity: SensorEntity, refresh: RefreshHandle) -> Self {
        Self {
            entity: Arc::new(entity),
            current: Arc::new(RwLock::new(None)),
            refresh,
        }
    }

    pub fn entity(&self) -> &SensorEntity {
        &self.entity
    }

    pub fn current_state(&self) -> Option<SensorStatus> {
        self.read(|result| result.status())
    }

    pub fn current_attributes(&self) -> Option<BTreeMap<String, String>> {
        self.read(|result| result.attributes().clone())
    }

    pub fn request_refresh(&self, trigger: RefreshTrigger) {
        self.refresh.request(trigger);
    }

    pub fn on_device_state_changed(&self, change: &DeviceStateChange) {
        if change.entity_id != self.entity.device_entity_id {
            return;
        }

        //each ADB command rewrites the adb_response attribute, refreshing on that would loop forever
        if !change.is_state_transition() {
            tracing::trace!("Ignoring attribute-only change of {}", change.entity_id);
            return;
        }

        tracing::debug!(
            "State of {} changed from {:?} to {:?}, refreshing {}",
            change.entity_id,
            change.old_state,
            change.new_state,
            self.entity.name
        );
        self.request_refresh(RefreshTrigger::DeviceStateChanged);
    }

    /// Publishes the result and keeps it as current state. Publishing problems are only logged.
    pub async fn apply(&self, result: PollResult, publisher: &impl SensorStatePublisher) {
        if let Err(e) = publisher.publish(&self.entity, &result).await {
            tracing::error!(
                "Error publishing state of {} ({}): {:?}",
                self.entity.name,
                self.entity.sensor_entity_id,
                e
            );
        }

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(result);
    }

    fn read<R>(&self, f: impl FnOnce(&PollResult) -> R) -> Option<R> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(f)
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());

    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }

    slug.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::schedule::refresh_channel;
    use crate::sensor::testing::FakePublisher;

    fn state_change(entity_id: &str, old: Option<&str>, new: Option<&str>) -> DeviceStateChange {
        DeviceStateChange {
            entity_id: entity_id.to_string(),
            old_state: old.map(str::to_string),
            new_state: new.map(str::to_string),
        }
    }

    #[test]
    fn sensor_entity_id_from_name() {
        let entity = SensorEntity::new("Living Room TV - Apps", "media_player.tv");

        assert_eq!(entity.sensor_entity_id, "sensor.living_room_tv_apps");
    }

    #[test]
    fn state_is_absent_before_first_cycle() {
        let (handle, _queue) = refresh_channel();
        let binding = SensorBinding::new(SensorEntity::new("tv", "media_player.tv"), handle);

        assert_eq!(binding.current_state(), None);
        assert_eq!(binding.current_attributes(), None);
    }

    #[tokio::test]
    async fn apply_stores_and_publishes_result() {
        let (handle, _queue) = refresh_channel();
        let binding = SensorBinding::new(SensorEntity::new("tv", "media_player.tv"), handle);
        let publisher = FakePublisher::default();
        let attributes = BTreeMap::from([("youtube_app".to_string(), "on".to_string())]);

        binding
            .apply(PollResult::new(SensorStatus::Online, attributes.clone()), &publisher)
            .await;

        assert_eq!(binding.current_state(), Some(SensorStatus::Online));
        assert_eq!(binding.current_attributes(), Some(attributes));
        assert_eq!(publisher.published().len(), 1);
        assert_eq!(publisher.published()[0].0, "sensor.tv");
    }

    #[tokio::test]
    async fn publish_failure_keeps_result() {
        let (handle, _queue) = refresh_channel();
        let binding = SensorBinding::new(SensorEntity::new("tv", "media_player.tv"), handle);

        binding
            .apply(PollResult::new(SensorStatus::Offline, BTreeMap::new()), &FakePublisher::failing())
            .await;

        assert_eq!(binding.current_state(), Some(SensorStatus::Offline));
    }

    #[tokio::test]
    async fn state_transition_requests_refresh() {
        let (handle, mut queue) = refresh_channel();
        let binding = SensorBinding::new(SensorEntity::new("tv", "media_player.tv"), handle);

        binding.on_device_state_changed(&state_change("media_player.tv", Some("off"), Some("unavailable")));

        assert_eq!(queue.clear(), Some(RefreshTrigger::DeviceStateChanged));
    }

    #[tokio::test]
    async fn attribute_only_change_is_ignored() {
        let (handle, mut queue) = refresh_channel();
        let binding = SensorBinding::new(SensorEntity::new("tv", "media_player.tv"), handle);

        binding.on_device_state_changed(&state_change("media_player.tv", Some("on"), Some("on")));
        binding.on_device_state_changed(&state_change("media_player.other", Some("on"), Some("off")));

        assert_eq!(queue.clear(), None);
    }
}
