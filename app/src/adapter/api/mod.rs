use std::collections::BTreeMap;

use actix_web::{
    HttpResponse, ResponseError,
    web::{self},
};
use derive_more::derive::{Display, Error};
use serde::Serialize;

use crate::sensor::{RefreshTrigger, SensorRegistry, SensorStatus};

pub fn new_routes(registry: SensorRegistry) -> actix_web::Scope {
    web::scope("/sensors")
        .route("", web::get().to(get_sensors))
        .route("/{name}/refresh", web::post().to(refresh_sensor))
        .app_data(web::Data::new(registry))
}

type ApiResponse = Result<HttpResponse, SensorApiError>;

#[derive(Debug, Error, Display)]
enum SensorApiError {
    #[display("Sensor {name} not found")]
    NotFound { name: String },
}

impl ResponseError for SensorApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;

        tracing::warn!("SensorApiError: {:?}", self);

        match self {
            SensorApiError::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }
}

#[derive(Serialize)]
struct SensorView<'a> {
    name: &'a str,
    entity_id: &'a str,
    sensor_entity_id: &'a str,
    state: Option<SensorStatus>,
    attributes: Option<BTreeMap<String, String>>,
}

async fn get_sensors(registry: web::Data<SensorRegistry>) -> ApiResponse {
    let sensors = registry
        .all()
        .iter()
        .map(|binding| {
            let entity = binding.entity();
            SensorView {
                name: &entity.name,
                entity_id: &entity.device_entity_id,
                sensor_entity_id: &entity.sensor_entity_id,
                state: binding.current_state(),
                attributes: binding.current_attributes(),
            }
        })
        .collect::<Vec<_>>();

    Ok(HttpResponse::Ok().json(sensors))
}

async fn refresh_sensor(registry: web::Data<SensorRegistry>, name: web::Path<String>) -> ApiResponse {
    let name = name.into_inner();

    let binding = registry
        .find(&name)
        .ok_or_else(|| SensorApiError::NotFound { name: name.clone() })?;

    binding.request_refresh(RefreshTrigger::Api);

    Ok(HttpResponse::Accepted().finish())
}
