pub mod meter;

use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{ExporterBuildError, WithExportConfig};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

//EnvFilter on layer-level drops statements of nested spans in some versions, so every layer gets its own filter

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitoringConfig {
    pub service_name: String,
    pub app_name: String,
    pub logs: EnvFilterConfig,
    pub traces: EnvFilterConfig,
    pub otlp: Option<OtlpConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EnvFilterConfig {
    pub default_level: String,
    #[serde(default)]
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct OtlpConfig {
    pub url: Option<String>,
}

impl TryFrom<&EnvFilterConfig> for EnvFilter {
    type Error = tracing_subscriber::filter::ParseError;

    fn try_from(config: &EnvFilterConfig) -> Result<Self, Self::Error> {
        EnvFilter::builder()
            .with_default_directive(config.default_level.parse()?)
            .parse(config.filters.join(","))
    }
}

impl MonitoringConfig {
    pub fn init(&self) -> anyhow::Result<()> {
        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::default());

        match &self.otlp {
            Some(otlp) => self.init_with_otlp(otlp.url.clone()),
            None => {
                let logging_filter = EnvFilter::try_from(&self.logs)?;
                tracing_subscriber::registry()
                    .with(tracing_subscriber::fmt::layer())
                    .with(logging_filter)
                    .try_init()?;
                Ok(())
            }
        }
    }

    fn init_with_otlp(&self, url: Option<String>) -> anyhow::Result<()> {
        let resource = self.resource();

        let fmt_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::try_from(&self.logs)?);

        let logger_provider = init_logs(resource.clone(), url.clone())?;
        let logging_layer =
            OpenTelemetryTracingBridge::new(&logger_provider).with_filter(EnvFilter::try_from(&self.logs)?);

        let tracer_provider = init_traces(resource.clone(), url.clone())?;
        let tracer = tracer_provider.tracer(self.app_name.to_owned());
        let tracing_layer = OpenTelemetryLayer::new(tracer).with_filter(EnvFilter::try_from(&self.traces)?);

        opentelemetry::global::set_meter_provider(init_metrics(resource, url)?);

        tracing_subscriber::registry()
            .with(tracing_layer)
            .with(logging_layer)
            .with(fmt_layer)
            .try_init()?;

        Ok(())
    }

    fn resource(&self) -> Resource {
        Resource::builder()
            .with_attribute(KeyValue::new("service.name", self.service_name.clone()))
            .with_attribute(KeyValue::new("app.name", self.app_name.clone()))
            .build()
    }
}

fn init_traces(resource: Resource, url: Option<String>) -> Result<SdkTracerProvider, ExporterBuildError> {
    let builder = SdkTracerProvider::builder().with_resource(resource);

    match url {
        Some(url) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(url)
                .build()?;
            Ok(builder.with_batch_exporter(exporter).build())
        }
        None => Ok(builder
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build()),
    }
}

fn init_metrics(resource: Resource, url: Option<String>) -> Result<SdkMeterProvider, ExporterBuildError> {
    let builder = SdkMeterProvider::builder();

    let builder = match url {
        Some(url) => {
            let exporter = opentelemetry_otlp::MetricExporter::builder()
                .with_tonic()
                .with_endpoint(url)
                .build()?;
            builder.with_reader(
                PeriodicReader::builder(exporter)
                    .with_interval(std::time::Duration::from_secs(15))
                    .build(),
            )
        }
        None => builder.with_reader(
            PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
                .with_interval(std::time::Duration::from_secs(60))
                .build(),
        ),
    };

    Ok(builder.with_resource(resource).build())
}

fn init_logs(resource: Resource, url: Option<String>) -> Result<SdkLoggerProvider, ExporterBuildError> {
    let builder = SdkLoggerProvider::builder().with_resource(resource);

    match url {
        Some(url) => {
            let exporter = opentelemetry_otlp::LogExporter::builder()
                .with_tonic()
                .with_endpoint(url)
                .build()?;
            Ok(builder.with_batch_exporter(exporter).build())
        }
        None => Ok(builder
            .with_simple_exporter(opentelemetry_stdout::LogExporter::default())
            .build()),
    }
}
