use cached::proc_macro::cached;
use opentelemetry::KeyValue;

const METER_SCOPE: &str = "adb_sensor";

pub fn increment(name: &'static str, kv: &[(&str, &str)]) {
    counter(name).add(1, &to_key_values(kv))
}

pub fn set(name: &'static str, value: f64, kv: &[(&str, &str)]) {
    gauge(name).record(value, &to_key_values(kv))
}

fn to_key_values(kv: &[(&str, &str)]) -> Vec<KeyValue> {
    kv.iter()
        .map(|(k, v)| KeyValue::new(k.to_string(), v.to_string()))
        .collect()
}

#[cached]
fn counter(name: &'static str) -> opentelemetry::metrics::Counter<u64> {
    opentelemetry::global::meter(METER_SCOPE).u64_counter(name).build()
}

#[cached]
fn gauge(name: &'static str) -> opentelemetry::metrics::Gauge<f64> {
    opentelemetry::global::meter(METER_SCOPE).f64_gauge(name).build()
}
