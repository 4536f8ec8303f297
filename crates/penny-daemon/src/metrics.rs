//! Prometheus metrics for sensor readings.
//!
//! The control loop publishes through [`GaugeSink`]; the web server renders
//! the same registry. Prometheus collectors are internally synchronized, so
//! neither side takes a lock of its own.

use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "penny";
const SUBSYSTEM: &str = "sensors";

/// Receiver for the latest reading of each sensor.
pub trait GaugeSink: Send + Sync {
    /// Publishes `value` for `sensor`, replacing the previous value.
    fn set_gauge(&self, sensor: &str, value: f64);

    /// Counts a failed update of `sensor`.
    fn record_error(&self, sensor: &str);
}

/// Per-sensor gauges and error counters in their own registry.
pub struct SensorMetrics {
    registry: Registry,
    values: GaugeVec,
    errors: IntCounterVec,
}

impl SensorMetrics {
    /// Creates and registers all collectors.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let values = GaugeVec::new(
            Opts::new("value", "Value read from one of penny's sensors")
                .namespace(NAMESPACE)
                .subsystem(SUBSYSTEM),
            &["sensor"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("errors_total", "Failed updates of one of penny's sensors")
                .namespace(NAMESPACE)
                .subsystem(SUBSYSTEM),
            &["sensor"],
        )?;

        registry.register(Box::new(values.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            registry,
            values,
            errors,
        })
    }

    /// Last published value of `sensor`, if any.
    #[cfg(test)]
    pub fn value(&self, sensor: &str) -> Option<f64> {
        self.registry
            .gather()
            .iter()
            .find(|family| family.get_name() == "penny_sensors_value")
            .and_then(|family| {
                family.get_metric().iter().find(|metric| {
                    metric
                        .get_label()
                        .iter()
                        .any(|label| label.get_name() == "sensor" && label.get_value() == sensor)
                })
            })
            .map(|metric| metric.get_gauge().get_value())
    }

    /// Number of failed updates recorded for `sensor`.
    #[cfg(test)]
    pub fn errors(&self, sensor: &str) -> u64 {
        self.errors
            .get_metric_with_label_values(&[sensor])
            .map(|counter| counter.get())
            .unwrap_or(0)
    }

    /// Renders all metrics in the Prometheus text format.
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl GaugeSink for SensorMetrics {
    fn set_gauge(&self, sensor: &str, value: f64) {
        self.values.with_label_values(&[sensor]).set(value);
    }

    fn record_error(&self, sensor: &str) {
        self.errors.with_label_values(&[sensor]).inc();
    }
}
