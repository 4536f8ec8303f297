//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use penny_hw::kasa::protocol::{decrypt, encrypt, HEADER_SIZE};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::config::SensorInfo;
use crate::devices::{outlet_index, Device, DeviceError, PowerToggler, Result};
use crate::metrics::GaugeSink;

pub fn sensor_info(name: &str, target: f64, range: f64) -> SensorInfo {
    SensorInfo {
        name: name.to_string(),
        kind: "w1-therm".to_string(),
        read_from: String::new(),
        target,
        range,
        device: None,
        subdevice: None,
    }
}

/// Parses the source string itself as the reading.
pub fn literal_reader(source: &str) -> penny_hw::Result<f64> {
    source
        .trim()
        .parse()
        .map_err(|_| penny_hw::Error::ProbeFormat {
            path: source.to_string(),
            reason: "not a number".to_string(),
        })
}

pub fn failing_reader(source: &str) -> penny_hw::Result<f64> {
    Err(penny_hw::Error::ProbeNotReady(source.to_string()))
}

/// Outlet that records every call.
#[derive(Default)]
pub struct MockToggler {
    powered: AtomicBool,
    broken: bool,
    queries: AtomicUsize,
    on_calls: AtomicUsize,
    off_calls: AtomicUsize,
}

impl MockToggler {
    pub fn new(on: bool) -> Self {
        Self {
            powered: AtomicBool::new(on),
            ..Default::default()
        }
    }

    /// A toggler whose every call fails.
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Default::default()
        }
    }

    fn check(&self) -> Result<()> {
        if self.broken {
            return Err(DeviceError::Hardware(penny_hw::Error::Timeout(
                "mock".to_string(),
            )));
        }
        Ok(())
    }

    pub fn is_powered(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }

    pub fn on_calls(&self) -> usize {
        self.on_calls.load(Ordering::SeqCst)
    }

    pub fn off_calls(&self) -> usize {
        self.off_calls.load(Ordering::SeqCst)
    }

    pub fn switch_calls(&self) -> usize {
        self.on_calls() + self.off_calls()
    }

    pub fn total_calls(&self) -> usize {
        self.queries.load(Ordering::SeqCst) + self.switch_calls()
    }
}

#[async_trait]
impl PowerToggler for MockToggler {
    async fn is_on(&self) -> Result<bool> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.is_powered())
    }

    async fn on(&self) -> Result<()> {
        self.on_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.powered.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn off(&self) -> Result<()> {
        self.off_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.powered.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Multi-outlet device backed by mock togglers.
pub struct MockStrip {
    outlets: Vec<MockToggler>,
}

impl MockStrip {
    pub fn new(count: usize) -> Self {
        Self {
            outlets: (0..count).map(|_| MockToggler::new(false)).collect(),
        }
    }
}

impl Device for MockStrip {
    fn subdevice(&self, id: &str) -> Result<&dyn PowerToggler> {
        let index = outlet_index(id, self.outlets.len())?;
        Ok(&self.outlets[index])
    }
}

/// Sink that keeps the last value per sensor and counts publications.
#[derive(Default)]
pub struct RecordingSink {
    values: Mutex<HashMap<String, f64>>,
    sets: AtomicUsize,
    errors: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn value(&self, sensor: &str) -> Option<f64> {
        self.values.lock().unwrap().get(sensor).copied()
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl GaugeSink for RecordingSink {
    fn set_gauge(&self, sensor: &str, value: f64) {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.values
            .lock()
            .unwrap()
            .insert(sensor.to_string(), value);
    }

    fn record_error(&self, sensor: &str) {
        self.errors.lock().unwrap().push(sensor.to_string());
    }
}

/// Serves a Kasa strip on localhost whose relay states live in `states`.
/// Returns the address to connect to.
pub async fn fake_kasa_strip(states: Arc<Mutex<Vec<u8>>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            let states = states.clone();
            tokio::spawn(async move {
                let mut header = [0u8; HEADER_SIZE];
                socket.read_exact(&mut header).await.unwrap();
                let mut body = vec![0u8; u32::from_be_bytes(header) as usize];
                socket.read_exact(&mut body).await.unwrap();

                let request: Value = serde_json::from_slice(&decrypt(&body)).unwrap();
                let reply = kasa_reply(&request, &states).to_string();

                let mut frame = (reply.len() as u32).to_be_bytes().to_vec();
                frame.extend(encrypt(reply.as_bytes()));
                socket.write_all(&frame).await.unwrap();
            });
        }
    });

    addr
}

fn kasa_reply(request: &Value, states: &Mutex<Vec<u8>>) -> Value {
    let mut states = states.lock().unwrap();

    if let Some(relay) = request.pointer("/system/set_relay_state") {
        let id = request
            .pointer("/context/child_ids/0")
            .and_then(Value::as_str)
            .unwrap();
        let index: usize = id.trim_start_matches("PENNY").parse().unwrap();
        states[index] = relay["state"].as_u64().unwrap() as u8;
        return json!({ "system": { "set_relay_state": { "err_code": 0 } } });
    }

    let children: Vec<Value> = states
        .iter()
        .enumerate()
        .map(|(i, state)| json!({ "id": format!("{:02}", i), "alias": format!("Heater {}", i), "state": state }))
        .collect();
    json!({ "system": { "get_sysinfo": {
        "alias": "Aquarium",
        "model": "KP303(UK)",
        "deviceId": "PENNY",
        "children": children,
        "err_code": 0,
    } } })
}
