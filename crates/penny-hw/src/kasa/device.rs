//! Kasa power strip communication over TCP.

use crate::{Error, Result};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::protocol::{
    build_frame, decrypt, frame_length, parse_relay_reply, parse_sysinfo, relay_request,
    sysinfo_request, SysInfo, DEFAULT_PORT, HEADER_SIZE,
};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Normalizes a connection string to `host:port`.
pub fn socket_address(connection: &str) -> String {
    let connection = connection.trim();
    if connection.parse::<SocketAddr>().is_ok() {
        return connection.to_string();
    }
    if let Ok(ip) = connection.parse::<IpAddr>() {
        return SocketAddr::new(ip, DEFAULT_PORT).to_string();
    }
    match connection.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => {
            connection.to_string()
        }
        _ => format!("{}:{}", connection, DEFAULT_PORT),
    }
}

/// Request channel to one strip. Opens a fresh connection per request.
#[derive(Debug)]
struct Client {
    addr: String,
    timeout: Duration,
}

impl Client {
    async fn request(&self, payload: &str) -> Result<Vec<u8>> {
        tokio::time::timeout(self.timeout, self.exchange(payload))
            .await
            .map_err(|_| Error::Timeout(self.addr.clone()))?
    }

    async fn exchange(&self, payload: &str) -> Result<Vec<u8>> {
        let mut stream = TcpStream::connect(&self.addr).await?;

        debug!("Sending Kasa request to {}: {}", self.addr, payload);

        stream.write_all(&build_frame(payload.as_bytes())).await?;
        stream.flush().await?;

        let mut header = [0u8; HEADER_SIZE];
        stream.read_exact(&mut header).await?;
        let mut body = vec![0u8; frame_length(header)?];
        stream.read_exact(&mut body).await?;

        let plain = decrypt(&body);
        debug!(
            "Kasa reply from {}: {}",
            self.addr,
            String::from_utf8_lossy(&plain)
        );
        Ok(plain)
    }

    async fn sysinfo(&self) -> Result<SysInfo> {
        let reply = self.request(&sysinfo_request()).await?;
        parse_sysinfo(&reply)
    }
}

/// Kasa multi-outlet power strip.
pub struct PowerStrip {
    client: Arc<Client>,
    alias: String,
    model: String,
    outlets: Vec<Outlet>,
}

impl PowerStrip {
    /// Fetches the strip's sysinfo once and builds its outlet list. Every
    /// request to the strip is bounded by `timeout`.
    ///
    /// The outlet count is fixed from this first reply.
    pub async fn connect(connection: &str, timeout: Duration) -> Result<Self> {
        let client = Arc::new(Client {
            addr: socket_address(connection),
            timeout,
        });
        let info = client.sysinfo().await?;

        let outlets = info
            .children
            .iter()
            .enumerate()
            .map(|(index, child)| Outlet {
                client: client.clone(),
                index,
                id: info.child_id(child),
                alias: child.alias.clone(),
            })
            .collect::<Vec<_>>();

        info!(
            "Kasa power strip '{}' ({}) at {}: {} outlets",
            info.alias,
            info.model,
            client.addr,
            outlets.len()
        );

        Ok(Self {
            client,
            alias: info.alias,
            model: info.model,
            outlets,
        })
    }

    /// Returns all outlets in strip order.
    pub fn outlets(&self) -> &[Outlet] {
        &self.outlets
    }

    /// Returns the outlet at `index`.
    pub fn outlet(&self, index: usize) -> Option<&Outlet> {
        self.outlets.get(index)
    }

    /// Strip alias as configured in the Kasa app.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Hardware model string.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Socket address requests go to.
    pub fn addr(&self) -> &str {
        &self.client.addr
    }
}

/// One switchable outlet of a [`PowerStrip`].
pub struct Outlet {
    client: Arc<Client>,
    index: usize,
    id: String,
    alias: String,
}

impl Outlet {
    /// Queries the strip for this outlet's relay state.
    pub async fn is_on(&self) -> Result<bool> {
        let info = self.client.sysinfo().await?;
        let child = info
            .find_child(&self.id)
            .ok_or_else(|| Error::UnknownOutlet(self.id.clone()))?;
        Ok(child.state == 1)
    }

    /// Switches the relay.
    pub async fn set_on(&self, on: bool) -> Result<()> {
        let reply = self.client.request(&relay_request(&self.id, on)).await?;
        parse_relay_reply(&reply)?;
        info!(
            "Outlet {} ('{}') on {} switched {}",
            self.index,
            self.alias,
            self.client.addr,
            if on { "on" } else { "off" }
        );
        Ok(())
    }

    /// Turns the outlet on.
    pub async fn turn_on(&self) -> Result<()> {
        self.set_on(true).await
    }

    /// Turns the outlet off.
    pub async fn turn_off(&self) -> Result<()> {
        self.set_on(false).await
    }

    /// Position within the strip.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Full child id used in relay requests.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Outlet alias.
    pub fn alias(&self) -> &str {
        &self.alias
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kasa::protocol::encrypt;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    /// Serves a fake strip whose outlet states live in `states`.
    async fn fake_strip(states: Arc<Mutex<Vec<u8>>>) -> String {
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
                    let reply = fake_reply(&request, &states).to_string();

                    let mut frame = (reply.len() as u32).to_be_bytes().to_vec();
                    frame.extend(encrypt(reply.as_bytes()));
                    socket.write_all(&frame).await.unwrap();
                });
            }
        });

        addr
    }

    fn fake_reply(request: &Value, states: &Mutex<Vec<u8>>) -> Value {
        let mut states = states.lock().unwrap();

        if let Some(relay) = request.pointer("/system/set_relay_state") {
            let id = request
                .pointer("/context/child_ids/0")
                .and_then(Value::as_str)
                .unwrap();
            let index: usize = id[id.len() - 2..].parse().unwrap();
            states[index] = relay["state"].as_u64().unwrap() as u8;
            return json!({ "system": { "set_relay_state": { "err_code": 0 } } });
        }

        let children: Vec<Value> = states
            .iter()
            .enumerate()
            .map(|(i, state)| {
                json!({ "id": format!("{:02}", i), "alias": format!("Plug {}", i + 1), "state": state })
            })
            .collect();
        json!({ "system": { "get_sysinfo": {
            "alias": "Bench strip",
            "model": "HS300(US)",
            "deviceId": "8006ABCD",
            "children": children,
            "err_code": 0,
        } } })
    }

    #[test]
    fn test_socket_address() {
        assert_eq!(socket_address("10.0.0.5"), "10.0.0.5:9999");
        assert_eq!(socket_address("10.0.0.5:1234"), "10.0.0.5:1234");
        assert_eq!(socket_address("strip.lan"), "strip.lan:9999");
        assert_eq!(socket_address("strip.lan:80"), "strip.lan:80");
        assert_eq!(socket_address("fe80::1"), "[fe80::1]:9999");
    }

    #[tokio::test]
    async fn test_connect_lists_outlets() {
        let states = Arc::new(Mutex::new(vec![0, 1, 0]));
        let addr = fake_strip(states).await;

        let strip = PowerStrip::connect(&addr, DEFAULT_TIMEOUT).await.unwrap();
        assert_eq!(strip.alias(), "Bench strip");
        assert_eq!(strip.model(), "HS300(US)");
        assert_eq!(strip.outlets().len(), 3);
        assert_eq!(strip.outlet(1).unwrap().id(), "8006ABCD01");
        assert_eq!(strip.outlet(2).unwrap().alias(), "Plug 3");
        assert!(strip.outlet(3).is_none());
    }

    #[tokio::test]
    async fn test_outlet_switching() {
        let states = Arc::new(Mutex::new(vec![0, 1, 0]));
        let addr = fake_strip(states.clone()).await;
        let strip = PowerStrip::connect(&addr, DEFAULT_TIMEOUT).await.unwrap();

        let outlet = strip.outlet(2).unwrap();
        assert!(!outlet.is_on().await.unwrap());

        outlet.turn_on().await.unwrap();
        assert!(outlet.is_on().await.unwrap());
        assert_eq!(*states.lock().unwrap(), vec![0, 1, 1]);

        strip.outlet(1).unwrap().turn_off().await.unwrap();
        assert_eq!(*states.lock().unwrap(), vec![0, 0, 1]);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(matches!(
            PowerStrip::connect(&addr, DEFAULT_TIMEOUT).await,
            Err(Error::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_silent_device_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                held.push(socket);
            }
        });

        let result = PowerStrip::connect(&addr, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::Timeout(a)) if a == addr));
    }
}
