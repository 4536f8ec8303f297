//! Kasa local protocol definitions and encoding.
//!
//! Protocol structure:
//! - TCP, port 9999
//! - Frame: 4-byte big-endian payload length, then the payload
//! - Payload: JSON, obfuscated with an autokey XOR cipher (initial key 171)

use crate::{Error, Result};
use serde::Deserialize;
use serde_json::json;

/// Default TCP port of the Kasa local API.
pub const DEFAULT_PORT: u16 = 9999;

/// Initial key of the autokey cipher.
pub const INITIAL_KEY: u8 = 171;

/// Length header size.
pub const HEADER_SIZE: usize = 4;

/// Upper bound for a reply body. Sysinfo of a six-outlet strip is ~2 KiB.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Obfuscates a payload. Each ciphertext byte becomes the key for the next one.
pub fn encrypt(plain: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    plain
        .iter()
        .map(|&b| {
            key ^= b;
            key
        })
        .collect()
}

/// Reverses [`encrypt`].
pub fn decrypt(cipher: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    cipher
        .iter()
        .map(|&c| {
            let plain = key ^ c;
            key = c;
            plain
        })
        .collect()
}

/// Builds a complete request frame (length header + encrypted payload).
pub fn build_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend(encrypt(payload));
    frame
}

/// Decodes the body length from a frame header.
pub fn frame_length(header: [u8; HEADER_SIZE]) -> Result<usize> {
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::Frame(format!(
            "length {} exceeds {} bytes",
            len, MAX_FRAME_SIZE
        )));
    }
    Ok(len)
}

/// Builds the `get_sysinfo` request.
pub fn sysinfo_request() -> String {
    json!({ "system": { "get_sysinfo": {} } }).to_string()
}

/// Builds a relay request addressed to one child outlet.
pub fn relay_request(child_id: &str, on: bool) -> String {
    json!({
        "context": { "child_ids": [child_id] },
        "system": { "set_relay_state": { "state": u8::from(on) } },
    })
    .to_string()
}

/// Strip information returned by `get_sysinfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct SysInfo {
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub model: String,
    #[serde(rename = "deviceId", default)]
    pub device_id: String,
    #[serde(default)]
    pub children: Vec<ChildInfo>,
    #[serde(default)]
    pub err_code: i64,
    #[serde(default)]
    pub err_msg: Option<String>,
}

/// One outlet of a strip.
#[derive(Debug, Clone, Deserialize)]
pub struct ChildInfo {
    pub id: String,
    #[serde(default)]
    pub alias: String,
    pub state: u8,
}

impl SysInfo {
    /// Returns the full id of a child. Some firmwares report only the
    /// two-digit outlet suffix, which must be prefixed with the strip id.
    pub fn child_id(&self, child: &ChildInfo) -> String {
        if child.id.len() <= 2 {
            format!("{}{}", self.device_id, child.id)
        } else {
            child.id.clone()
        }
    }

    /// Finds a child by full id.
    pub fn find_child(&self, id: &str) -> Option<&ChildInfo> {
        self.children.iter().find(|c| self.child_id(c) == id)
    }
}

/// Status block carried by command replies.
#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    err_code: i64,
    #[serde(default)]
    err_msg: Option<String>,
}

impl Status {
    fn check(self) -> Result<()> {
        check_code(self.err_code, self.err_msg)
    }
}

#[derive(Debug, Deserialize)]
struct SysInfoReply {
    system: SysInfoSection,
}

#[derive(Debug, Deserialize)]
struct SysInfoSection {
    get_sysinfo: SysInfo,
}

#[derive(Debug, Deserialize)]
struct RelayReply {
    system: RelaySection,
}

#[derive(Debug, Deserialize)]
struct RelaySection {
    set_relay_state: Status,
}

fn check_code(code: i64, message: Option<String>) -> Result<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(Error::Device {
            code,
            message: message.unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

/// Parses a decrypted `get_sysinfo` reply.
pub fn parse_sysinfo(plain: &[u8]) -> Result<SysInfo> {
    let reply: SysInfoReply = serde_json::from_slice(plain)?;
    let info = reply.system.get_sysinfo;
    check_code(info.err_code, info.err_msg.clone())?;
    Ok(info)
}

/// Parses a decrypted `set_relay_state` reply.
pub fn parse_relay_reply(plain: &[u8]) -> Result<()> {
    let reply: RelayReply = serde_json::from_slice(plain)?;
    reply.system.set_relay_state.check()
}
