//! Kasa smart power strip module.
//!
//! Provides control over TP-Link Kasa multi-outlet strips via the local TCP API.

mod device;

pub mod protocol;

pub use device::{socket_address, Outlet, PowerStrip, DEFAULT_TIMEOUT};
pub use protocol::{ChildInfo, SysInfo};
