//! Penny Hardware Library
//!
//! Provides access to the hardware a Penny thermostat drives: TP-Link Kasa
//! power strips on the local network and 1-Wire temperature probes exposed
//! by the Linux `w1_therm` driver.

pub mod error;
pub mod kasa;
pub mod w1;

pub use error::{Error, Result};
pub use kasa::{Outlet, PowerStrip};
pub use w1::read_w1_therm;
