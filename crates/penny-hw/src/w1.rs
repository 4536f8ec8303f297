//! 1-Wire temperature probes (DS18B20 and friends).
//!
//! The kernel `w1_therm` driver exposes each probe as a two-line `w1_slave` file:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```
//!
//! The first line ends in `YES` once the CRC check passed; the last token of the
//! second line carries the temperature in millidegrees Celsius.

use crate::{Error, Result};
use std::fs;
use std::path::Path;

/// Suffix of the status line when the reading is valid.
pub const READY_SUFFIX: &str = "YES";

/// Prefix of the temperature token.
pub const TEMPERATURE_PREFIX: &str = "t=";

/// Reads a probe file and returns degrees Celsius.
pub fn read_w1_therm<P: AsRef<Path>>(path: P) -> Result<f64> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|err| Error::ProbeRead {
        path: name.clone(),
        err,
    })?;
    parse_w1_therm(&name, &content)
}

/// Parses `w1_slave` contents. `path` is only used in error messages.
pub fn parse_w1_therm(path: &str, content: &str) -> Result<f64> {
    let format_error = |reason: String| Error::ProbeFormat {
        path: path.to_string(),
        reason,
    };

    let mut lines = content.lines();
    let (Some(status), Some(data)) = (lines.next(), lines.next()) else {
        return Err(format_error(format!(
            "{} lines",
            content.lines().count()
        )));
    };

    if !status.trim_end().ends_with(READY_SUFFIX) {
        return Err(Error::ProbeNotReady(path.to_string()));
    }

    let token = data.split_whitespace().last().unwrap_or_default();
    let Some(millis) = token.strip_prefix(TEMPERATURE_PREFIX) else {
        return Err(format_error("no temperature found".to_string()));
    };

    let value: f64 = millis
        .parse()
        .map_err(|e| format_error(format!("{:?}: {}", millis, e)))?;
    if !value.is_finite() {
        return Err(format_error(format!("{:?}: not a finite number", millis)));
    }

    Ok(value / 1000.0)
}
